use crate::schema;
use crate::util::{
    DbError, decode_enum, decode_json, encode_enum, encode_json, from_rfc3339, to_rfc3339,
    unavailable,
};
use chrono::{DateTime, Utc};
use lens_core::error::{StoreError, TaskError};
use lens_core::tasks::TaskStore;
use lens_core::types::{Task, TaskFailure, TaskId, TaskOutput};
use lens_core::validation::{TaskUpdate, apply_task_update};
use rusqlite::{Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

pub const ABANDONED_CODE: &str = "abandoned";

const TASK_COLUMNS: &str =
    "id, kind, subject, status, created_at, started_at, completed_at, output, error";

pub struct DbTaskStore {
    conn: Mutex<Connection>,
}

impl DbTaskStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = schema::open_and_migrate(path).map_err(|err| unavailable(&err))?;
        Ok(Self::new(conn))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = schema::with_test_db().map_err(|err| unavailable(&err))?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TaskError> {
        self.conn.lock().map_err(|_| {
            TaskError::Store(StoreError::Unavailable {
                reason: "task connection lock poisoned".to_string(),
            })
        })
    }

    /// Removes terminal tasks created before `cutoff`. Pending and running
    /// rows are kept regardless of age.
    pub fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<u64, TaskError> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "DELETE FROM tasks WHERE created_at_ms < ?1 AND status IN ('SUCCEEDED', 'FAILED')",
                [cutoff.timestamp_millis()],
            )
            .map_err(store_err)?;
        Ok(affected as u64)
    }

    /// Fails every pending or running task left behind by a previous
    /// process. Nothing resumes those rows after a restart.
    pub fn fail_abandoned(&self) -> Result<u64, TaskError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(store_err)?;
        let ids = {
            let mut stmt = tx
                .prepare("SELECT id FROM tasks WHERE status IN ('PENDING', 'RUNNING')")
                .map_err(store_err)?;
            stmt.query_map([], |row| row.get::<_, String>(0))
                .map_err(store_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(store_err)?
        };

        let mut failed = 0;
        for raw_id in ids {
            let id = TaskId::new(raw_id.clone())
                .map_err(|_| codec_err(DbError::InvalidEnum { value: raw_id }))?;
            let Some(current) = load_task(&tx, &id)? else {
                continue;
            };
            let task = apply_task_update(
                current,
                TaskUpdate::Failed(TaskFailure {
                    code: ABANDONED_CODE.to_string(),
                    message: "task was interrupted by a restart".to_string(),
                }),
            )?;
            write_task(&tx, &task)?;
            failed += 1;
        }
        tx.commit().map_err(store_err)?;
        Ok(failed)
    }
}

impl TaskStore for DbTaskStore {
    fn insert(&self, task: &Task) -> Result<(), TaskError> {
        let sql = "INSERT INTO tasks (id, kind, subject, status, created_at, created_at_ms, started_at, completed_at, output, error) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";
        let row = EncodedTask::from_task(task)?;
        let conn = self.lock()?;
        conn.execute(
            sql,
            (
                task.id.as_str(),
                row.kind,
                task.subject.as_str(),
                row.status,
                to_rfc3339(&task.created_at),
                task.created_at.timestamp_millis(),
                row.started_at,
                row.completed_at,
                row.output,
                row.error,
            ),
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Result<Option<Task>, TaskError> {
        let conn = self.lock()?;
        load_task(&conn, id)
    }

    fn update(&self, id: &TaskId, update: TaskUpdate) -> Result<Task, TaskError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(store_err)?;
        let current = load_task(&tx, id)?.ok_or(TaskError::NotFound)?;
        let task = apply_task_update(current, update)?;
        write_task(&tx, &task)?;
        tx.commit().map_err(store_err)?;
        Ok(task)
    }
}

fn write_task(conn: &Connection, task: &Task) -> Result<(), TaskError> {
    let row = EncodedTask::from_task(task)?;
    conn.execute(
        "UPDATE tasks SET status = ?2, started_at = ?3, completed_at = ?4, output = ?5, error = ?6 WHERE id = ?1",
        (
            task.id.as_str(),
            row.status,
            row.started_at,
            row.completed_at,
            row.output,
            row.error,
        ),
    )
    .map_err(store_err)?;
    Ok(())
}

struct EncodedTask {
    kind: String,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    output: Option<String>,
    error: Option<String>,
}

impl EncodedTask {
    fn from_task(task: &Task) -> Result<Self, TaskError> {
        Ok(Self {
            kind: encode_enum(&task.kind).map_err(codec_err)?,
            status: encode_enum(&task.status).map_err(codec_err)?,
            started_at: task.started_at.as_ref().map(to_rfc3339),
            completed_at: task.completed_at.as_ref().map(to_rfc3339),
            output: task
                .output
                .as_ref()
                .map(encode_json)
                .transpose()
                .map_err(codec_err)?,
            error: task
                .error
                .as_ref()
                .map(encode_json)
                .transpose()
                .map_err(codec_err)?,
        })
    }
}

fn load_task(conn: &Connection, id: &TaskId) -> Result<Option<Task>, TaskError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    let raw = conn
        .query_row(&sql, [id.as_str()], RawTask::from_row)
        .optional()
        .map_err(store_err)?;
    raw.map(RawTask::decode).transpose().map_err(codec_err)
}

struct RawTask {
    id: String,
    kind: String,
    subject: String,
    status: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    output: Option<String>,
    error: Option<String>,
}

impl RawTask {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            subject: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            started_at: row.get(5)?,
            completed_at: row.get(6)?,
            output: row.get(7)?,
            error: row.get(8)?,
        })
    }

    fn decode(self) -> Result<Task, DbError> {
        let id = TaskId::new(self.id.clone()).map_err(|_| DbError::InvalidEnum { value: self.id })?;
        Ok(Task {
            id,
            kind: decode_enum(&self.kind)?,
            subject: self.subject,
            status: decode_enum(&self.status)?,
            created_at: from_rfc3339(&self.created_at)?,
            started_at: self.started_at.as_deref().map(from_rfc3339).transpose()?,
            completed_at: self.completed_at.as_deref().map(from_rfc3339).transpose()?,
            output: self
                .output
                .as_deref()
                .map(decode_json::<TaskOutput>)
                .transpose()?,
            error: self
                .error
                .as_deref()
                .map(decode_json::<TaskFailure>)
                .transpose()?,
        })
    }
}

fn store_err(err: rusqlite::Error) -> TaskError {
    TaskError::Store(unavailable(&err))
}

fn codec_err(err: DbError) -> TaskError {
    TaskError::Store(err.into())
}
