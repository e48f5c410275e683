use crate::error::{StoreError, TaskError};
use crate::types::{Task, TaskId};
use crate::validation::{TaskUpdate, apply_task_update};
use std::collections::HashMap;
use std::sync::Mutex;

pub trait TaskStore: Send + Sync {
    fn insert(&self, task: &Task) -> Result<(), TaskError>;
    fn get(&self, id: &TaskId) -> Result<Option<Task>, TaskError>;
    fn update(&self, id: &TaskId, update: TaskUpdate) -> Result<Task, TaskError>;
}

#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TaskId, Task>>, TaskError> {
        self.tasks.lock().map_err(|_| {
            TaskError::Store(StoreError::Unavailable {
                reason: "memory task store lock poisoned".to_string(),
            })
        })
    }
}

impl TaskStore for MemoryTaskStore {
    fn insert(&self, task: &Task) -> Result<(), TaskError> {
        self.lock()?.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Result<Option<Task>, TaskError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn update(&self, id: &TaskId, update: TaskUpdate) -> Result<Task, TaskError> {
        let mut tasks = self.lock()?;
        let current = tasks.get(id).cloned().ok_or(TaskError::NotFound)?;
        let next = apply_task_update(current, update)?;
        tasks.insert(id.clone(), next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RepoReference, TaskPayload, TaskStatus};

    #[test]
    fn update_of_unknown_task_is_not_found() {
        let store = MemoryTaskStore::new();
        assert!(matches!(
            store.update(&TaskId::generate(), TaskUpdate::Running),
            Err(TaskError::NotFound)
        ));
    }

    #[test]
    fn reads_are_repeatable_after_completion() {
        let store = MemoryTaskStore::new();
        let payload = TaskPayload::Fetch {
            reference: RepoReference::new("acme", "widgets").unwrap(),
        };
        let task = Task::pending(TaskId::generate(), &payload);
        store.insert(&task).unwrap();
        store.update(&task.id, TaskUpdate::Running).unwrap();
        let failed = store
            .update(
                &task.id,
                TaskUpdate::Failed(crate::types::TaskFailure {
                    code: "remote_transport".to_string(),
                    message: "boom".to_string(),
                }),
            )
            .unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(store.get(&task.id).unwrap(), Some(failed.clone()));
        assert_eq!(store.get(&task.id).unwrap(), Some(failed));
    }
}
