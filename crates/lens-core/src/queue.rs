use crate::error::TaskError;
use crate::tasks::TaskStore;
use crate::types::{Task, TaskFailure, TaskId, TaskPayload};
use crate::validation::TaskUpdate;
use crate::worker::Worker;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Semaphore, broadcast};
use tokio::time::Instant;
use tracing::{error, info};

pub const DEFAULT_WORKERS: usize = 4;

/// Asynchronous work submission.
///
/// Every `enqueue` returns a fresh id. Execution happens off the caller's
/// task, so callers must observe progress through `state` or `wait`.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, payload: TaskPayload) -> Result<TaskId, TaskError>;

    fn state(&self, id: &TaskId) -> Result<Option<Task>, TaskError>;

    /// Returns once the task is terminal or `timeout` has elapsed, whichever
    /// comes first, with the latest known state.
    async fn wait(&self, id: &TaskId, timeout: Duration) -> Result<Option<Task>, TaskError>;
}

#[derive(Clone)]
pub struct TaskEvents {
    sender: broadcast::Sender<Task>,
}

impl TaskEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Task> {
        self.sender.subscribe()
    }

    pub fn publish(&self, task: Task) {
        let _ = self.sender.send(task);
    }
}

struct LocalQueueInner {
    worker: Worker,
    tasks: Arc<dyn TaskStore>,
    permits: Semaphore,
    events: TaskEvents,
}

/// In-process backend: tasks run as tokio tasks, at most `workers` at once.
#[derive(Clone)]
pub struct LocalQueue {
    inner: Arc<LocalQueueInner>,
}

impl LocalQueue {
    pub fn new(worker: Worker, tasks: Arc<dyn TaskStore>, workers: usize) -> Self {
        Self {
            inner: Arc::new(LocalQueueInner {
                worker,
                tasks,
                permits: Semaphore::new(workers.max(1)),
                events: TaskEvents::new(1024),
            }),
        }
    }
}

async fn execute(inner: Arc<LocalQueueInner>, id: TaskId, payload: TaskPayload) {
    let Ok(_permit) = inner.permits.acquire().await else {
        return;
    };
    match inner.worker.run(&id, payload, inner.tasks.as_ref()).await {
        Ok(task) => inner.events.publish(task),
        Err(err) => {
            error!(task_id = %id, error = %err, "task aborted");
            let failure = TaskFailure {
                code: "internal_error".to_string(),
                message: err.to_string(),
            };
            match inner.tasks.update(&id, TaskUpdate::Failed(failure)) {
                Ok(task) => inner.events.publish(task),
                Err(err) => error!(task_id = %id, error = %err, "could not record task failure"),
            }
        }
    }
}

#[async_trait]
impl TaskQueue for LocalQueue {
    fn enqueue(&self, payload: TaskPayload) -> Result<TaskId, TaskError> {
        let task = Task::pending(TaskId::generate(), &payload);
        self.inner.tasks.insert(&task)?;
        info!(task_id = %task.id, kind = ?task.kind, subject = %task.subject, "task enqueued");
        tokio::spawn(execute(self.inner.clone(), task.id.clone(), payload));
        Ok(task.id)
    }

    fn state(&self, id: &TaskId) -> Result<Option<Task>, TaskError> {
        self.inner.tasks.get(id)
    }

    async fn wait(&self, id: &TaskId, timeout: Duration) -> Result<Option<Task>, TaskError> {
        let mut receiver = self.inner.events.subscribe();
        let deadline = Instant::now() + timeout;
        match self.state(id)? {
            Some(task) if !task.status.is_terminal() => {}
            other => return Ok(other),
        }
        loop {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Ok(Ok(task)) if task.id == *id => return Ok(Some(task)),
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(_))) => {
                    if let Some(task) = self.state(id)? {
                        if task.status.is_terminal() {
                            return Ok(Some(task));
                        }
                    }
                }
                Ok(Err(RecvError::Closed)) | Err(_) => return self.state(id),
            }
        }
    }
}
