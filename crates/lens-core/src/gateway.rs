use crate::cache::{CacheStore, snapshot_key};
use crate::error::{LensError, TaskError};
use crate::queue::TaskQueue;
use crate::types::{
    RepoReference, Task, TaskFailure, TaskId, TaskOutput, TaskPayload, TaskStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    Started {
        analysis_task_id: TaskId,
        fetch_task_id: TaskId,
    },
    StillInProgress {
        fetch_task_id: TaskId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    NotFound,
    Unavailable,
}

impl From<TaskStatus> for LookupStatus {
    fn from(value: TaskStatus) -> Self {
        match value {
            TaskStatus::Pending => Self::Pending,
            TaskStatus::Running => Self::Running,
            TaskStatus::Succeeded => Self::Succeeded,
            TaskStatus::Failed => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum TaskResultView {
    Output(TaskOutput),
    Failure(TaskFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaskStatusView {
    pub task_id: String,
    pub status: LookupStatus,
    pub result: Option<TaskResultView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TaskStatusView {
    fn from_task(task: Task) -> Self {
        let result = match task.status {
            TaskStatus::Succeeded => task.output.map(TaskResultView::Output),
            TaskStatus::Failed => task.error.map(TaskResultView::Failure),
            TaskStatus::Pending | TaskStatus::Running => None,
        };
        Self {
            task_id: task.id.to_string(),
            status: task.status.into(),
            result,
            detail: None,
        }
    }

    fn not_found(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: LookupStatus::NotFound,
            result: None,
            detail: None,
        }
    }

    fn unavailable(task_id: &str, reason: String) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: LookupStatus::Unavailable,
            result: None,
            detail: Some(reason),
        }
    }
}

/// Request-facing coordinator between callers and the task queue.
pub struct Gateway {
    queue: Arc<dyn TaskQueue>,
    cache: Arc<dyn CacheStore>,
    policy: RetryPolicy,
}

impl Gateway {
    pub fn new(queue: Arc<dyn TaskQueue>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            queue,
            cache,
            policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn fetch_repo(&self, repo_url: &str) -> Result<TaskId, LensError> {
        let reference = RepoReference::parse(repo_url)?;
        Ok(self.queue.enqueue(TaskPayload::Fetch { reference })?)
    }

    /// Enqueues a fetch and polls that one handle up to `policy.attempts`
    /// times, sleeping `initial_backoff * 2^n` between checks. No sleep
    /// follows the last check.
    pub async fn analyze(&self, repo_url: &str) -> Result<AnalyzeOutcome, LensError> {
        let reference = RepoReference::parse(repo_url)?;
        let fetch_task_id = self.queue.enqueue(TaskPayload::Fetch {
            reference: reference.clone(),
        })?;
        let mut backoff = self.policy.initial_backoff;
        let mut last_failure: Option<TaskFailure> = None;

        for attempt in 1..=self.policy.attempts {
            match self.queue.state(&fetch_task_id)? {
                Some(task) if task.status == TaskStatus::Succeeded => {
                    if let Some(snapshot) = task.snapshot() {
                        if let Some(completed_at) = task.completed_at {
                            let elapsed = completed_at - task.created_at;
                            info!(
                                %fetch_task_id,
                                repo = %reference,
                                fetch_ms = elapsed.num_milliseconds(),
                                "fetch ready for analysis"
                            );
                        }
                        let analysis_task_id = self.queue.enqueue(TaskPayload::Analyze {
                            snapshot: Box::new(snapshot.clone()),
                        })?;
                        return Ok(AnalyzeOutcome::Started {
                            analysis_task_id,
                            fetch_task_id,
                        });
                    }
                    last_failure = Some(TaskFailure {
                        code: "internal_error".to_string(),
                        message: "fetch task finished without a snapshot".to_string(),
                    });
                }
                Some(task) if task.status == TaskStatus::Failed => {
                    last_failure = Some(task.error.unwrap_or(TaskFailure {
                        code: "internal_error".to_string(),
                        message: "fetch task failed".to_string(),
                    }));
                }
                _ => last_failure = None,
            }

            if attempt < self.policy.attempts {
                info!(%fetch_task_id, attempt, backoff_ms = backoff.as_millis(), "fetch not ready, backing off");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        match last_failure {
            Some(failure) => {
                warn!(%fetch_task_id, repo = %reference, code = %failure.code, "fetch failed after retries");
                Err(LensError::FetchFailedAfterRetries {
                    attempts: self.policy.attempts,
                    fetch_task_id: fetch_task_id.to_string(),
                    message: failure.message,
                })
            }
            None => Ok(AnalyzeOutcome::StillInProgress { fetch_task_id }),
        }
    }

    pub fn task_status(&self, task_id: &str) -> TaskStatusView {
        let Ok(id) = task_id.parse::<TaskId>() else {
            return TaskStatusView::not_found(task_id);
        };
        Self::view(task_id, self.queue.state(&id))
    }

    pub async fn wait_task_status(&self, task_id: &str, timeout: Duration) -> TaskStatusView {
        let Ok(id) = task_id.parse::<TaskId>() else {
            return TaskStatusView::not_found(task_id);
        };
        Self::view(task_id, self.queue.wait(&id, timeout).await)
    }

    fn view(task_id: &str, lookup: Result<Option<Task>, TaskError>) -> TaskStatusView {
        match lookup {
            Ok(Some(task)) => TaskStatusView::from_task(task),
            Ok(None) | Err(TaskError::NotFound) => TaskStatusView::not_found(task_id),
            Err(err) => {
                warn!(%task_id, error = %err, "task lookup failed");
                TaskStatusView::unavailable(task_id, err.to_string())
            }
        }
    }

    pub fn invalidate(&self, repo_url: &str) -> Result<bool, LensError> {
        let reference = RepoReference::parse(repo_url)?;
        let removed = self.cache.invalidate(&snapshot_key(&reference))?;
        info!(repo = %reference, removed, "snapshot cache invalidated");
        Ok(removed)
    }
}
