use crate::error::TaskError;
use crate::types::{Task, TaskFailure, TaskOutput, TaskStatus};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskUpdate {
    Running,
    Succeeded(TaskOutput),
    Failed(TaskFailure),
}

impl TaskUpdate {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Running => TaskStatus::Running,
            Self::Succeeded(_) => TaskStatus::Succeeded,
            Self::Failed(_) => TaskStatus::Failed,
        }
    }
}

pub fn validate_task_status_transition(from: TaskStatus, to: TaskStatus) -> Result<(), TaskError> {
    use TaskStatus::{Failed, Pending, Running, Succeeded};

    let valid = matches!(
        (from, to),
        (Pending, Running)
            | (Pending, Succeeded)
            | (Pending, Failed)
            | (Running, Succeeded)
            | (Running, Failed)
            | (Running, Running)
    );

    if valid {
        Ok(())
    } else {
        Err(TaskError::InvalidTransition { from, to })
    }
}

pub fn apply_task_update(mut task: Task, update: TaskUpdate) -> Result<Task, TaskError> {
    validate_task_status_transition(task.status, update.status())?;
    let now = Utc::now();
    task.status = update.status();
    match update {
        TaskUpdate::Running => {
            task.started_at.get_or_insert(now);
        }
        TaskUpdate::Succeeded(output) => {
            task.output = Some(output);
            task.completed_at = Some(now);
        }
        TaskUpdate::Failed(failure) => {
            task.error = Some(failure);
            task.completed_at = Some(now);
        }
    }
    Ok(task)
}
