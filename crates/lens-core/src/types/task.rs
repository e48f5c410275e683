use crate::types::ids::TaskId;
use crate::types::repo::RepoReference;
use crate::types::snapshot::{AnalysisResult, Snapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Fetch,
    Analyze,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    Fetch { reference: RepoReference },
    Analyze { snapshot: Box<Snapshot> },
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Fetch { .. } => TaskKind::Fetch,
            Self::Analyze { .. } => TaskKind::Analyze,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::Fetch { reference } => reference.slug(),
            Self::Analyze { snapshot } => snapshot.source.slug(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum TaskOutput {
    Snapshot(Snapshot),
    Analysis(AnalysisResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaskFailure {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub subject: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<TaskOutput>,
    pub error: Option<TaskFailure>,
}

impl Task {
    pub fn pending(id: TaskId, payload: &TaskPayload) -> Self {
        Self {
            id,
            kind: payload.kind(),
            subject: payload.subject(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match &self.output {
            Some(TaskOutput::Snapshot(snapshot)) => Some(snapshot),
            _ => None,
        }
    }
}
