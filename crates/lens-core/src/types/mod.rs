pub mod ids;
pub mod repo;
pub mod snapshot;
pub mod task;

pub use ids::{IdError, TaskId};
pub use repo::RepoReference;
pub use snapshot::{AnalysisResult, Snapshot};
pub use task::{Task, TaskFailure, TaskKind, TaskOutput, TaskPayload, TaskStatus};
