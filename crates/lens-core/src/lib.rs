pub mod cache;
pub mod error;
pub mod fetcher;
pub mod gateway;
pub mod inference;
pub mod queue;
pub mod source;
pub mod tasks;
pub mod validation;
pub mod worker;

pub mod types;

pub use crate::error::LensError;
pub use crate::gateway::{AnalyzeOutcome, Gateway, RetryPolicy};
pub use crate::queue::{LocalQueue, TaskQueue};
pub use crate::worker::Worker;
