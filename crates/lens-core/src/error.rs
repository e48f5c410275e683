use crate::types::{TaskFailure, TaskStatus};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("invalid repository url: {input}")]
    Malformed { input: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error(transparent)]
    InvalidReference(#[from] ReferenceError),
    #[error("remote api rate limit exceeded or access forbidden")]
    RateLimited,
    #[error("repository not found")]
    NotFound,
    #[error("unexpected status from remote api: {status}")]
    UnexpectedStatus { status: u16 },
    #[error("transport error: {reason}")]
    Transport { reason: String },
    #[error("invalid listing: {reason}")]
    InvalidListing { reason: String },
}

impl FetchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidReference(_) => "invalid_reference",
            Self::RateLimited => "remote_rate_limited",
            Self::NotFound => "remote_not_found",
            Self::UnexpectedStatus { .. } => "remote_unexpected_status",
            Self::Transport { .. } => "remote_transport",
            Self::InvalidListing { .. } => "remote_invalid_listing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("inference api key is missing")]
    AuthMissing,
    #[error("{message}")]
    Provider { message: String },
}

impl InferenceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthMissing => "inference_auth_missing",
            Self::Provider { .. } => "inference_provider_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("stored value could not be decoded: {reason}")]
    Codec { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task not found")]
    NotFound,
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<&FetchError> for TaskFailure {
    fn from(value: &FetchError) -> Self {
        Self {
            code: value.code().to_string(),
            message: value.to_string(),
        }
    }
}

impl From<&InferenceError> for TaskFailure {
    fn from(value: &InferenceError) -> Self {
        Self {
            code: value.code().to_string(),
            message: value.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LensError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("repository fetch failed after {attempts} attempts: {message}")]
    FetchFailedAfterRetries {
        attempts: u32,
        fetch_task_id: String,
        message: String,
    },
    #[error("internal error: {message}")]
    Internal { message: String },
}
