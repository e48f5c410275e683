use crate::AppState;
use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use lens_core::cache::MemoryCache;
use lens_core::error::{FetchError, InferenceError, StoreError, TaskError};
use lens_core::fetcher::Fetcher;
use lens_core::inference::{AnalysisRequest, InferenceClient};
use lens_core::source::{ListingEntry, RepoSource};
use lens_core::tasks::MemoryTaskStore;
use lens_core::types::{AnalysisResult, RepoReference, Task, TaskId, TaskPayload};
use lens_core::{Gateway, LocalQueue, RetryPolicy, TaskQueue, Worker};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Serves two files for any repository except one named `missing`.
struct StaticSource;

#[async_trait]
impl RepoSource for StaticSource {
    async fn list(&self, reference: &RepoReference) -> Result<Vec<ListingEntry>, FetchError> {
        if reference.name == "missing" {
            return Err(FetchError::NotFound);
        }
        Ok(vec![
            ListingEntry::file("README.md", "mem://README.md"),
            ListingEntry::file("main.rs", "mem://main.rs"),
            ListingEntry::dir("src"),
        ])
    }

    async fn fetch_file(&self, entry: &ListingEntry) -> Result<String, FetchError> {
        Ok(format!("contents of {}", entry.path))
    }
}

struct ReplyInference;

#[async_trait]
impl InferenceClient for ReplyInference {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisResult, InferenceError> {
        Ok(AnalysisResult {
            text: "ok".to_string(),
            truncated: false,
        })
    }
}

pub struct BrokenQueue;

#[async_trait]
impl TaskQueue for BrokenQueue {
    fn enqueue(&self, _payload: TaskPayload) -> Result<TaskId, TaskError> {
        Err(unavailable())
    }

    fn state(&self, _id: &TaskId) -> Result<Option<Task>, TaskError> {
        Err(unavailable())
    }

    async fn wait(&self, _id: &TaskId, _timeout: Duration) -> Result<Option<Task>, TaskError> {
        Err(unavailable())
    }
}

fn unavailable() -> TaskError {
    TaskError::Store(StoreError::Unavailable {
        reason: "queue backend offline".to_string(),
    })
}

pub fn state() -> AppState {
    let cache = Arc::new(MemoryCache::new());
    let worker = Worker::new(
        Fetcher::new(Arc::new(StaticSource), 4),
        Arc::new(ReplyInference),
        cache.clone(),
    );
    let queue = LocalQueue::new(worker, Arc::new(MemoryTaskStore::new()), 2);
    let gateway = Gateway::new(Arc::new(queue), cache).with_retry_policy(RetryPolicy {
        attempts: 5,
        initial_backoff: Duration::from_millis(20),
    });
    AppState::new(Arc::new(gateway))
}

pub fn broken_state() -> AppState {
    let gateway = Gateway::new(Arc::new(BrokenQueue), Arc::new(MemoryCache::new()));
    AppState::new(Arc::new(gateway))
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
