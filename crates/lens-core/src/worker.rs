use crate::cache::{CacheStore, DEFAULT_TTL, analysis_key, get_json, put_json, snapshot_key};
use crate::error::TaskError;
use crate::fetcher::Fetcher;
use crate::inference::{AnalysisRequest, InferenceClient};
use crate::tasks::TaskStore;
use crate::types::{AnalysisResult, RepoReference, Snapshot, Task, TaskId, TaskOutput, TaskPayload};
use crate::validation::TaskUpdate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Executes fetch and analysis task bodies.
///
/// A cache hit completes the task without marking it running. On a miss the
/// task is marked running before the external call, and only successful
/// results are written back to the cache.
#[derive(Clone)]
pub struct Worker {
    fetcher: Fetcher,
    inference: Arc<dyn InferenceClient>,
    cache: Arc<dyn CacheStore>,
    cache_ttl: Duration,
}

impl Worker {
    pub fn new(
        fetcher: Fetcher,
        inference: Arc<dyn InferenceClient>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            fetcher,
            inference,
            cache,
            cache_ttl: DEFAULT_TTL,
        }
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub async fn run(
        &self,
        task_id: &TaskId,
        payload: TaskPayload,
        tasks: &dyn TaskStore,
    ) -> Result<Task, TaskError> {
        let update = match payload {
            TaskPayload::Fetch { reference } => self.run_fetch(task_id, &reference, tasks).await?,
            TaskPayload::Analyze { snapshot } => {
                self.run_analysis(task_id, &snapshot, tasks).await?
            }
        };
        let task = tasks.update(task_id, update)?;
        info!(task_id = %task.id, kind = ?task.kind, status = ?task.status, "task finished");
        Ok(task)
    }

    async fn run_fetch(
        &self,
        task_id: &TaskId,
        reference: &RepoReference,
        tasks: &dyn TaskStore,
    ) -> Result<TaskUpdate, TaskError> {
        let key = snapshot_key(reference);
        if let Some(snapshot) = self.cached::<Snapshot>(&key) {
            info!(%task_id, repo = %reference, "snapshot cache hit");
            return Ok(TaskUpdate::Succeeded(TaskOutput::Snapshot(snapshot)));
        }

        tasks.update(task_id, TaskUpdate::Running)?;
        let started = Instant::now();
        match self.fetcher.fetch(reference).await {
            Ok(snapshot) => {
                info!(
                    %task_id,
                    repo = %reference,
                    files = snapshot.files.len(),
                    failed_files = snapshot.failed_paths.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "repository fetched"
                );
                self.store(&key, &snapshot);
                Ok(TaskUpdate::Succeeded(TaskOutput::Snapshot(snapshot)))
            }
            Err(err) => {
                warn!(%task_id, repo = %reference, error = %err, "repository fetch failed");
                Ok(TaskUpdate::Failed((&err).into()))
            }
        }
    }

    async fn run_analysis(
        &self,
        task_id: &TaskId,
        snapshot: &Snapshot,
        tasks: &dyn TaskStore,
    ) -> Result<TaskUpdate, TaskError> {
        let key = match analysis_key(snapshot) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(%task_id, error = %err, "could not derive analysis cache key");
                None
            }
        };
        if let Some(result) = key.as_deref().and_then(|key| self.cached::<AnalysisResult>(key)) {
            info!(%task_id, repo = %snapshot.source, "analysis cache hit");
            return Ok(TaskUpdate::Succeeded(TaskOutput::Analysis(result)));
        }

        tasks.update(task_id, TaskUpdate::Running)?;
        let request = AnalysisRequest::from_snapshot(snapshot);
        let started = Instant::now();
        let outcome = self.inference.analyze(&request).await;
        let elapsed_ms = started.elapsed().as_millis();
        match outcome {
            Ok(result) => {
                info!(
                    %task_id,
                    repo = %snapshot.source,
                    elapsed_ms,
                    response_len = result.text.len(),
                    truncated = result.truncated,
                    "analysis completed"
                );
                if let Some(key) = key.as_deref() {
                    self.store(key, &result);
                }
                Ok(TaskUpdate::Succeeded(TaskOutput::Analysis(result)))
            }
            Err(err) => {
                warn!(%task_id, repo = %snapshot.source, elapsed_ms, error = %err, "analysis failed");
                Ok(TaskUpdate::Failed((&err).into()))
            }
        }
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match get_json(self.cache.as_ref(), key) {
            Ok(value) => value,
            Err(err) => {
                warn!(%key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(err) = put_json(self.cache.as_ref(), key, value, self.cache_ttl) {
            warn!(%key, error = %err, "cache write failed");
        }
    }
}
