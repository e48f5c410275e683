use crate::error::FetchError;
use crate::source::{EntryKind, ListingEntry, RepoSource};
use crate::types::{RepoReference, Snapshot};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Builds a [`Snapshot`] from one listing call plus one download per file.
///
/// Downloads run concurrently, at most `max_in_flight` at a time. A failed
/// download becomes an error marker in the snapshot; only a failed listing
/// fails the whole fetch. There is no retry here.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn RepoSource>,
    max_in_flight: usize,
}

impl Fetcher {
    pub fn new(source: Arc<dyn RepoSource>, max_in_flight: usize) -> Self {
        Self {
            source,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub async fn fetch(&self, reference: &RepoReference) -> Result<Snapshot, FetchError> {
        let listing = self.source.list(reference).await?;
        let files: Vec<ListingEntry> = listing
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::File)
            .collect();
        debug!(repo = %reference, files = files.len(), "downloading listed files");

        let source = &self.source;
        let results: Vec<(String, Result<String, FetchError>)> = stream::iter(files)
            .map(|entry| async move {
                let result = source.fetch_file(&entry).await;
                (entry.path, result)
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        let mut snapshot = Snapshot::new(reference.clone(), Utc::now());
        for (path, result) in results {
            match result {
                Ok(content) => snapshot.insert_file(path, content),
                Err(err) => {
                    warn!(repo = %reference, %path, error = %err, "file download failed");
                    snapshot.insert_failure(path, &file_error_detail(&err));
                }
            }
        }
        Ok(snapshot)
    }
}

fn file_error_detail(err: &FetchError) -> String {
    match err {
        FetchError::RateLimited => "403".to_string(),
        FetchError::NotFound => "404".to_string(),
        FetchError::UnexpectedStatus { status } => status.to_string(),
        other => other.to_string(),
    }
}
