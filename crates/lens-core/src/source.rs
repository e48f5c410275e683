use crate::error::FetchError;
use crate::types::RepoReference;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub path: String,
    pub kind: EntryKind,
    pub download_url: Option<String>,
}

impl ListingEntry {
    pub fn file(path: &str, download_url: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: EntryKind::File,
            download_url: Some(download_url.to_string()),
        }
    }

    pub fn dir(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: EntryKind::Dir,
            download_url: None,
        }
    }
}

/// Single-attempt access to a repository host.
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn list(&self, reference: &RepoReference) -> Result<Vec<ListingEntry>, FetchError>;

    async fn fetch_file(&self, entry: &ListingEntry) -> Result<String, FetchError>;
}
