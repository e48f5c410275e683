use crate::types::repo::RepoReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use utoipa::ToSchema;

pub const FILE_ERROR_PREFIX: &str = "Error fetching file: ";

/// Contents of one repository's top-level files at a point in time.
///
/// Files that could not be downloaded keep an entry whose content is an
/// error marker starting with [`FILE_ERROR_PREFIX`]; their paths are also
/// listed in `failed_paths`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Snapshot {
    pub source: RepoReference,
    pub files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    #[schema(value_type = Vec<String>)]
    pub failed_paths: BTreeSet<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(source: RepoReference, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source,
            files: BTreeMap::new(),
            failed_paths: BTreeSet::new(),
            fetched_at,
        }
    }

    pub fn insert_file(&mut self, path: String, content: String) {
        self.failed_paths.remove(&path);
        self.files.insert(path, content);
    }

    pub fn insert_failure(&mut self, path: String, detail: &str) {
        self.files
            .insert(path.clone(), format!("{FILE_ERROR_PREFIX}{detail}"));
        self.failed_paths.insert(path);
    }

    pub fn is_failed(&self, path: &str) -> bool {
        self.failed_paths.contains(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResult {
    pub text: String,
    pub truncated: bool,
}
