use crate::error::InferenceError;
use crate::types::{AnalysisResult, Snapshot};
use async_trait::async_trait;
use std::fmt::Write as _;

const SYSTEM_PROMPT: &str = "You review source code repositories and report on their quality.";

const INSTRUCTIONS: &str = "Review the repository files below and report, with headings:\n\
- Code complexity: functions or areas that are hard to follow or should be refactored.\n\
- Security: likely vulnerabilities or unsafe patterns.\n\
- Best practices: deviations from common conventions for the languages used.\n\
- Documentation: missing or misleading documentation.\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub system: String,
    pub prompt: String,
}

impl AnalysisRequest {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut prompt = String::from(INSTRUCTIONS);
        let _ = write!(prompt, "\nRepository: {}\n", snapshot.source);
        for (path, content) in &snapshot.files {
            if snapshot.is_failed(path) {
                let _ = write!(prompt, "\n### {path} (not retrieved)\n{content}\n");
            } else {
                let _ = write!(prompt, "\n### {path}\n```\n{content}\n```\n");
            }
        }
        Self {
            system: SYSTEM_PROMPT.to_string(),
            prompt,
        }
    }
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, InferenceError>;
}
