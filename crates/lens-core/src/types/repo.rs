use crate::error::ReferenceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Owner and name of a hosted repository.
///
/// Both parts are stored lowercased with any `.git` suffix removed, so two
/// spellings of the same URL produce equal references and equal cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct RepoReference {
    pub owner: String,
    pub name: String,
}

impl RepoReference {
    pub fn new(owner: &str, name: &str) -> Result<Self, ReferenceError> {
        let owner = normalize_segment(owner);
        let name = normalize_segment(name.strip_suffix(".git").unwrap_or(name));
        if owner.is_empty() || name.is_empty() {
            return Err(ReferenceError::Malformed {
                input: format!("{owner}/{name}"),
            });
        }
        Ok(Self { owner, name })
    }

    /// Accepts `https://host/owner/name`, `host/owner/name/` or `owner/name`.
    /// The last two path segments win, query and fragment are ignored.
    pub fn parse(input: &str) -> Result<Self, ReferenceError> {
        let malformed = || ReferenceError::Malformed {
            input: input.to_string(),
        };
        let trimmed = input.trim();
        let without_suffix = trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_matches('/');
        let parts: Vec<&str> = without_suffix.split('/').collect();
        if parts.len() < 2 {
            return Err(malformed());
        }
        let owner = parts[parts.len() - 2];
        let name = parts[parts.len() - 1];
        if owner.ends_with(':') || !valid_segment(owner) || !valid_segment(name) {
            return Err(malformed());
        }
        Self::new(owner, name).map_err(|_| malformed())
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

fn normalize_segment(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn valid_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl fmt::Display for RepoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
