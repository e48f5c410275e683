use crate::error::StoreError;
use crate::types::{RepoReference, Snapshot};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Shared key-value store with per-entry expiry.
///
/// Implementations must hide expired entries from `get`; callers never
/// sweep.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    fn invalidate(&self, key: &str) -> Result<bool, StoreError>;
}

pub fn snapshot_key(reference: &RepoReference) -> String {
    format!("repo_cache:{}", reference.slug())
}

#[derive(Serialize)]
struct SnapshotContent<'a> {
    source: &'a RepoReference,
    files: &'a BTreeMap<String, String>,
    failed_paths: &'a BTreeSet<String>,
}

pub fn analysis_key(snapshot: &Snapshot) -> Result<String, StoreError> {
    let content = SnapshotContent {
        source: &snapshot.source,
        files: &snapshot.files,
        failed_paths: &snapshot.failed_paths,
    };
    let bytes = serde_json::to_vec(&content).map_err(|err| StoreError::Codec {
        reason: err.to_string(),
    })?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("ai_analysis:{}", hex::encode(digest)))
}

pub fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = cache.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| StoreError::Codec {
            reason: err.to_string(),
        })
}

pub fn put_json<T: Serialize>(
    cache: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|err| StoreError::Codec {
        reason: err.to_string(),
    })?;
    cache.put(key, &raw, ttl)
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Unavailable {
            reason: "memory cache lock poisoned".to_string(),
        })
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(u64::from(u32::MAX)));
        self.lock()?
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot_with(files: &[(&str, &str)]) -> Snapshot {
        let mut snapshot = Snapshot::new(RepoReference::new("acme", "widgets").unwrap(), Utc::now());
        for (path, content) in files {
            snapshot.insert_file((*path).to_string(), (*content).to_string());
        }
        snapshot
    }

    #[test]
    fn analysis_key_ignores_insertion_order_and_fetch_time() {
        let a = snapshot_with(&[("README.md", "hello"), ("main.rs", "fn main() {}")]);
        let mut b = snapshot_with(&[("main.rs", "fn main() {}"), ("README.md", "hello")]);
        b.fetched_at = a.fetched_at + chrono::Duration::hours(3);
        assert_eq!(analysis_key(&a).unwrap(), analysis_key(&b).unwrap());
    }

    #[test]
    fn analysis_key_changes_with_content() {
        let a = snapshot_with(&[("README.md", "hello")]);
        let b = snapshot_with(&[("README.md", "hello!")]);
        assert_ne!(analysis_key(&a).unwrap(), analysis_key(&b).unwrap());
        assert!(analysis_key(&a).unwrap().starts_with("ai_analysis:"));
    }

    #[test]
    fn snapshot_key_uses_normalized_reference() {
        let reference = RepoReference::parse("https://github.com/Acme/Widgets.git").unwrap();
        assert_eq!(snapshot_key(&reference), "repo_cache:acme/widgets");
    }

    #[tokio::test(start_paused = true)]
    async fn memory_cache_expires_lazily() {
        let cache = MemoryCache::new();
        cache.put("k", "v", Duration::from_secs(10)).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn invalidate_reports_whether_entry_existed() {
        let cache = MemoryCache::new();
        cache.put("k", "v", DEFAULT_TTL).unwrap();
        assert!(cache.invalidate("k").unwrap());
        assert!(!cache.invalidate("k").unwrap());
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn json_helpers_round_trip_typed_values() {
        let cache = MemoryCache::new();
        let snapshot = snapshot_with(&[("a.txt", "a")]);
        put_json(&cache, "snap", &snapshot, DEFAULT_TTL).unwrap();
        let loaded: Option<Snapshot> = get_json(&cache, "snap").unwrap();
        assert_eq!(loaded, Some(snapshot));
    }
}
