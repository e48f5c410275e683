use crate::schema;
use crate::util::{to_rfc3339, unavailable};
use chrono::{DateTime, Utc};
use lens_core::cache::CacheStore;
use lens_core::error::StoreError;
use rusqlite::{Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite-backed cache shared by every process pointed at the same file.
///
/// Expired rows stay on disk until `cleanup` runs but are never returned.
pub struct DbCache {
    conn: Mutex<Connection>,
}

impl DbCache {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = schema::open_and_migrate(path).map_err(|err| unavailable(&err))?;
        Ok(Self::new(conn))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = schema::with_test_db().map_err(|err| unavailable(&err))?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Unavailable {
            reason: "cache connection lock poisoned".to_string(),
        })
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at_ms > ?2",
            (key, now.timestamp_millis()),
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|err| unavailable(&err))
    }

    fn put_at(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at_ms = now.timestamp_millis().saturating_add(ttl_ms);
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, value, created_at, expires_at_ms) VALUES (?1, ?2, ?3, ?4)",
            (key, value, to_rfc3339(&now), expires_at_ms),
        )
        .map_err(|err| unavailable(&err))?;
        Ok(())
    }

    /// Deletes rows whose expiry is at or before `now`.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at_ms <= ?1",
                [now.timestamp_millis()],
            )
            .map_err(|err| unavailable(&err))?;
        Ok(affected as u64)
    }
}

impl CacheStore for DbCache {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_at(key, Utc::now())
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.put_at(key, value, ttl, Utc::now())
    }

    fn invalidate(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let affected = conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", [key])
            .map_err(|err| unavailable(&err))?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn put_then_get_returns_value() {
        let cache = DbCache::in_memory().expect("cache");
        cache.put("repo_cache:a/b", "{}", HOUR).expect("put");
        assert_eq!(
            cache.get("repo_cache:a/b").expect("get"),
            Some("{}".to_string())
        );
        assert_eq!(cache.get("repo_cache:a/c").expect("get"), None);
    }

    #[test]
    fn expired_entries_are_hidden() {
        let cache = DbCache::in_memory().expect("cache");
        let now = Utc::now();
        cache.put_at("k", "v", HOUR, now).expect("put");

        let before = now + TimeDelta::minutes(59);
        let after = now + TimeDelta::minutes(61);
        assert_eq!(cache.get_at("k", before).expect("get"), Some("v".into()));
        assert_eq!(cache.get_at("k", after).expect("get"), None);
    }

    #[test]
    fn put_replaces_existing_value_and_expiry() {
        let cache = DbCache::in_memory().expect("cache");
        let now = Utc::now();
        cache.put_at("k", "old", Duration::from_secs(60), now).expect("put");
        cache.put_at("k", "new", HOUR, now).expect("put");

        let later = now + TimeDelta::minutes(30);
        assert_eq!(cache.get_at("k", later).expect("get"), Some("new".into()));
    }

    #[test]
    fn invalidate_reports_whether_a_row_was_removed() {
        let cache = DbCache::in_memory().expect("cache");
        cache.put("k", "v", HOUR).expect("put");
        assert!(cache.invalidate("k").expect("invalidate"));
        assert!(!cache.invalidate("k").expect("invalidate"));
        assert_eq!(cache.get("k").expect("get"), None);
    }

    #[test]
    fn cleanup_drops_only_expired_rows() {
        let cache = DbCache::in_memory().expect("cache");
        let now = Utc::now();
        cache.put_at("short", "v", Duration::from_secs(60), now).expect("put");
        cache.put_at("long", "v", HOUR, now).expect("put");

        let removed = cache
            .cleanup(now + TimeDelta::minutes(5))
            .expect("cleanup");
        assert_eq!(removed, 1);
        assert_eq!(cache.get_at("long", now).expect("get"), Some("v".into()));
    }

    #[test]
    fn file_backed_cache_is_visible_to_a_second_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lens.db");
        let path = path.to_str().expect("utf8 path");

        let writer = DbCache::open(path).expect("writer");
        writer.put("shared", "v", HOUR).expect("put");

        let reader = DbCache::open(path).expect("reader");
        assert_eq!(reader.get("shared").expect("get"), Some("v".into()));
    }
}
