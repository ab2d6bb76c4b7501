// Cache store contract and in-memory implementation.
// Stores operation results under string keys with a per-entry lifetime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::operation::OperationResult;

/// Key/value store the caching decorator reads from and writes to.
///
/// Implementations must report an expired entry as a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<OperationResult>>;

    async fn set(&self, key: &str, value: &OperationResult, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;

    /// Remove every entry whose key starts with `prefix`, returning how many went.
    async fn invalidate_prefix(&self, prefix: &str) -> Result<usize>;
}

const MAX_ENTRY_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// One stored result with its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: OperationResult,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry that expires `ttl` from now.
    /// Lifetimes are capped at ten years.
    pub fn new(key: &str, value: OperationResult, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl.min(MAX_ENTRY_TTL))
            .unwrap_or(chrono::Duration::zero());
        let expires_at = Utc::now() + ttl;

        Self {
            key: key.to_string(),
            value,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Writes between two sweeps of expired entries.
pub const DEFAULT_PURGE_INTERVAL: u64 = 256;

/// Counts writes and says when a store should sweep expired entries.
#[derive(Debug)]
pub(crate) struct PurgeSchedule {
    interval: u64,
    writes: AtomicU64,
}

impl PurgeSchedule {
    pub(crate) fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            writes: AtomicU64::new(0),
        }
    }

    /// Record one write; true on every `interval`-th.
    pub(crate) fn record_write(&self) -> bool {
        (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % self.interval == 0
    }
}

impl Default for PurgeSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_PURGE_INTERVAL)
    }
}

/// Process-local store backed by a concurrent map.
///
/// Expired entries are dropped lazily on read, and swept on every
/// `DEFAULT_PURGE_INTERVAL`-th write so keys that are never read again do not
/// accumulate.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    purge: PurgeSchedule,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep expired entries every `interval` writes instead of the default.
    pub fn with_purge_interval(interval: u64) -> Self {
        Self {
            entries: DashMap::new(),
            purge: PurgeSchedule::new(interval),
        }
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all expired entries.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<OperationResult>> {
        let (value, expired) = match self.entries.get(key) {
            Some(entry) => (entry.value.clone(), entry.is_expired()),
            None => return Ok(None),
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
            return Ok(None);
        }
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &OperationResult, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(key, value.clone(), ttl));
        if self.purge.record_write() {
            let removed = self.purge_expired();
            debug!(removed, "purged expired cache entries");
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<usize> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        Ok(keys
            .iter()
            .filter(|key| self.entries.remove(key.as_str()).is_some())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        let value = OperationResult::success(json!({"name": "Hello-World"}));

        store
            .set("github:repo:o:r:get", &value, Duration::from_secs(60))
            .await
            .unwrap();

        let cached = store.get("github:repo:o:r:get").await.unwrap();
        assert_eq!(cached, Some(value));
        assert_eq!(store.get("github:repo:o:r:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = MemoryStore::new();
        let value = OperationResult::success(json!(1));

        store.set("k", &value, Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_entry_expiry() {
        let mut entry = CacheEntry::new("k", OperationResult::success(json!(1)), Duration::from_secs(300));
        assert!(!entry.is_expired());

        entry.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let entry = CacheEntry::new("k", OperationResult::success(json!(1)), Duration::MAX);
        assert!(!entry.is_expired());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        let value = OperationResult::success(json!(1));
        store.set("old", &value, Duration::ZERO).await.unwrap();
        store.set("new", &value, Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_entries() {
        let store = MemoryStore::with_purge_interval(100);
        let value = OperationResult::success(json!(1));

        for n in 0..1000 {
            store
                .set(&format!("github:search:q{}", n), &value, Duration::ZERO)
                .await
                .unwrap();
        }
        assert!(store.len() < 100, "{} entries left", store.len());

        store.set("kept", &value, Duration::from_secs(60)).await.unwrap();
        for n in 0..200 {
            store.set(&format!("gone{}", n), &value, Duration::ZERO).await.unwrap();
        }
        assert!(store.get("kept").await.unwrap().is_some());
    }

    #[test]
    fn test_purge_schedule() {
        let schedule = PurgeSchedule::new(3);
        let due: Vec<bool> = (0..6).map(|_| schedule.record_write()).collect();
        assert_eq!(due, vec![false, false, true, false, false, true]);

        let every_write = PurgeSchedule::new(0);
        assert!(every_write.record_write());
    }

    #[tokio::test]
    async fn test_invalidate_prefix_and_clear() {
        let store = MemoryStore::new();
        let value = OperationResult::success(json!(1));
        let ttl = Duration::from_secs(60);
        store.set("github:repo:o:a:get", &value, ttl).await.unwrap();
        store.set("github:repo:o:b:get", &value, ttl).await.unwrap();
        store.set("github:issue:o:a:1:get", &value, ttl).await.unwrap();

        assert_eq!(store.invalidate_prefix("github:repo:o:").await.unwrap(), 2);
        assert_eq!(store.len(), 1);

        store.delete("github:issue:o:a:1:get").await.unwrap();
        assert!(store.is_empty());

        store.set("x", &value, ttl).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty());
    }
}
