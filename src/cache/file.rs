// Filesystem cache store.
// Persists each entry as a JSON file so cached results survive restarts.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use directories::ProjectDirs;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;
use crate::operation::OperationResult;

use super::keys::digest;
use super::store::{CacheEntry, CacheStore, PurgeSchedule};

/// Distinguishes temp files written concurrently by this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get the base cache directory (~/.cache/github-tool-cache on Linux).
pub fn default_cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "github-tool-cache")
        .map(|dirs| dirs.cache_dir().join("operations"))
}

/// Store keeping one JSON file per key under a directory.
///
/// Expired files are removed when read, and swept from the whole directory
/// on every `DEFAULT_PURGE_INTERVAL`-th write.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    purge: Arc<PurgeSchedule>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            purge: Arc::new(PurgeSchedule::default()),
        }
    }

    /// Sweep the directory every `interval` writes instead of the default.
    pub fn with_purge_interval(mut self, interval: u64) -> Self {
        self.purge = Arc::new(PurgeSchedule::new(interval));
        self
    }

    /// Store rooted at the platform cache directory.
    pub fn in_default_dir() -> Option<Self> {
        default_cache_dir().map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`. Keys are hashed so any key is a valid file name.
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", digest(key.as_bytes(), 64)))
    }

    async fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<CacheEntry>(&contents) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "removing unreadable cache file");
                Self::remove(path).await?;
                Ok(None)
            }
        }
    }

    async fn remove(path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Paths of every entry file in the store.
    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Remove every expired entry file, returning how many went.
    pub async fn purge_expired(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_paths().await? {
            let Some(entry) = Self::read_entry(&path).await? else {
                continue;
            };
            if entry.is_expired() && Self::remove(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<OperationResult>> {
        let path = self.entry_path(key);
        let Some(entry) = Self::read_entry(&path).await? else {
            return Ok(None);
        };

        if entry.key != key {
            return Ok(None);
        }
        if entry.is_expired() {
            debug!(key, "removing expired cache file");
            Self::remove(&path).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: &OperationResult, ttl: Duration) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let entry = CacheEntry::new(key, value.clone(), ttl);
        let json = serde_json::to_string_pretty(&entry)?;

        // Write atomically via temp file
        let path = self.entry_path(key);
        let temp_path = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp_path, json.as_bytes()).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if self.purge.record_write() {
            match self.purge_expired().await {
                Ok(removed) => debug!(removed, "purged expired cache files"),
                Err(e) => warn!(error = %e, "cache file purge failed"),
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Self::remove(&self.entry_path(key)).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        for path in self.entry_paths().await? {
            Self::remove(&path).await?;
        }
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_paths().await? {
            let Ok(Some(entry)) = Self::read_entry(&path).await else {
                continue;
            };
            if entry.key.starts_with(prefix) && Self::remove(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("cache"));
        let value = OperationResult::success(json!({"full_name": "octocat/Hello-World"}));

        store
            .set("github:repo:octocat:Hello-World:get", &value, Duration::from_secs(60))
            .await
            .unwrap();

        let cached = store.get("github:repo:octocat:Hello-World:get").await.unwrap();
        assert_eq!(cached, Some(value));
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());

        assert_eq!(store.get("github:missing").await.unwrap(), None);
        assert_eq!(store.invalidate_prefix("github:").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_file_removed() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        let value = OperationResult::success(json!(1));

        store.set("k", &value, Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.entry_paths().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        std::fs::write(store.entry_path("k"), "not json").unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.entry_path("k").exists());
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).with_purge_interval(10);
        let value = OperationResult::success(json!(1));

        store.set("kept", &value, Duration::from_secs(60)).await.unwrap();
        for n in 0..49 {
            store
                .set(&format!("github:search:q{}", n), &value, Duration::ZERO)
                .await
                .unwrap();
        }

        // the 50th write swept everything expired before it
        assert_eq!(store.entry_paths().await.unwrap().len(), 1);
        assert!(store.get("kept").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        let value = OperationResult::success(json!(1));

        store.set("old", &value, Duration::ZERO).await.unwrap();
        store.set("new", &value, Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.entry_paths().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_prefix_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        let value = OperationResult::success(json!(1));
        let ttl = Duration::from_secs(60);

        store.set("github:repo:o:a:get", &value, ttl).await.unwrap();
        store.set("github:repo:o:b:get", &value, ttl).await.unwrap();
        store.set("github:issue:o:a:1:get", &value, ttl).await.unwrap();

        assert_eq!(store.invalidate_prefix("github:repo:").await.unwrap(), 2);
        assert!(store.get("github:issue:o:a:1:get").await.unwrap().is_some());

        store.clear().await.unwrap();
        assert!(store.entry_paths().await.unwrap().is_empty());
    }

    #[test]
    fn test_entry_path_is_hashed() {
        let store = FileStore::new("/tmp/cache");
        let path = store.entry_path("github:repo:a/b:c");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), 64 + ".json".len());
        assert!(!name.contains(':'));
    }
}
