// Cache configuration.
// Loads settings from the environment or a JSON file and builds the caching layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{
    CacheStore, CachingLayer, DEFAULT_TTL, FileStore, MemoryStore, ResourceCategory, TtlPolicy,
    default_cache_dir,
};
use crate::error::{Result, ToolCacheError};

pub const ENV_ENABLED: &str = "GITHUB_TOOL_CACHE_ENABLED";
pub const ENV_BACKEND: &str = "GITHUB_TOOL_CACHE_BACKEND";
pub const ENV_DIR: &str = "GITHUB_TOOL_CACHE_DIR";
pub const ENV_TTL_SECS: &str = "GITHUB_TOOL_CACHE_TTL_SECS";
pub const ENV_COALESCE: &str = "GITHUB_TOOL_CACHE_COALESCE";

/// Where cached results are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

impl FromStr for StoreBackend {
    type Err = ToolCacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            other => Err(ToolCacheError::Config(format!(
                "unknown cache backend '{}' (expected memory or file)",
                other
            ))),
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: StoreBackend,
    /// Directory for the file backend; the platform cache dir when unset.
    pub cache_dir: Option<PathBuf>,
    /// Lifetime for resources with no known category.
    pub default_ttl_secs: u64,
    /// Per-category lifetimes replacing the recommended ones.
    pub ttl_overrides: HashMap<ResourceCategory, u64>,
    /// Let concurrent misses on one key share a single upstream call.
    pub coalesce_misses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: StoreBackend::Memory,
            cache_dir: None,
            default_ttl_secs: DEFAULT_TTL.as_secs(),
            ttl_overrides: HashMap::new(),
            coalesce_misses: true,
        }
    }
}

impl CacheConfig {
    /// Read settings from `GITHUB_TOOL_CACHE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Read settings through `lookup`; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::default().apply_lookup(lookup)
    }

    /// Override these settings with any `GITHUB_TOOL_CACHE_*` variables set.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_lookup(|name| std::env::var(name).ok())
    }

    /// Override these settings with the variables `lookup` finds.
    pub fn apply_lookup(self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = self;

        if let Some(value) = lookup(ENV_ENABLED) {
            config.enabled = parse_bool(ENV_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_BACKEND) {
            config.backend = value.parse()?;
        }
        if let Some(value) = lookup(ENV_DIR).filter(|v| !v.trim().is_empty()) {
            config.cache_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_TTL_SECS) {
            config.default_ttl_secs = value.trim().parse().map_err(|_| {
                ToolCacheError::Config(format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_TTL_SECS, value
                ))
            })?;
        }
        if let Some(value) = lookup(ENV_COALESCE) {
            config.coalesce_misses = parse_bool(ENV_COALESCE, &value)?;
        }

        Ok(config)
    }

    /// Read settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| ToolCacheError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl_overrides.iter().fold(
            TtlPolicy::default().with_default(Duration::from_secs(self.default_ttl_secs)),
            |policy, (category, secs)| policy.with_override(*category, Duration::from_secs(*secs)),
        )
    }

    pub fn build_store(&self) -> Result<Arc<dyn CacheStore>> {
        match self.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::File => {
                let dir = self
                    .cache_dir
                    .clone()
                    .or_else(default_cache_dir)
                    .ok_or_else(|| {
                        ToolCacheError::Config("no cache directory available".to_string())
                    })?;
                Ok(Arc::new(FileStore::new(dir)))
            }
        }
    }

    pub fn build_layer(&self) -> Result<Arc<CachingLayer>> {
        let layer = CachingLayer::new(self.build_store()?)
            .with_policy(self.ttl_policy())
            .with_coalescing(self.coalesce_misses)
            .with_enabled(self.enabled);
        Ok(Arc::new(layer))
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ToolCacheError::Config(format!(
            "{} must be a boolean, got '{}'",
            name, value
        ))),
    }
}
