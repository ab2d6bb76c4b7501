// Cache module for operation results.
// Key derivation, TTL policy, stores, and the caching decorator.

pub mod decorator;
pub mod file;
pub mod keys;
pub mod store;
pub mod ttl;

pub use decorator::{CacheStats, CachingHandler, CachingLayer};
pub use file::{FileStore, default_cache_dir};
pub use keys::{NAMESPACE, derive_key};
pub use store::{CacheEntry, CacheStore, DEFAULT_PURGE_INTERVAL, MemoryStore};
pub use ttl::{DEFAULT_TTL, ResourceCategory, TtlPolicy, recommended_ttl};
