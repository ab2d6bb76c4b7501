// GitHub tool cache library.
// Caching and pagination-normalizing decorator for GitHub tool operations.

pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod operation;
pub mod pagination;

pub use cache::{CacheStats, CachingHandler, CachingLayer, CacheStore, FileStore, MemoryStore};
pub use config::{CacheConfig, StoreBackend};
pub use error::{Result, ToolCacheError};
pub use operation::{OperationHandler, OperationResult, Params, ToolRegistry};
