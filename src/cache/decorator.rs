// Caching decorator for operation handlers.
// Serves read-only operations from the cache store and fills it on successful misses.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::operation::{OperationHandler, OperationResult, Params, is_read_only};

use super::keys::derive_key;
use super::store::CacheStore;
use super::ttl::{ResourceCategory, TtlPolicy};

/// Counters kept by a caching layer.
#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    writes: AtomicU64,
    bypassed: AtomicU64,
    store_errors: AtomicU64,
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses answered with a concurrent caller's result instead of the handler.
    pub coalesced: u64,
    pub writes: u64,
    pub bypassed: u64,
    pub store_errors: u64,
    pub enabled: bool,
}

/// Outcome of a store read.
enum Lookup {
    Hit(OperationResult),
    Miss,
    /// The store failed; the caller proceeds as if caching were off.
    Unavailable,
}

/// Result slot shared by the callers waiting on one in-flight key.
type Flight = watch::Sender<Option<OperationResult>>;

/// Shared caching state: the store, TTL policy, runtime switch, and counters.
///
/// One layer is typically shared by every `CachingHandler` of a registry.
pub struct CachingLayer {
    store: Arc<dyn CacheStore>,
    policy: RwLock<TtlPolicy>,
    enabled: AtomicBool,
    coalesce_misses: bool,
    counters: CacheCounters,
    in_flight: DashMap<String, Flight>,
}

impl CachingLayer {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            policy: RwLock::new(TtlPolicy::default()),
            enabled: AtomicBool::new(true),
            coalesce_misses: true,
            counters: CacheCounters::default(),
            in_flight: DashMap::new(),
        }
    }

    pub fn with_policy(self, policy: TtlPolicy) -> Self {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
        self
    }

    /// Whether concurrent misses on one key wait for a single handler call.
    pub fn with_coalescing(mut self, coalesce: bool) -> Self {
        self.coalesce_misses = coalesce;
        self
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        self.enabled.store(enabled, Ordering::Relaxed);
        self
    }

    /// Snapshot of the current TTL policy.
    pub fn policy(&self) -> TtlPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the lifetime of uncategorized results written from now on.
    pub fn set_default_ttl(&self, ttl: Duration) {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        *policy = policy.clone().with_default(ttl);
        debug!(ttl_secs = ttl.as_secs(), "default cache TTL changed");
    }

    /// Change the lifetime of one category's results written from now on.
    pub fn set_ttl(&self, category: ResourceCategory, ttl: Duration) {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        *policy = policy.clone().with_override(category, ttl);
        debug!(category = category.as_str(), ttl_secs = ttl.as_secs(), "cache TTL changed");
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
        debug!("operation cache enabled");
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        debug!("operation cache disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            bypassed: c.bypassed.load(Ordering::Relaxed),
            store_errors: c.store_errors.load(Ordering::Relaxed),
            enabled: self.is_enabled(),
        }
    }

    /// Remove every cached result.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Remove cached results whose key starts with `prefix`.
    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<usize> {
        let removed = self.store.invalidate_prefix(prefix).await?;
        debug!(prefix, removed, "invalidated cache entries");
        Ok(removed)
    }

    /// Wrap a handler so its read-only operations go through this layer.
    pub fn wrap(self: &Arc<Self>, inner: Arc<dyn OperationHandler>) -> CachingHandler {
        CachingHandler {
            inner,
            layer: Arc::clone(self),
        }
    }

    async fn read(&self, key: &str) -> Lookup {
        match self.store.get(key).await {
            Ok(Some(found)) => Lookup::Hit(found),
            Ok(None) => Lookup::Miss,
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "cache read failed, treating as miss");
                Lookup::Unavailable
            }
        }
    }

    /// Store write where any failure is logged and dropped.
    async fn write(&self, operation: &str, key: &str, result: &OperationResult) {
        let ttl = self
            .policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ttl_for_operation(operation);
        match self.store.set(key, result, ttl).await {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                debug!(operation, key, ttl_secs = ttl.as_secs(), "cached result");
            }
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(operation, key, error = %e, "cache write failed");
            }
        }
    }
}

/// Removes a leader's in-flight slot however its call ends, including by
/// the future being dropped. Dropping the slot wakes any waiters.
struct FlightGuard<'a> {
    in_flight: &'a DashMap<String, Flight>,
    key: &'a str,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(self.key);
    }
}

/// Handler decorator adding read-through caching to an inner handler.
///
/// Mutating operations, and every operation while the layer is disabled, go
/// straight to the inner handler without touching the store.
pub struct CachingHandler {
    inner: Arc<dyn OperationHandler>,
    layer: Arc<CachingLayer>,
}

impl CachingHandler {
    pub fn layer(&self) -> &Arc<CachingLayer> {
        &self.layer
    }

    /// Run the inner handler and cache a successful result.
    async fn fill(&self, operation: &str, params: &Params, key: &str) -> Result<OperationResult> {
        let result = self.inner.execute(operation, params).await?;
        if result.is_error() {
            debug!(operation, key, "not caching error result");
        } else {
            self.layer.write(operation, key, &result).await;
        }
        Ok(result)
    }

    /// Miss path when coalescing. The first caller for a key runs the handler
    /// and publishes its result; later callers wait for it. If the leader
    /// fails or is cancelled, each waiter falls back to its own call.
    async fn fill_coalesced(
        &self,
        operation: &str,
        params: &Params,
        key: &str,
    ) -> Result<OperationResult> {
        let waiting = match self.layer.in_flight.entry(key.to_string()) {
            Entry::Occupied(flight) => Some(flight.get().subscribe()),
            Entry::Vacant(slot) => {
                slot.insert(watch::channel(None).0);
                None
            }
        };

        if let Some(mut rx) = waiting {
            let shared = rx.wait_for(Option::is_some).await.ok().and_then(|r| r.clone());
            return match shared {
                Some(result) => {
                    self.layer.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(operation, key, "served by concurrent call");
                    Ok(result)
                }
                None => self.fill(operation, params, key).await,
            };
        }

        let _guard = FlightGuard {
            in_flight: &self.layer.in_flight,
            key,
        };
        let result = self.fill(operation, params, key).await;
        if let Ok(shared) = &result {
            if let Some(flight) = self.layer.in_flight.get(key) {
                flight.send_replace(Some(shared.clone()));
            }
        }
        result
    }
}

#[async_trait]
impl OperationHandler for CachingHandler {
    async fn execute(&self, operation: &str, params: &Params) -> Result<OperationResult> {
        if !is_read_only(operation) || !self.layer.is_enabled() {
            self.layer.counters.bypassed.fetch_add(1, Ordering::Relaxed);
            return self.inner.execute(operation, params).await;
        }

        let key = derive_key(operation, params);

        match self.layer.read(&key).await {
            Lookup::Hit(cached) => {
                self.layer.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(operation, key = %key, "cache hit");
                return Ok(cached);
            }
            Lookup::Unavailable => {
                self.layer.counters.misses.fetch_add(1, Ordering::Relaxed);
                return self.fill(operation, params, &key).await;
            }
            Lookup::Miss => {}
        }

        self.layer.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(operation, key = %key, "cache miss");

        if self.layer.coalesce_misses {
            self.fill_coalesced(operation, params, &key).await
        } else {
            self.fill(operation, params, &key).await
        }
    }
}
