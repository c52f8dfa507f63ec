//! Content-addressed model cache with single-flight computation.

#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CacheBackend, CacheConfig};
use crate::domain::{Fingerprint, PricingModel};
use crate::errors::TransformError;

#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use store::{CacheStore, MemoryStore};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CacheStoreError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cached model could not be encoded or decoded: {0}")]
    Codec(String),
}

type SharedComputation = Shared<BoxFuture<'static, Result<Arc<PricingModel>, TransformError>>>;

/// Cache in front of the transformation upstream. Concurrent misses for one
/// fingerprint share a single computation, and only successful results are
/// stored. Computations run as spawned tasks so a caller going away neither
/// cancels the work other callers are waiting on nor leaves a stale marker.
#[derive(Clone)]
pub struct SingleFlightCache {
    store: Arc<dyn CacheStore>,
    inflight: Arc<DashMap<Fingerprint, SharedComputation>>,
    ttl: Duration,
}

impl SingleFlightCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, inflight: Arc::new(DashMap::new()), ttl }
    }

    pub fn in_memory(capacity: usize, ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new(capacity)), ttl)
    }

    /// Builds the configured backend. Redis needs the `redis` cargo feature.
    pub async fn from_config(config: &CacheConfig) -> Result<Self, CacheStoreError> {
        match config.backend {
            CacheBackend::Memory => Ok(Self::in_memory(config.capacity, config.ttl())),
            CacheBackend::Redis => connect_redis(config).await,
        }
    }

    pub fn backend(&self) -> CacheBackend {
        self.store.backend()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    pub async fn get(&self, key: &Fingerprint) -> Option<Arc<PricingModel>> {
        lookup(self.store.as_ref(), key).await
    }

    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &Fingerprint,
        compute: F,
    ) -> Result<Arc<PricingModel>, TransformError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<PricingModel, TransformError>> + Send + 'static,
    {
        if let Some(hit) = lookup(self.store.as_ref(), key).await {
            debug!(event_name = "system.cache.hit", fingerprint = %key.short(), "cache hit");
            return Ok(hit);
        }

        let computation = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(
                    event_name = "system.cache.joined",
                    fingerprint = %key.short(),
                    "joining in-flight transformation"
                );
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let task = tokio::spawn(fill(
                    Arc::clone(&self.store),
                    Arc::clone(&self.inflight),
                    key.clone(),
                    self.ttl,
                    compute,
                ));
                let fingerprint = key.clone();
                let computation = async move {
                    task.await.unwrap_or_else(|_| Err(TransformError::Interrupted { fingerprint }))
                }
                .boxed()
                .shared();
                entry.insert(computation.clone());
                computation
            }
        };

        computation.await
    }

    pub async fn invalidate(&self, key: &Fingerprint) {
        if let Err(error) = self.store.invalidate(key).await {
            warn!(
                event_name = "system.cache.invalidate_failed",
                fingerprint = %key.short(),
                error = %error,
                "cache invalidation failed"
            );
        }
    }

    /// Waits for in-flight computations to settle. Returns `false` if some were
    /// still running when `timeout` elapsed.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let pending: Vec<_> = self.inflight.iter().map(|entry| entry.value().clone()).collect();
        if pending.is_empty() {
            return true;
        }
        tokio::time::timeout(timeout, join_all(pending)).await.is_ok()
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &CacheConfig) -> Result<SingleFlightCache, CacheStoreError> {
    let url = config.redis_url.as_deref().unwrap_or_default();
    let store = RedisStore::connect(url).await?;
    Ok(SingleFlightCache::new(Arc::new(store), config.ttl()))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &CacheConfig) -> Result<SingleFlightCache, CacheStoreError> {
    Err(CacheStoreError::Backend(
        "cache.backend = \"redis\" requires a build with the `redis` feature".to_string(),
    ))
}

async fn lookup(store: &dyn CacheStore, key: &Fingerprint) -> Option<Arc<PricingModel>> {
    match store.get(key).await {
        Ok(hit) => hit,
        Err(error) => {
            warn!(
                event_name = "system.cache.lookup_failed",
                fingerprint = %key.short(),
                error = %error,
                "cache lookup failed; treating as miss"
            );
            None
        }
    }
}

async fn fill<F, Fut>(
    store: Arc<dyn CacheStore>,
    inflight: Arc<DashMap<Fingerprint, SharedComputation>>,
    key: Fingerprint,
    ttl: Duration,
    compute: F,
) -> Result<Arc<PricingModel>, TransformError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<PricingModel, TransformError>>,
{
    // Dropped on every exit, including a panicking compute or an aborted task,
    // so the next caller for this key starts a fresh computation.
    let _marker = InflightMarker { inflight, key: key.clone() };

    // Another computation may have stored this key between our caller's lookup
    // and registering the in-flight marker.
    match lookup(store.as_ref(), &key).await {
        Some(hit) => Ok(hit),
        None => match compute().await {
            Ok(model) => {
                let model = Arc::new(model);
                if let Err(error) = store.put(&key, Arc::clone(&model), ttl).await {
                    warn!(
                        event_name = "system.cache.store_failed",
                        fingerprint = %key.short(),
                        error = %error,
                        "transformed model could not be cached"
                    );
                }
                Ok(model)
            }
            Err(error) => Err(error),
        },
    }
}

struct InflightMarker {
    inflight: Arc<DashMap<Fingerprint, SharedComputation>>,
    key: Fingerprint,
}

impl Drop for InflightMarker {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}
