use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::CacheStoreError;
use crate::config::CacheBackend;
use crate::domain::{Fingerprint, PricingModel};

/// Backing storage for transformed models, keyed by source fingerprint.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn backend(&self) -> CacheBackend;

    /// Expired entries are reported as absent.
    async fn get(&self, key: &Fingerprint) -> Result<Option<Arc<PricingModel>>, CacheStoreError>;

    async fn put(
        &self,
        key: &Fingerprint,
        value: Arc<PricingModel>,
        ttl: Duration,
    ) -> Result<(), CacheStoreError>;

    async fn invalidate(&self, key: &Fingerprint) -> Result<(), CacheStoreError>;
}

#[derive(Debug)]
struct CacheEntry {
    value: Arc<PricingModel>,
    created_at: Instant,
    last_accessed: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Arc<PricingModel>, ttl: Duration) -> Self {
        let now = Instant::now();
        Self { value, created_at: now, last_accessed: now, expires_at: now + ttl }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-local store with TTL expiry and least-recently-used eviction once
/// `capacity` entries are held.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<Fingerprint, CacheEntry>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self { entries: DashMap::new(), capacity: capacity.max(1) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Age of a live entry, mostly useful for diagnostics.
    pub fn age(&self, key: &Fingerprint) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| now.duration_since(entry.created_at))
    }

    fn evict_over_capacity(&self, keep: &Fingerprint) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));

        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().last_accessed)
                .map(|entry| entry.key().clone());
            match victim {
                Some(victim) => {
                    self.entries.remove(&victim);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(512)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> CacheBackend {
        CacheBackend::Memory
    }

    async fn get(&self, key: &Fingerprint) -> Result<Option<Arc<PricingModel>>, CacheStoreError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            None => return Ok(None),
            Some(mut entry) if !entry.is_expired(now) => {
                entry.last_accessed = now;
                return Ok(Some(Arc::clone(&entry.value)));
            }
            Some(_) => {}
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn put(
        &self,
        key: &Fingerprint,
        value: Arc<PricingModel>,
        ttl: Duration,
    ) -> Result<(), CacheStoreError> {
        self.entries.insert(key.clone(), CacheEntry::new(value, ttl));
        if self.entries.len() > self.capacity {
            self.evict_over_capacity(key);
        }
        Ok(())
    }

    async fn invalidate(&self, key: &Fingerprint) -> Result<(), CacheStoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
