use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::cache::store::CacheStore;
use crate::cache::CacheStoreError;
use crate::config::CacheBackend;
use crate::domain::{Fingerprint, PricingModel};

const KEY_PREFIX: &str = "pricelens:model:";

/// Shared store backed by Redis; models are stored as JSON with a server-side
/// expiry so every replica sees the same entries.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheStoreError> {
        let client = redis::Client::open(url).map_err(backend_error)?;
        let connection = ConnectionManager::new(client).await.map_err(backend_error)?;
        Ok(Self { connection })
    }

    fn key(fingerprint: &Fingerprint) -> String {
        format!("{KEY_PREFIX}{fingerprint}")
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend(&self) -> CacheBackend {
        CacheBackend::Redis
    }

    async fn get(&self, key: &Fingerprint) -> Result<Option<Arc<PricingModel>>, CacheStoreError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::key(key))
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;

        raw.map(|json| {
            serde_json::from_str::<PricingModel>(&json)
                .map(Arc::new)
                .map_err(|error| CacheStoreError::Codec(error.to_string()))
        })
        .transpose()
    }

    async fn put(
        &self,
        key: &Fingerprint,
        value: Arc<PricingModel>,
        ttl: Duration,
    ) -> Result<(), CacheStoreError> {
        let json = serde_json::to_string(value.as_ref())
            .map_err(|error| CacheStoreError::Codec(error.to_string()))?;
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(Self::key(key))
            .arg(json)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn invalidate(&self, key: &Fingerprint) -> Result<(), CacheStoreError> {
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("DEL")
            .arg(Self::key(key))
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}

fn backend_error(error: redis::RedisError) -> CacheStoreError {
    CacheStoreError::Backend(error.to_string())
}
