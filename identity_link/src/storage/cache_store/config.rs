use std::env;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::storage::errors::StorageError;

use super::types::{CacheStore, InMemoryCacheStore, RedisCacheStore, SharedCacheStore};

/// Build the cache store selected by `GENERIC_CACHE_STORE_TYPE` / `GENERIC_CACHE_STORE_URL`.
pub async fn cache_store_from_env() -> Result<SharedCacheStore, StorageError> {
    let store_type = env::var("GENERIC_CACHE_STORE_TYPE")
        .map_err(|_| StorageError::Storage("GENERIC_CACHE_STORE_TYPE must be set".to_string()))?;
    let store_url = env::var("GENERIC_CACHE_STORE_URL").unwrap_or_default();

    tracing::info!(
        "Initializing cache store with type: {}, url: {}",
        store_type,
        store_url
    );

    let store: Box<dyn CacheStore> = match store_type.as_str() {
        "memory" => Box::new(InMemoryCacheStore::new()),
        "redis" => {
            let client = redis::Client::open(store_url.as_str()).map_err(|e| {
                tracing::error!("Failed to create Redis client: {}", e);
                StorageError::from(e)
            })?;
            let store = RedisCacheStore { client };
            store.init().await.map_err(|e| {
                tracing::error!("Failed to connect to Redis: {}", e);
                e
            })?;
            Box::new(store)
        }
        t => {
            return Err(StorageError::Storage(format!(
                "Unsupported cache store type: {t}. Supported types are 'memory' and 'redis'"
            )));
        }
    };

    tracing::info!(
        "Connected to cache store: type={}, url={}",
        store_type,
        store_url
    );

    Ok(Arc::new(Mutex::new(store)))
}
