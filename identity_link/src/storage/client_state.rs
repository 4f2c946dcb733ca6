use serde::{Serialize, de::DeserializeOwned};

use super::cache_store::SharedCacheStore;
use super::errors::StorageError;
use super::types::CacheData;

/// Small durable key-value slot for client-side state that must survive a
/// reconnect or a full page transition.
///
/// Every value lives under a fixed prefix; keys carry their own version suffix
/// (e.g. `invocation.v1`) so that a format change starts from a clean slot.
#[derive(Clone)]
pub struct ClientState {
    store: SharedCacheStore,
    prefix: &'static str,
}

impl ClientState {
    pub fn new(store: SharedCacheStore, prefix: &'static str) -> Self {
        Self { store, prefix }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let data = self.store.lock().await.get(self.prefix, key).await?;
        match data {
            Some(data) => Ok(Some(data.to_json()?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let data = CacheData::from_json(value)?;
        self.store.lock().await.put(self.prefix, key, data).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.store.lock().await.remove(self.prefix, key).await
    }
}
