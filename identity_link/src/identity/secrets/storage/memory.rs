use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::storage::StorageError;

use super::super::types::Secret;
use super::{ADDED_FEED_CAPACITY, SecretStorage};

/// Secret storage living in process memory. Sharing one instance between
/// several stores behaves like several processes sharing a database.
pub struct InMemorySecretStorage {
    secrets: Mutex<HashMap<String, Secret>>,
    added: broadcast::Sender<Secret>,
}

impl InMemorySecretStorage {
    pub fn new() -> Self {
        let (added, _) = broadcast::channel(ADDED_FEED_CAPACITY);
        Self {
            secrets: Mutex::new(HashMap::new()),
            added,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Secret>>, StorageError> {
        self.secrets
            .lock()
            .map_err(|e| StorageError::Storage(format!("Secret map poisoned: {e}")))
    }
}

impl Default for InMemorySecretStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStorage for InMemorySecretStorage {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert(&self, key: &str, created_at_ms: i64) -> Result<Secret, StorageError> {
        let secret = Secret {
            id: uuid::Uuid::new_v4().to_string(),
            created_at_ms,
            key: key.to_string(),
        };
        self.lock()?.insert(secret.id.clone(), secret.clone());
        // No subscriber is not an error
        let _ = self.added.send(secret.clone());
        Ok(secret)
    }

    async fn get(&self, id: &str) -> Result<Option<Secret>, StorageError> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn list_since(&self, cutoff_ms: i64) -> Result<Vec<Secret>, StorageError> {
        let mut secrets: Vec<Secret> = self
            .lock()?
            .values()
            .filter(|s| s.created_at_ms > cutoff_ms)
            .cloned()
            .collect();
        secrets.sort_by_key(|s| s.created_at_ms);
        Ok(secrets)
    }

    fn subscribe(&self) -> broadcast::Receiver<Secret> {
        self.added.subscribe()
    }
}
