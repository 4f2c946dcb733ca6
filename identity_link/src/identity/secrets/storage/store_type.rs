use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::storage::{SharedDataStore, StorageError};

use super::super::types::Secret;
use super::postgres::*;
use super::sqlite::*;
use super::{ADDED_FEED_CAPACITY, SecretStorage};

/// Secret storage backed by the generic sqlite / postgres data store.
///
/// The added feed only covers inserts made through this handle. Secrets minted
/// by other processes are picked up by the periodic refresh in `SecretStore`
/// and by the lookup fallback for unknown key ids.
pub struct DataStoreSecretStorage {
    data_store: SharedDataStore,
    added: broadcast::Sender<Secret>,
}

impl DataStoreSecretStorage {
    pub fn new(data_store: SharedDataStore) -> Self {
        let (added, _) = broadcast::channel(ADDED_FEED_CAPACITY);
        Self { data_store, added }
    }
}

#[async_trait]
impl SecretStorage for DataStoreSecretStorage {
    async fn init(&self) -> Result<(), StorageError> {
        let store = &self.data_store;

        match (store.as_sqlite(), store.as_postgres()) {
            (Some(pool), _) => {
                create_tables_sqlite(pool).await?;
                validate_secret_tables_sqlite(pool).await
            }
            (_, Some(pool)) => {
                create_tables_postgres(pool).await?;
                validate_secret_tables_postgres(pool).await
            }
            _ => Err(StorageError::Storage(
                "Unsupported database type".to_string(),
            )),
        }
    }

    #[tracing::instrument(skip(self, key))]
    async fn insert(&self, key: &str, created_at_ms: i64) -> Result<Secret, StorageError> {
        let secret = Secret {
            id: uuid::Uuid::new_v4().to_string(),
            created_at_ms,
            key: key.to_string(),
        };

        let store = &self.data_store;
        if let Some(pool) = store.as_sqlite() {
            insert_secret_sqlite(pool, &secret).await?;
        } else if let Some(pool) = store.as_postgres() {
            insert_secret_postgres(pool, &secret).await?;
        } else {
            return Err(StorageError::Storage(
                "Unsupported database type".to_string(),
            ));
        }

        tracing::debug!(key_id = %secret.id, "Stored new signing secret");
        let _ = self.added.send(secret.clone());
        Ok(secret)
    }

    #[tracing::instrument(skip(self), fields(key_id = %id))]
    async fn get(&self, id: &str) -> Result<Option<Secret>, StorageError> {
        let store = &self.data_store;
        if let Some(pool) = store.as_sqlite() {
            get_secret_sqlite(pool, id).await
        } else if let Some(pool) = store.as_postgres() {
            get_secret_postgres(pool, id).await
        } else {
            Err(StorageError::Storage(
                "Unsupported database type".to_string(),
            ))
        }
    }

    async fn list_since(&self, cutoff_ms: i64) -> Result<Vec<Secret>, StorageError> {
        let store = &self.data_store;
        if let Some(pool) = store.as_sqlite() {
            list_secrets_since_sqlite(pool, cutoff_ms).await
        } else if let Some(pool) = store.as_postgres() {
            list_secrets_since_postgres(pool, cutoff_ms).await
        } else {
            Err(StorageError::Storage(
                "Unsupported database type".to_string(),
            ))
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Secret> {
        self.added.subscribe()
    }
}
