//! Durable storage of signing secrets, shared by every process trusting the
//! same signer domain.

mod config;
mod memory;
mod postgres;
mod sqlite;
mod store_type;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::storage::StorageError;

use super::types::Secret;

pub use memory::InMemorySecretStorage;
pub use store_type::DataStoreSecretStorage;

/// Capacity of the feed announcing newly inserted secrets.
pub(crate) const ADDED_FEED_CAPACITY: usize = 64;

#[async_trait]
pub trait SecretStorage: Send + Sync {
    /// Create the backing tables. Called once before the store is used.
    async fn init(&self) -> Result<(), StorageError>;

    /// Persist a new secret and announce it on the added feed.
    async fn insert(&self, key: &str, created_at_ms: i64) -> Result<Secret, StorageError>;

    async fn get(&self, id: &str) -> Result<Option<Secret>, StorageError>;

    /// All secrets created strictly after `cutoff_ms`.
    async fn list_since(&self, cutoff_ms: i64) -> Result<Vec<Secret>, StorageError>;

    /// Feed of secrets inserted through this storage handle.
    fn subscribe(&self) -> broadcast::Receiver<Secret>;
}
