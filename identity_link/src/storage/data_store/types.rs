use sqlx::{Pool, Postgres, Sqlite};
use std::str::FromStr;
use std::sync::Arc;

use crate::storage::errors::StorageError;

/// A data store shared by every durable store built on top of it.
pub type SharedDataStore = Arc<dyn DataStore>;

// Types
#[derive(Clone, Debug)]
pub struct SqliteDataStore {
    pub(super) pool: sqlx::SqlitePool,
}

#[derive(Clone, Debug)]
pub struct PostgresDataStore {
    pub(super) pool: sqlx::PgPool,
}

// Trait
pub trait DataStore: Send + Sync {
    fn as_sqlite(&self) -> Option<&Pool<Sqlite>>;
    fn as_postgres(&self) -> Option<&Pool<Postgres>>;
}

impl SqliteDataStore {
    pub fn connect_lazy(url: &str) -> Result<Self, StorageError> {
        let opts = sqlx::sqlite::SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        Ok(Self {
            pool: sqlx::sqlite::SqlitePool::connect_lazy_with(opts),
        })
    }

    /// A private in-memory database.
    ///
    /// Every sqlite `:memory:` connection is a separate database, so the pool is
    /// pinned to a single connection that is never recycled.
    pub fn in_memory() -> Result<Self, StorageError> {
        let opts = sqlx::sqlite::SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(opts);
        Ok(Self { pool })
    }

    pub fn shared(self) -> SharedDataStore {
        Arc::new(self)
    }
}

impl PostgresDataStore {
    pub fn connect_lazy(url: &str) -> Result<Self, StorageError> {
        Ok(Self {
            pool: sqlx::PgPool::connect_lazy(url)?,
        })
    }

    pub fn shared(self) -> SharedDataStore {
        Arc::new(self)
    }
}

// Store implementations
impl DataStore for SqliteDataStore {
    fn as_sqlite(&self) -> Option<&Pool<Sqlite>> {
        Some(&self.pool)
    }

    fn as_postgres(&self) -> Option<&Pool<Postgres>> {
        None
    }
}

impl DataStore for PostgresDataStore {
    fn as_sqlite(&self) -> Option<&Pool<Sqlite>> {
        None
    }

    fn as_postgres(&self) -> Option<&Pool<Postgres>> {
        Some(&self.pool)
    }
}
