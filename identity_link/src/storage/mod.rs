//! Storage backends shared by the identity, accounts and login-method layers.
//!
//! Two kinds of store are provided:
//! - a generic cache store (memory / redis) holding small JSON blobs such as
//!   persisted client state and connection-scoped slots;
//! - a generic data store (sqlite / postgres) holding durable records such as
//!   signing secrets and accounts.

mod cache_store;
mod client_state;
mod data_store;
mod errors;
mod schema_validation;
mod types;

pub use cache_store::{
    CacheStore, InMemoryCacheStore, RedisCacheStore, SharedCacheStore, cache_store_from_env,
};
pub use client_state::ClientState;
pub use data_store::{
    DB_TABLE_PREFIX, DataStore, PostgresDataStore, SharedDataStore, SqliteDataStore,
    data_store_from_env,
};
pub use errors::StorageError;
pub use types::CacheData;

pub(crate) use schema_validation::{validate_postgres_table_schema, validate_sqlite_table_schema};
