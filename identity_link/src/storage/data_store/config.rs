//! Database table configuration

use std::{env, sync::LazyLock};

use crate::storage::errors::StorageError;

use super::types::{PostgresDataStore, SharedDataStore, SqliteDataStore};

/// Table prefix from environment variable
pub static DB_TABLE_PREFIX: LazyLock<String> =
    LazyLock::new(|| env::var("DB_TABLE_PREFIX").unwrap_or_else(|_| "idl_".to_string()));

/// Build the data store selected by `GENERIC_DATA_STORE_TYPE` / `GENERIC_DATA_STORE_URL`.
pub fn data_store_from_env() -> Result<SharedDataStore, StorageError> {
    let store_type = env::var("GENERIC_DATA_STORE_TYPE")
        .map_err(|_| StorageError::Storage("GENERIC_DATA_STORE_TYPE must be set".to_string()))?;
    let store_url = env::var("GENERIC_DATA_STORE_URL")
        .map_err(|_| StorageError::Storage("GENERIC_DATA_STORE_URL must be set".to_string()))?;

    tracing::info!(
        "Initializing data store with type: {}, url: {}",
        store_type,
        store_url
    );

    let store = match store_type.as_str() {
        "sqlite" if store_url == "sqlite::memory:" => SqliteDataStore::in_memory()?.shared(),
        "sqlite" => SqliteDataStore::connect_lazy(&store_url)?.shared(),
        "postgres" => PostgresDataStore::connect_lazy(&store_url)?.shared(),
        t => {
            return Err(StorageError::Storage(format!(
                "Unsupported store type: {t}. Supported types are 'sqlite' and 'postgres'"
            )));
        }
    };

    tracing::info!(
        "Connected to database: type={}, url={}",
        store_type,
        store_url
    );

    Ok(store)
}
