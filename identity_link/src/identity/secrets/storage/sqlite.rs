use sqlx::{Pool, Sqlite};

use crate::storage::{StorageError, validate_sqlite_table_schema};

use super::super::types::Secret;
use super::config::DB_TABLE_IDENTITY_SECRETS;

pub(super) async fn create_tables_sqlite(pool: &Pool<Sqlite>) -> Result<(), StorageError> {
    let table_name = DB_TABLE_IDENTITY_SECRETS.as_str();

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table_name} (
            id TEXT PRIMARY KEY NOT NULL,
            created_at_ms INTEGER NOT NULL,
            key TEXT NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE INDEX IF NOT EXISTS idx_{table_name}_created_at_ms ON {table_name}(created_at_ms)
        "#
    ))
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn validate_secret_tables_sqlite(pool: &Pool<Sqlite>) -> Result<(), StorageError> {
    let expected_columns = vec![
        ("id", "TEXT"),
        ("created_at_ms", "INTEGER"),
        ("key", "TEXT"),
    ];

    validate_sqlite_table_schema(
        pool,
        DB_TABLE_IDENTITY_SECRETS.as_str(),
        &expected_columns,
        StorageError::Storage,
    )
    .await
}

pub(super) async fn insert_secret_sqlite(
    pool: &Pool<Sqlite>,
    secret: &Secret,
) -> Result<(), StorageError> {
    let table_name = DB_TABLE_IDENTITY_SECRETS.as_str();

    sqlx::query(&format!(
        r#"
        INSERT INTO {table_name} (id, created_at_ms, key) VALUES (?, ?, ?)
        "#
    ))
    .bind(&secret.id)
    .bind(secret.created_at_ms)
    .bind(&secret.key)
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn get_secret_sqlite(
    pool: &Pool<Sqlite>,
    id: &str,
) -> Result<Option<Secret>, StorageError> {
    let table_name = DB_TABLE_IDENTITY_SECRETS.as_str();

    let secret = sqlx::query_as::<_, Secret>(&format!(
        r#"
        SELECT id, created_at_ms, key FROM {table_name} WHERE id = ?
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(secret)
}

pub(super) async fn list_secrets_since_sqlite(
    pool: &Pool<Sqlite>,
    cutoff_ms: i64,
) -> Result<Vec<Secret>, StorageError> {
    let table_name = DB_TABLE_IDENTITY_SECRETS.as_str();

    let secrets = sqlx::query_as::<_, Secret>(&format!(
        r#"
        SELECT id, created_at_ms, key FROM {table_name}
        WHERE created_at_ms > ? ORDER BY created_at_ms ASC
        "#
    ))
    .bind(cutoff_ms)
    .fetch_all(pool)
    .await?;

    Ok(secrets)
}
