use sqlx::{Pool, Postgres};

use crate::accounts::errors::AccountStoreError;
use crate::accounts::types::{AccountRow, IdentityRow, NewAccount};
use crate::identity::IdentityRef;
use crate::storage::validate_postgres_table_schema;

use super::config::{DB_TABLE_ACCOUNT_IDENTITIES, DB_TABLE_ACCOUNTS};

pub(super) async fn create_tables_postgres(pool: &Pool<Postgres>) -> Result<(), AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {accounts_table} (
            id TEXT PRIMARY KEY NOT NULL,
            username TEXT UNIQUE,
            email TEXT UNIQUE,
            doc TEXT NOT NULL,
            not_signed_before BIGINT,
            identity_only BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {identities_table} (
            sequence_number BIGSERIAL PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES {accounts_table}(id) ON DELETE CASCADE,
            service_name TEXT NOT NULL,
            identity_id TEXT NOT NULL,
            UNIQUE (service_name, identity_id)
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE INDEX IF NOT EXISTS idx_{identities_table}_account_id ON {identities_table}(account_id)
        "#
    ))
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn validate_account_tables_postgres(
    pool: &Pool<Postgres>,
) -> Result<(), AccountStoreError> {
    let accounts_columns = vec![
        ("id", "text"),
        ("username", "text"),
        ("email", "text"),
        ("doc", "text"),
        ("not_signed_before", "bigint"),
        ("identity_only", "boolean"),
        ("created_at", "timestamp with time zone"),
    ];
    validate_postgres_table_schema(
        pool,
        DB_TABLE_ACCOUNTS.as_str(),
        &accounts_columns,
        AccountStoreError::Storage,
    )
    .await?;

    let identities_columns = vec![
        ("sequence_number", "bigint"),
        ("account_id", "text"),
        ("service_name", "text"),
        ("identity_id", "text"),
    ];
    validate_postgres_table_schema(
        pool,
        DB_TABLE_ACCOUNT_IDENTITIES.as_str(),
        &identities_columns,
        AccountStoreError::Storage,
    )
    .await
}

pub(super) async fn insert_account_postgres(
    pool: &Pool<Postgres>,
    id: &str,
    account: &NewAccount,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();
    let doc = serde_json::to_string(&account.doc)?;

    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        r#"
        INSERT INTO {accounts_table}
            (id, username, email, doc, not_signed_before, identity_only, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#
    ))
    .bind(id)
    .bind(&account.username)
    .bind(&account.email)
    .bind(&doc)
    .bind(account.not_signed_before)
    .bind(account.identity_only)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for identity in &account.identities {
        sqlx::query(&format!(
            r#"
            INSERT INTO {identities_table} (account_id, service_name, identity_id)
            VALUES ($1, $2, $3)
            "#
        ))
        .bind(id)
        .bind(&identity.service_name)
        .bind(&identity.id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub(super) async fn get_account_row_postgres(
    pool: &Pool<Postgres>,
    id: &str,
) -> Result<Option<AccountRow>, AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();

    Ok(sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        SELECT id, username, email, doc, not_signed_before, identity_only, created_at
        FROM {accounts_table} WHERE id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

pub(super) async fn find_account_row_by_username_postgres(
    pool: &Pool<Postgres>,
    username: &str,
) -> Result<Option<AccountRow>, AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();

    Ok(sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        SELECT id, username, email, doc, not_signed_before, identity_only, created_at
        FROM {accounts_table} WHERE username = $1
        "#
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?)
}

pub(super) async fn find_account_row_by_identity_postgres(
    pool: &Pool<Postgres>,
    identity: &IdentityRef,
    signed_at: i64,
) -> Result<Option<AccountRow>, AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    Ok(sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        SELECT a.id, a.username, a.email, a.doc, a.not_signed_before, a.identity_only, a.created_at
        FROM {accounts_table} a
        JOIN {identities_table} i ON i.account_id = a.id
        WHERE i.service_name = $1 AND i.identity_id = $2
          AND a.not_signed_before IS NOT NULL AND a.not_signed_before <= $3
        "#
    ))
    .bind(&identity.service_name)
    .bind(&identity.id)
    .bind(signed_at)
    .fetch_optional(pool)
    .await?)
}

pub(super) async fn get_identities_postgres(
    pool: &Pool<Postgres>,
    account_id: &str,
) -> Result<Vec<IdentityRow>, AccountStoreError> {
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    Ok(sqlx::query_as::<_, IdentityRow>(&format!(
        r#"
        SELECT service_name, identity_id FROM {identities_table}
        WHERE account_id = $1 ORDER BY sequence_number ASC
        "#
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await?)
}

pub(super) async fn get_identity_owner_postgres(
    pool: &Pool<Postgres>,
    identity: &IdentityRef,
) -> Result<Option<String>, AccountStoreError> {
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    Ok(sqlx::query_scalar::<_, String>(&format!(
        r#"
        SELECT account_id FROM {identities_table} WHERE service_name = $1 AND identity_id = $2
        "#
    ))
    .bind(&identity.service_name)
    .bind(&identity.id)
    .fetch_optional(pool)
    .await?)
}

pub(super) async fn insert_identity_postgres(
    pool: &Pool<Postgres>,
    account_id: &str,
    identity: &IdentityRef,
) -> Result<(), AccountStoreError> {
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    sqlx::query(&format!(
        r#"
        INSERT INTO {identities_table} (account_id, service_name, identity_id) VALUES ($1, $2, $3)
        "#
    ))
    .bind(account_id)
    .bind(&identity.service_name)
    .bind(&identity.id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn delete_identity_postgres(
    pool: &Pool<Postgres>,
    account_id: &str,
    identity: &IdentityRef,
) -> Result<(), AccountStoreError> {
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    sqlx::query(&format!(
        r#"
        DELETE FROM {identities_table}
        WHERE account_id = $1 AND service_name = $2 AND identity_id = $3
        "#
    ))
    .bind(account_id)
    .bind(&identity.service_name)
    .bind(&identity.id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn init_not_signed_before_postgres(
    pool: &Pool<Postgres>,
    account_id: &str,
    secs: i64,
) -> Result<(), AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();

    sqlx::query(&format!(
        r#"
        UPDATE {accounts_table} SET not_signed_before = $1
        WHERE id = $2 AND not_signed_before IS NULL
        "#
    ))
    .bind(secs)
    .bind(account_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn set_not_signed_before_postgres(
    pool: &Pool<Postgres>,
    account_id: &str,
    secs: i64,
) -> Result<(), AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();

    sqlx::query(&format!(
        r#"
        UPDATE {accounts_table} SET not_signed_before = $1 WHERE id = $2
        "#
    ))
    .bind(secs)
    .bind(account_id)
    .execute(pool)
    .await?;

    Ok(())
}
