use sqlx::{Pool, Sqlite};

use crate::accounts::errors::AccountStoreError;
use crate::accounts::types::{AccountRow, IdentityRow, NewAccount};
use crate::identity::IdentityRef;
use crate::storage::validate_sqlite_table_schema;

use super::config::{DB_TABLE_ACCOUNT_IDENTITIES, DB_TABLE_ACCOUNTS};

pub(super) async fn create_tables_sqlite(pool: &Pool<Sqlite>) -> Result<(), AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {accounts_table} (
            id TEXT PRIMARY KEY NOT NULL,
            username TEXT UNIQUE,
            email TEXT UNIQUE,
            doc TEXT NOT NULL,
            not_signed_before INTEGER,
            identity_only BOOLEAN NOT NULL DEFAULT false,
            created_at TIMESTAMP NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {identities_table} (
            sequence_number INTEGER PRIMARY KEY AUTOINCREMENT,
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

pub(super) async fn validate_account_tables_sqlite(
    pool: &Pool<Sqlite>,
) -> Result<(), AccountStoreError> {
    let accounts_columns = vec![
        ("id", "TEXT"),
        ("username", "TEXT"),
        ("email", "TEXT"),
        ("doc", "TEXT"),
        ("not_signed_before", "INTEGER"),
        ("identity_only", "BOOLEAN"),
        ("created_at", "TIMESTAMP"),
    ];
    validate_sqlite_table_schema(
        pool,
        DB_TABLE_ACCOUNTS.as_str(),
        &accounts_columns,
        AccountStoreError::Storage,
    )
    .await?;

    let identities_columns = vec![
        ("sequence_number", "INTEGER"),
        ("account_id", "TEXT"),
        ("service_name", "TEXT"),
        ("identity_id", "TEXT"),
    ];
    validate_sqlite_table_schema(
        pool,
        DB_TABLE_ACCOUNT_IDENTITIES.as_str(),
        &identities_columns,
        AccountStoreError::Storage,
    )
    .await
}

pub(super) async fn insert_account_sqlite(
    pool: &Pool<Sqlite>,
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
        VALUES (?, ?, ?, ?, ?, ?, ?)
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
            VALUES (?, ?, ?)
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

pub(super) async fn get_account_row_sqlite(
    pool: &Pool<Sqlite>,
    id: &str,
) -> Result<Option<AccountRow>, AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();

    Ok(sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        SELECT id, username, email, doc, not_signed_before, identity_only, created_at
        FROM {accounts_table} WHERE id = ?
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

pub(super) async fn find_account_row_by_username_sqlite(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<AccountRow>, AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();

    Ok(sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        SELECT id, username, email, doc, not_signed_before, identity_only, created_at
        FROM {accounts_table} WHERE username = ?
        "#
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?)
}

pub(super) async fn find_account_row_by_identity_sqlite(
    pool: &Pool<Sqlite>,
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
        WHERE i.service_name = ? AND i.identity_id = ?
          AND a.not_signed_before IS NOT NULL AND a.not_signed_before <= ?
        "#
    ))
    .bind(&identity.service_name)
    .bind(&identity.id)
    .bind(signed_at)
    .fetch_optional(pool)
    .await?)
}

pub(super) async fn get_identities_sqlite(
    pool: &Pool<Sqlite>,
    account_id: &str,
) -> Result<Vec<IdentityRow>, AccountStoreError> {
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    Ok(sqlx::query_as::<_, IdentityRow>(&format!(
        r#"
        SELECT service_name, identity_id FROM {identities_table}
        WHERE account_id = ? ORDER BY sequence_number ASC
        "#
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await?)
}

pub(super) async fn get_identity_owner_sqlite(
    pool: &Pool<Sqlite>,
    identity: &IdentityRef,
) -> Result<Option<String>, AccountStoreError> {
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    Ok(sqlx::query_scalar::<_, String>(&format!(
        r#"
        SELECT account_id FROM {identities_table} WHERE service_name = ? AND identity_id = ?
        "#
    ))
    .bind(&identity.service_name)
    .bind(&identity.id)
    .fetch_optional(pool)
    .await?)
}

pub(super) async fn insert_identity_sqlite(
    pool: &Pool<Sqlite>,
    account_id: &str,
    identity: &IdentityRef,
) -> Result<(), AccountStoreError> {
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    sqlx::query(&format!(
        r#"
        INSERT INTO {identities_table} (account_id, service_name, identity_id) VALUES (?, ?, ?)
        "#
    ))
    .bind(account_id)
    .bind(&identity.service_name)
    .bind(&identity.id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn delete_identity_sqlite(
    pool: &Pool<Sqlite>,
    account_id: &str,
    identity: &IdentityRef,
) -> Result<(), AccountStoreError> {
    let identities_table = DB_TABLE_ACCOUNT_IDENTITIES.as_str();

    sqlx::query(&format!(
        r#"
        DELETE FROM {identities_table}
        WHERE account_id = ? AND service_name = ? AND identity_id = ?
        "#
    ))
    .bind(account_id)
    .bind(&identity.service_name)
    .bind(&identity.id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn init_not_signed_before_sqlite(
    pool: &Pool<Sqlite>,
    account_id: &str,
    secs: i64,
) -> Result<(), AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();

    sqlx::query(&format!(
        r#"
        UPDATE {accounts_table} SET not_signed_before = ?
        WHERE id = ? AND not_signed_before IS NULL
        "#
    ))
    .bind(secs)
    .bind(account_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn set_not_signed_before_sqlite(
    pool: &Pool<Sqlite>,
    account_id: &str,
    secs: i64,
) -> Result<(), AccountStoreError> {
    let accounts_table = DB_TABLE_ACCOUNTS.as_str();

    sqlx::query(&format!(
        r#"
        UPDATE {accounts_table} SET not_signed_before = ? WHERE id = ?
        "#
    ))
    .bind(secs)
    .bind(account_id)
    .execute(pool)
    .await?;

    Ok(())
}
