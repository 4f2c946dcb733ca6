use std::{env, sync::LazyLock};

use crate::storage::DB_TABLE_PREFIX;

/// Accounts table name
pub(super) static DB_TABLE_ACCOUNTS: LazyLock<String> = LazyLock::new(|| {
    env::var("DB_TABLE_ACCOUNTS").unwrap_or_else(|_| format!("{}{}", *DB_TABLE_PREFIX, "accounts"))
});

/// Linked identities table name
pub(super) static DB_TABLE_ACCOUNT_IDENTITIES: LazyLock<String> = LazyLock::new(|| {
    env::var("DB_TABLE_ACCOUNT_IDENTITIES")
        .unwrap_or_else(|_| format!("{}{}", *DB_TABLE_PREFIX, "account_identities"))
});
