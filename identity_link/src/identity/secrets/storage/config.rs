use std::{env, sync::LazyLock};

use crate::storage::DB_TABLE_PREFIX;

/// Signing secrets table name
pub(super) static DB_TABLE_IDENTITY_SECRETS: LazyLock<String> = LazyLock::new(|| {
    env::var("DB_TABLE_IDENTITY_SECRETS")
        .unwrap_or_else(|_| format!("{}{}", *DB_TABLE_PREFIX, "identity_secrets"))
});
