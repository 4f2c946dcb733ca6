use thiserror::Error;

use crate::identity::IdentityError;
use crate::rpc::{ACCOUNT_NOT_FOUND, DUPLICATE_ACCOUNT, NOT_LOGGED_IN, RpcError};
use crate::storage::StorageError;

/// Name of the uniquely indexed identity list, as reported in duplicate-key
/// errors.
pub const IDENTITIES_FIELD: &str = "identities";

/// Errors from the account storage collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccountStoreError {
    /// A unique index rejected the write. `field` names the index.
    #[error("Duplicate key on {field}")]
    DuplicateKey { field: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for AccountStoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let detail = format!("{} {}", db.message(), db.constraint().unwrap_or_default());
                let field = [IDENTITIES_FIELD, "username", "email"]
                    .into_iter()
                    .find(|field| detail.contains(field))
                    .unwrap_or("id");
                return Self::DuplicateKey {
                    field: field.to_string(),
                };
            }
        }
        Self::Storage(err.to_string())
    }
}

impl From<StorageError> for AccountStoreError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AccountStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("Invalid account document: {err}"))
    }
}

/// Errors from the accounts-identity operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccountsError {
    #[error("User not found")]
    AccountNotFound,

    #[error("Duplicate account")]
    DuplicateAccount,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<AccountStoreError> for AccountsError {
    fn from(err: AccountStoreError) -> Self {
        match err {
            AccountStoreError::DuplicateKey { field } if field == IDENTITIES_FIELD => {
                Self::DuplicateAccount
            }
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<AccountsError> for RpcError {
    fn from(err: AccountsError) -> Self {
        match err {
            AccountsError::AccountNotFound => RpcError::named(ACCOUNT_NOT_FOUND, "User not found"),
            AccountsError::DuplicateAccount => {
                RpcError::named(DUPLICATE_ACCOUNT, "Duplicate account")
            }
            AccountsError::NotLoggedIn => RpcError::named(NOT_LOGGED_IN, "Not logged in"),
            AccountsError::Forbidden(reason) => RpcError::forbidden(reason),
            AccountsError::InvalidRequest(reason) => RpcError::bad_request(reason),
            AccountsError::Identity(e) => RpcError::from(e),
            AccountsError::Storage(msg) => {
                tracing::error!("Accounts storage error: {}", msg);
                RpcError::internal()
            }
        }
    }
}
