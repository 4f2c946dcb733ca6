mod config;
mod postgres;
mod sqlite;
mod store_type;

use async_trait::async_trait;

use crate::accounts::errors::AccountStoreError;
use crate::accounts::types::{Account, NewAccount};
use crate::identity::IdentityRef;

pub use store_type::SqlAccountStore;

/// The account storage collaborator.
///
/// Linked identities are uniquely indexed: an `{serviceName, id}` pair belongs
/// to at most one account, and a violation is reported as
/// [`AccountStoreError::DuplicateKey`] naming the identities index.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn init(&self) -> Result<(), AccountStoreError>;

    async fn insert_account(&self, account: NewAccount) -> Result<Account, AccountStoreError>;

    async fn get_account(&self, id: &str) -> Result<Option<Account>, AccountStoreError>;

    /// The account linked to `identity` whose `not_signed_before` is set and
    /// no later than `signed_at`.
    async fn find_by_identity(
        &self,
        identity: &IdentityRef,
        signed_at: i64,
    ) -> Result<Option<Account>, AccountStoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AccountStoreError>;

    /// Link `identity` to the account if it is not linked yet, and set
    /// `not_signed_before` when the account has none.
    async fn add_identity(
        &self,
        account_id: &str,
        identity: &IdentityRef,
        not_signed_before: i64,
    ) -> Result<(), AccountStoreError>;

    async fn remove_identity(
        &self,
        account_id: &str,
        identity: &IdentityRef,
    ) -> Result<(), AccountStoreError>;

    async fn set_not_signed_before(
        &self,
        account_id: &str,
        secs: i64,
    ) -> Result<(), AccountStoreError>;
}
