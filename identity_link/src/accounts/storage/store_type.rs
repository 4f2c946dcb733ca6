use async_trait::async_trait;

use crate::accounts::errors::{AccountStoreError, IDENTITIES_FIELD};
use crate::accounts::types::{Account, AccountRow, NewAccount};
use crate::identity::IdentityRef;
use crate::storage::SharedDataStore;

use super::AccountStore;
use super::postgres::*;
use super::sqlite::*;

/// Account storage over the generic sqlite / postgres data store.
pub struct SqlAccountStore {
    data_store: SharedDataStore,
}

fn unsupported() -> AccountStoreError {
    AccountStoreError::Storage("Unsupported database type".to_string())
}

impl SqlAccountStore {
    pub fn new(data_store: SharedDataStore) -> Self {
        Self { data_store }
    }

    async fn with_identities(
        &self,
        row: Option<AccountRow>,
    ) -> Result<Option<Account>, AccountStoreError> {
        let Some(row) = row else {
            return Ok(None);
        };

        let store = &self.data_store;
        let identities = if let Some(pool) = store.as_sqlite() {
            get_identities_sqlite(pool, &row.id).await?
        } else if let Some(pool) = store.as_postgres() {
            get_identities_postgres(pool, &row.id).await?
        } else {
            return Err(unsupported());
        };

        Ok(Some(row.into_account(identities)?))
    }
}

#[async_trait]
impl AccountStore for SqlAccountStore {
    async fn init(&self) -> Result<(), AccountStoreError> {
        let store = &self.data_store;

        match (store.as_sqlite(), store.as_postgres()) {
            (Some(pool), _) => {
                create_tables_sqlite(pool).await?;
                validate_account_tables_sqlite(pool).await
            }
            (_, Some(pool)) => {
                create_tables_postgres(pool).await?;
                validate_account_tables_postgres(pool).await
            }
            _ => Err(unsupported()),
        }
    }

    #[tracing::instrument(skip(self, account), fields(username = ?account.username))]
    async fn insert_account(&self, account: NewAccount) -> Result<Account, AccountStoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now();

        let store = &self.data_store;
        let result = if let Some(pool) = store.as_sqlite() {
            insert_account_sqlite(pool, &id, &account, now).await
        } else if let Some(pool) = store.as_postgres() {
            insert_account_postgres(pool, &id, &account, now).await
        } else {
            Err(unsupported())
        };

        match &result {
            Ok(()) => tracing::info!(account_id = %id, "Account inserted"),
            Err(AccountStoreError::DuplicateKey { field }) => {
                tracing::debug!(field = %field, "Account insert hit a unique index")
            }
            Err(e) => tracing::error!(error = %e, "Account insert failed"),
        }
        result?;

        self.get_account(&id)
            .await?
            .ok_or_else(|| AccountStoreError::Storage(format!("Inserted account {id} not found")))
    }

    #[tracing::instrument(skip(self), fields(account_id = %id))]
    async fn get_account(&self, id: &str) -> Result<Option<Account>, AccountStoreError> {
        let store = &self.data_store;
        let row = if let Some(pool) = store.as_sqlite() {
            get_account_row_sqlite(pool, id).await?
        } else if let Some(pool) = store.as_postgres() {
            get_account_row_postgres(pool, id).await?
        } else {
            return Err(unsupported());
        };
        self.with_identities(row).await
    }

    #[tracing::instrument(skip(self), fields(service_name = %identity.service_name))]
    async fn find_by_identity(
        &self,
        identity: &IdentityRef,
        signed_at: i64,
    ) -> Result<Option<Account>, AccountStoreError> {
        let store = &self.data_store;
        let row = if let Some(pool) = store.as_sqlite() {
            find_account_row_by_identity_sqlite(pool, identity, signed_at).await?
        } else if let Some(pool) = store.as_postgres() {
            find_account_row_by_identity_postgres(pool, identity, signed_at).await?
        } else {
            return Err(unsupported());
        };

        tracing::debug!(found = row.is_some(), "Account lookup by identity completed");
        self.with_identities(row).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AccountStoreError> {
        let store = &self.data_store;
        let row = if let Some(pool) = store.as_sqlite() {
            find_account_row_by_username_sqlite(pool, username).await?
        } else if let Some(pool) = store.as_postgres() {
            find_account_row_by_username_postgres(pool, username).await?
        } else {
            return Err(unsupported());
        };
        self.with_identities(row).await
    }

    #[tracing::instrument(skip(self, identity), fields(service_name = %identity.service_name))]
    async fn add_identity(
        &self,
        account_id: &str,
        identity: &IdentityRef,
        not_signed_before: i64,
    ) -> Result<(), AccountStoreError> {
        let store = &self.data_store;

        if let Some(pool) = store.as_sqlite() {
            match get_identity_owner_sqlite(pool, identity).await? {
                Some(owner) if owner == account_id => {}
                Some(_) => return Err(duplicate_identity()),
                None => insert_identity_sqlite(pool, account_id, identity).await?,
            }
            init_not_signed_before_sqlite(pool, account_id, not_signed_before).await
        } else if let Some(pool) = store.as_postgres() {
            match get_identity_owner_postgres(pool, identity).await? {
                Some(owner) if owner == account_id => {}
                Some(_) => return Err(duplicate_identity()),
                None => insert_identity_postgres(pool, account_id, identity).await?,
            }
            init_not_signed_before_postgres(pool, account_id, not_signed_before).await
        } else {
            Err(unsupported())
        }
    }

    #[tracing::instrument(skip(self, identity), fields(service_name = %identity.service_name))]
    async fn remove_identity(
        &self,
        account_id: &str,
        identity: &IdentityRef,
    ) -> Result<(), AccountStoreError> {
        let store = &self.data_store;
        if let Some(pool) = store.as_sqlite() {
            delete_identity_sqlite(pool, account_id, identity).await
        } else if let Some(pool) = store.as_postgres() {
            delete_identity_postgres(pool, account_id, identity).await
        } else {
            Err(unsupported())
        }
    }

    async fn set_not_signed_before(
        &self,
        account_id: &str,
        secs: i64,
    ) -> Result<(), AccountStoreError> {
        let store = &self.data_store;
        if let Some(pool) = store.as_sqlite() {
            set_not_signed_before_sqlite(pool, account_id, secs).await
        } else if let Some(pool) = store.as_postgres() {
            set_not_signed_before_postgres(pool, account_id, secs).await
        } else {
            Err(unsupported())
        }
    }
}

fn duplicate_identity() -> AccountStoreError {
    AccountStoreError::DuplicateKey {
        field: IDENTITIES_FIELD.to_string(),
    }
}
