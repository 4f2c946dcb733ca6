use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::identity::{Identity, IdentityRef, IdentitySigner};
use crate::rpc::{LoginHandler, RpcError};
use crate::utils::now_secs;

use super::errors::AccountsError;
use super::storage::AccountStore;
use super::types::NewAccount;

/// Server half of accounts-identity: creating accounts from verified
/// identities, logging in with them, and linking or unlinking identities.
pub struct AccountsIdentityServer {
    signer: Arc<IdentitySigner>,
    store: Arc<dyn AccountStore>,
    forbid_client_account_creation: bool,
}

impl AccountsIdentityServer {
    pub fn new(
        signer: Arc<IdentitySigner>,
        store: Arc<dyn AccountStore>,
        forbid_client_account_creation: bool,
    ) -> Self {
        Self {
            signer,
            store,
            forbid_client_account_creation,
        }
    }

    /// Create an account linked to `identity`. Returns the new account id.
    #[tracing::instrument(skip_all, fields(service_name = %identity.service_name))]
    pub async fn create(
        &self,
        identity: &Identity,
        account_doc: Value,
    ) -> Result<String, AccountsError> {
        let account = self.prepare_account(identity, account_doc).await?;
        let account = self.store.insert_account(account).await?;
        tracing::info!(account_id = %account.id, "Created account for identity");
        Ok(account.id)
    }

    /// Check a create request and build the account it would insert, without
    /// inserting it. New-user validation hooks run between the two steps.
    pub async fn prepare_account(
        &self,
        identity: &Identity,
        account_doc: Value,
    ) -> Result<NewAccount, AccountsError> {
        if self.forbid_client_account_creation {
            return Err(AccountsError::Forbidden("Signups forbidden".to_string()));
        }
        if !account_doc.is_object() {
            return Err(AccountsError::InvalidRequest(
                "account document must be an object".to_string(),
            ));
        }
        self.signer.verify(identity).await?;

        let mut account = NewAccount::from_document(account_doc).with_identity(identity.to_ref());
        account.not_signed_before = Some(now_secs());
        Ok(account)
    }

    /// Find the account for a verified identity. Identities signed before the
    /// account's last logout are rejected.
    #[tracing::instrument(skip_all, fields(service_name = %identity.service_name))]
    pub async fn login(&self, identity: &Identity) -> Result<String, AccountsError> {
        self.signer.verify(identity).await?;
        let signed_at = identity.when.ok_or(AccountsError::AccountNotFound)?;

        match self
            .store
            .find_by_identity(&identity.to_ref(), signed_at)
            .await?
        {
            Some(account) => Ok(account.id),
            None => Err(AccountsError::AccountNotFound),
        }
    }

    #[tracing::instrument(skip_all, fields(service_name = %identity.service_name))]
    pub async fn add_identity(
        &self,
        current_user: Option<&str>,
        identity: &Identity,
    ) -> Result<(), AccountsError> {
        let user_id = current_user.ok_or(AccountsError::NotLoggedIn)?;
        if identity.when.is_none() {
            return Err(AccountsError::InvalidRequest("when is required".to_string()));
        }
        self.signer.verify(identity).await?;

        self.store
            .add_identity(user_id, &identity.to_ref(), now_secs())
            .await?;
        Ok(())
    }

    /// Unlink an identity. Only the `{serviceName, id}` reference is needed.
    pub async fn remove_identity(
        &self,
        current_user: Option<&str>,
        identity: &IdentityRef,
    ) -> Result<(), AccountsError> {
        let user_id = current_user.ok_or(AccountsError::NotLoggedIn)?;
        self.store.remove_identity(user_id, identity).await?;
        Ok(())
    }

    pub async fn get_identities(&self, user_id: &str) -> Result<Vec<IdentityRef>, AccountsError> {
        Ok(self
            .store
            .get_account(user_id)
            .await?
            .map(|account| account.identities)
            .unwrap_or_default())
    }

    /// Called when an account's number of login tokens changes. A decrease is
    /// a logout: identities signed before now must be re-signed to log in.
    pub async fn login_tokens_changed(
        &self,
        user_id: &str,
        old_count: usize,
        new_count: usize,
    ) -> Result<(), AccountsError> {
        if new_count >= old_count {
            return Ok(());
        }
        let Some(account) = self.store.get_account(user_id).await? else {
            return Ok(());
        };
        let now = now_secs();
        if let Some(not_signed_before) = account.not_signed_before {
            if not_signed_before < now {
                tracing::debug!(account_id = %user_id, "Logout invalidates earlier identities");
                self.store.set_not_signed_before(user_id, now).await?;
            }
        }
        Ok(())
    }

    pub async fn record_logout(&self, user_id: &str) -> Result<(), AccountsError> {
        self.login_tokens_changed(user_id, 1, 0).await
    }
}

/// Login handler for `{identity: ...}` login requests.
pub struct IdentityLoginHandler {
    accounts: Arc<AccountsIdentityServer>,
}

impl IdentityLoginHandler {
    pub fn new(accounts: Arc<AccountsIdentityServer>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl LoginHandler for IdentityLoginHandler {
    async fn login(&self, request: &Value) -> Option<Result<String, RpcError>> {
        let identity = request.get("identity")?;
        let identity: Identity = match serde_json::from_value(identity.clone()) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed identity login request");
                return Some(Err(RpcError::bad_request("Match failed")));
            }
        };
        Some(self.accounts.login(&identity).await.map_err(RpcError::from))
    }
}
