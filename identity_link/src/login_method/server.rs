use std::sync::Arc;

use crate::accounts::{AccountStore, AccountStoreError, AccountsError, NewAccount};
use crate::identity::{Identity, IdentitySigner};
use crate::rpc::RpcError;
use crate::storage::{CacheData, SharedCacheStore, StorageError};

use super::types::{
    CONNECTION_STATE_PREFIX, ConnectionState, LOGIN_METHOD_SERVICE_NAME, LoginAttempt,
    ValidationOutcome,
};

/// Server half of the login-method bridge.
///
/// Keeps a per-connection establishing flag and established identity, and
/// provides the account validation hooks that hijack a login while the flag
/// is set.
pub struct LoginMethodServer {
    signer: Arc<IdentitySigner>,
    store: Arc<dyn AccountStore>,
    cache: SharedCacheStore,
    connection_state_ttl: usize,
}

fn storage_failure(err: StorageError) -> RpcError {
    tracing::error!(error = %err, "Connection state storage failed");
    RpcError::internal()
}

impl LoginMethodServer {
    pub fn new(
        signer: Arc<IdentitySigner>,
        store: Arc<dyn AccountStore>,
        cache: SharedCacheStore,
        connection_state_ttl: u64,
    ) -> Self {
        Self {
            signer,
            store,
            cache,
            connection_state_ttl: usize::try_from(connection_state_ttl).unwrap_or(usize::MAX),
        }
    }

    async fn load(&self, connection_id: &str) -> Result<ConnectionState, RpcError> {
        let data = self
            .cache
            .lock()
            .await
            .get(CONNECTION_STATE_PREFIX, connection_id)
            .await
            .map_err(storage_failure)?;
        match data {
            Some(data) => data
                .to_json()
                .map_err(|e| storage_failure(StorageError::from(e))),
            None => Ok(ConnectionState::default()),
        }
    }

    async fn save(&self, connection_id: &str, state: &ConnectionState) -> Result<(), RpcError> {
        let data = CacheData::from_json(state).map_err(|e| storage_failure(e.into()))?;
        self.cache
            .lock()
            .await
            .put_with_ttl(
                CONNECTION_STATE_PREFIX,
                connection_id,
                data,
                self.connection_state_ttl,
            )
            .await
            .map_err(storage_failure)
    }

    /// `Identity.loginMethod._setEstablishing`
    pub async fn set_establishing(&self, connection_id: &str, flag: bool) -> Result<(), RpcError> {
        let mut state = self.load(connection_id).await?;
        state.establishing = flag;
        tracing::debug!(connection_id, establishing = flag, "Establishing flag changed");
        self.save(connection_id, &state).await
    }

    pub async fn is_establishing(&self, connection_id: &str) -> Result<bool, RpcError> {
        Ok(self.load(connection_id).await?.establishing)
    }

    /// `Identity.loginMethod._getIdentity`
    pub async fn get_identity(&self, connection_id: &str) -> Result<Option<Identity>, RpcError> {
        Ok(self.load(connection_id).await?.identity)
    }

    /// Forget everything stored for a closed connection.
    pub async fn remove_connection(&self, connection_id: &str) -> Result<(), RpcError> {
        self.cache
            .lock()
            .await
            .remove(CONNECTION_STATE_PREFIX, connection_id)
            .await
            .map_err(storage_failure)
    }

    /// New-user hook. While establishing, inserts the account as identity-only
    /// and establishes its identity; otherwise the caller inserts it normally.
    #[tracing::instrument(skip(self, account))]
    pub async fn validate_new_user(
        &self,
        connection_id: &str,
        mut account: NewAccount,
    ) -> Result<ValidationOutcome, RpcError> {
        if !self.is_establishing(connection_id).await? {
            return Ok(ValidationOutcome::Continue);
        }

        account.identity_only = true;
        let account = match self.store.insert_account(account).await {
            Ok(account) => account,
            Err(AccountStoreError::DuplicateKey { field }) if field == "email" => {
                return Err(RpcError::forbidden("Email already exists."));
            }
            Err(AccountStoreError::DuplicateKey { field }) if field == "username" => {
                return Err(RpcError::forbidden("Username already exists."));
            }
            Err(e) => {
                tracing::error!(error = %e, "Identity-only account insert failed");
                return Err(RpcError::internal());
            }
        };

        let identity = self.establish(connection_id, &account.id).await?;
        Ok(ValidationOutcome::Establish(identity))
    }

    /// Login-attempt hook.
    ///
    /// Disallowed attempts are rejected with their own error. While
    /// establishing, a successful attempt establishes the user's identity
    /// instead of logging in. Identity-only accounts can never be logged in to
    /// directly and are reported as missing.
    #[tracing::instrument(skip(self, attempt), fields(allowed = attempt.allowed))]
    pub async fn validate_login_attempt(
        &self,
        connection_id: &str,
        attempt: &LoginAttempt,
    ) -> Result<ValidationOutcome, RpcError> {
        if !attempt.allowed {
            return Err(attempt
                .error
                .clone()
                .unwrap_or_else(|| RpcError::forbidden("Login forbidden")));
        }

        let Some(user) = &attempt.user else {
            return Ok(ValidationOutcome::Continue);
        };

        if self.is_establishing(connection_id).await? {
            let identity = self.establish(connection_id, &user.id).await?;
            return Ok(ValidationOutcome::Establish(identity));
        }

        if user.identity_only {
            return Err(RpcError::forbidden("User not found"));
        }

        Ok(ValidationOutcome::Continue)
    }

    async fn establish(&self, connection_id: &str, user_id: &str) -> Result<Identity, RpcError> {
        let identity = self
            .signer
            .sign(&Identity::new(LOGIN_METHOD_SERVICE_NAME, user_id))
            .await?;

        let mut state = self.load(connection_id).await?;
        state.identity = Some(identity.clone());
        self.save(connection_id, &state).await?;

        tracing::info!(connection_id, user_id, "Identity established");
        Ok(identity)
    }

    /// Verify an identity established through a login method and return the
    /// id of the account it names.
    pub async fn verify_identity_from_login_method(
        &self,
        identity: &Identity,
    ) -> Result<String, AccountsError> {
        self.signer.verify(identity).await?;
        if identity.service_name != LOGIN_METHOD_SERVICE_NAME {
            return Err(AccountsError::InvalidRequest(format!(
                "expected a {LOGIN_METHOD_SERVICE_NAME} identity"
            )));
        }
        self.store
            .get_account(&identity.id)
            .await?
            .map(|account| account.id)
            .ok_or(AccountsError::AccountNotFound)
    }
}
