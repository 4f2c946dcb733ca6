//! Wiring of the server-side and client-side halves.

use std::sync::Arc;

use crate::accounts::{AccountStore, AccountsIdentityClient, AccountsIdentityServer, SqlAccountStore};
use crate::config::IdentityConfig;
use crate::identity::{
    AttemptCoordinator, AttemptResult, DataStoreSecretStorage, IdentityError, IdentitySigner,
    SecretStorage, SecretStore,
};
use crate::login_method::{LoginMethodClient, LoginMethodServer};
use crate::rpc::{IdentityRpcHandlers, RpcError, RpcTransport};
use crate::storage::{SharedCacheStore, SharedDataStore, cache_store_from_env, data_store_from_env};

/// Everything the server needs: the secret store, the signer, the accounts
/// server, the login-method server and the RPC handlers built over them.
pub struct IdentityServer {
    signer: Arc<IdentitySigner>,
    accounts: Arc<AccountsIdentityServer>,
    login_method: Arc<LoginMethodServer>,
    handlers: Arc<IdentityRpcHandlers>,
}

impl IdentityServer {
    /// Build the server over a durable data store (secrets and accounts) and
    /// a cache store (connection state).
    pub async fn new(
        config: &IdentityConfig,
        data_store: SharedDataStore,
        cache: SharedCacheStore,
    ) -> Result<Self, IdentityError> {
        let secret_storage = Arc::new(DataStoreSecretStorage::new(data_store.clone()));
        let account_store = Arc::new(SqlAccountStore::new(data_store));
        Self::with_parts(config, secret_storage, account_store, cache).await
    }

    /// Build the server from `GENERIC_DATA_STORE_*`, `GENERIC_CACHE_STORE_*`
    /// and the `IDENTITY_*` settings.
    pub async fn from_env() -> Result<Self, IdentityError> {
        let data_store = data_store_from_env()?;
        let cache = cache_store_from_env().await?;
        Self::new(&IdentityConfig::from_env(), data_store, cache).await
    }

    pub async fn with_parts(
        config: &IdentityConfig,
        secret_storage: Arc<dyn SecretStorage>,
        account_store: Arc<dyn AccountStore>,
        cache: SharedCacheStore,
    ) -> Result<Self, IdentityError> {
        account_store
            .init()
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?;

        let secrets = SecretStore::start(secret_storage, config.max_secret_age).await?;
        let signer = Arc::new(IdentitySigner::new(
            secrets,
            config.additional_secret.clone(),
        ));
        let accounts = Arc::new(AccountsIdentityServer::new(
            signer.clone(),
            account_store.clone(),
            config.forbid_client_account_creation,
        ));
        let login_method = Arc::new(LoginMethodServer::new(
            signer.clone(),
            account_store.clone(),
            cache,
            config.connection_state_ttl,
        ));
        let handlers = Arc::new(IdentityRpcHandlers::new(
            accounts.clone(),
            login_method.clone(),
            account_store,
        ));

        tracing::info!(
            max_secret_age_secs = config.max_secret_age.as_secs(),
            "Identity server ready"
        );
        Ok(Self {
            signer,
            accounts,
            login_method,
            handlers,
        })
    }

    pub fn signer(&self) -> &Arc<IdentitySigner> {
        &self.signer
    }

    pub fn accounts(&self) -> &Arc<AccountsIdentityServer> {
        &self.accounts
    }

    pub fn login_method(&self) -> &Arc<LoginMethodServer> {
        &self.login_method
    }

    pub fn handlers(&self) -> &Arc<IdentityRpcHandlers> {
        &self.handlers
    }

    /// Stop secret rotation.
    pub fn shutdown(&self) {
        self.signer.secrets().stop();
    }
}

/// Client-side entry points over one transport.
#[derive(Clone)]
pub struct IdentityClient {
    attempts: AttemptCoordinator,
    login_method: LoginMethodClient,
    accounts: AccountsIdentityClient,
}

impl IdentityClient {
    /// `cache` holds the state that must survive a page transition: the
    /// pending invocation and the establishing flag.
    pub async fn new(
        transport: Arc<dyn RpcTransport>,
        cache: SharedCacheStore,
    ) -> Result<Self, IdentityError> {
        Ok(Self {
            attempts: AttemptCoordinator::new(cache.clone()),
            login_method: LoginMethodClient::new(transport.clone(), cache).await?,
            accounts: AccountsIdentityClient::new(transport),
        })
    }

    pub fn attempts(&self) -> &AttemptCoordinator {
        &self.attempts
    }

    pub fn login_method(&self) -> &LoginMethodClient {
        &self.login_method
    }

    pub fn accounts(&self) -> &AccountsIdentityClient {
        &self.accounts
    }

    /// Complete an establish interrupted by a page transition. See
    /// [`LoginMethodClient::on_page_load_login`].
    pub async fn on_page_load_login(
        &self,
        login_error: Option<&RpcError>,
    ) -> Result<Option<AttemptResult>, IdentityError> {
        self.login_method
            .on_page_load_login(&self.attempts, login_error)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::test_utils::init_test_environment;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_server_from_env_signs_and_verifies() {
        // Given the test environment (in-memory sqlite and cache)
        init_test_environment().await;

        // When the server is built from the environment
        let server = IdentityServer::from_env().await.unwrap();

        // Then its signer works end to end
        let signed = server
            .signer()
            .sign(&Identity::new("svc", "u"))
            .await
            .unwrap();
        assert!(server.signer().verify(&signed).await.is_ok());

        server.shutdown();
    }
}
