use std::sync::{Arc, Once};

use identity_link::{
    IdentityClient, IdentityConfig, IdentityServer, InMemoryCacheStore, LocalConnection,
    LocalServer, RpcTransport, ServiceProvider, SharedCacheStore, SqliteDataStore,
};

use crate::common::fixtures::{
    CREATE_WITH_FAKE_LOGIN_METHOD, FAKE_IDENTITY_SERVICE, FakeCreateMethod, FakeIdentityService,
    FakeLoginHandler, FakeLoginMethodService, GET_VERIFIED_IDENTITY_RECORD_METHOD,
    GetVerifiedIdentityRecordMethod, SIGN_IDENTITY_METHOD, SignIdentityMethod,
    WITH_FAKE_LOGIN_METHOD,
};

/// Initialize tracing for tests, filtered by `RUST_LOG`
fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Load test environment configuration
fn load_test_environment() {
    init_test_tracing();
    if let Err(e) = dotenvy::from_filename(".env_test") {
        tracing::debug!("Could not load .env_test file: {e}");
    }
}

/// One server with in-memory storage and the fake services installed.
pub struct TestContext {
    pub server: IdentityServer,
    pub local: Arc<LocalServer>,
}

impl TestContext {
    pub async fn start() -> Self {
        load_test_environment();

        let data_store = SqliteDataStore::in_memory()
            .expect("Failed to open in-memory sqlite")
            .shared();
        let server = IdentityServer::new(
            &IdentityConfig::default(),
            data_store,
            InMemoryCacheStore::shared(),
        )
        .await
        .expect("Failed to start identity server");

        let handlers = server.handlers().clone();
        handlers.register_login_handler(Arc::new(FakeLoginHandler::new(handlers.store().clone())));

        let local = LocalServer::new(handlers);
        local.register_method(
            SIGN_IDENTITY_METHOD,
            Arc::new(SignIdentityMethod::new(server.signer().clone())),
        );
        local.register_method(CREATE_WITH_FAKE_LOGIN_METHOD, Arc::new(FakeCreateMethod));
        local.register_method(
            GET_VERIFIED_IDENTITY_RECORD_METHOD,
            Arc::new(GetVerifiedIdentityRecordMethod),
        );

        Self { server, local }
    }

    /// A new client on its own connection, with its own client-side state.
    pub async fn client(&self) -> TestClient {
        self.client_with_cache(InMemoryCacheStore::shared()).await
    }

    /// A new client on its own connection over existing client-side state,
    /// as after a full page load.
    pub async fn client_with_cache(&self, cache: SharedCacheStore) -> TestClient {
        let connection = Arc::new(self.local.connect());
        let transport: Arc<dyn RpcTransport> = connection.clone();
        let identity = IdentityClient::new(transport.clone(), cache.clone())
            .await
            .expect("Failed to create identity client");

        identity
            .attempts()
            .register_service(
                FAKE_IDENTITY_SERVICE,
                ServiceProvider::WithCreate(Arc::new(FakeIdentityService::new(transport.clone()))),
            )
            .expect("Failed to register fake identity service");
        identity
            .attempts()
            .register_service(
                WITH_FAKE_LOGIN_METHOD,
                ServiceProvider::WithCreate(Arc::new(FakeLoginMethodService::new(
                    identity.login_method().clone(),
                    transport.clone(),
                ))),
            )
            .expect("Failed to register fake login method service");

        TestClient {
            connection,
            transport,
            identity,
            cache,
        }
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

pub struct TestClient {
    pub connection: Arc<LocalConnection>,
    pub transport: Arc<dyn RpcTransport>,
    pub identity: IdentityClient,
    pub cache: SharedCacheStore,
}

impl TestClient {
    pub async fn user_id(&self) -> Option<String> {
        self.connection.user_id().await
    }
}
