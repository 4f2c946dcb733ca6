use std::sync::Arc;

use identity_link::{
    IdentityConfig, IdentityServer, InMemoryCacheStore, LocalServer, SqliteDataStore,
    cache_store_from_env, data_store_from_env,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::services::{FakeLoginHandler, SignIdentityMethod, SignUpMethod};
use crate::services::{SIGN_IDENTITY_METHOD, SIGN_UP_METHOD};

/// Start the identity server and an in-process RPC server in front of it.
///
/// Storage comes from `GENERIC_DATA_STORE_*` / `GENERIC_CACHE_STORE_*` when
/// set, otherwise from in-memory backends.
pub(crate) async fn start_server()
-> Result<(IdentityServer, Arc<LocalServer>), Box<dyn std::error::Error>> {
    let config = IdentityConfig::from_env();
    let server = if std::env::var("GENERIC_DATA_STORE_TYPE").is_ok() {
        IdentityServer::new(&config, data_store_from_env()?, cache_store_from_env().await?).await?
    } else {
        tracing::info!("No data store configured, using in-memory storage");
        IdentityServer::new(
            &config,
            SqliteDataStore::in_memory()?.shared(),
            InMemoryCacheStore::shared(),
        )
        .await?
    };

    let handlers = server.handlers().clone();
    handlers.register_login_handler(Arc::new(FakeLoginHandler::new(handlers.store().clone())));

    let local = LocalServer::new(handlers);
    local.register_method(
        SIGN_IDENTITY_METHOD,
        Arc::new(SignIdentityMethod::new(server.signer().clone())),
    );
    local.register_method(SIGN_UP_METHOD, Arc::new(SignUpMethod));

    Ok((server, local))
}

pub(crate) fn init_tracing(app_name: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            format!("identity_link=trace,{app_name}=trace,info").into()
        }

        #[cfg(not(debug_assertions))]
        {
            "info".into()
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    #[cfg(debug_assertions)]
    tracing::info!("Debug mode enabled - showing detailed logs by default");
    tracing::info!("You can change verbosity by setting the RUST_LOG environment variable.");
}
