use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use identity_link::{
    AttemptOutcome, CompletionCallback, Identity, IdentityClient, InMemoryCacheStore, MethodName,
    RpcTransport, ServiceProvider,
};

mod server;
mod services;

use crate::{
    server::{init_tracing, start_server},
    services::{DEMO_LOGIN_METHOD, DEMO_SERVICE, DemoLoginMethod, DemoService},
};

/// Run one attempt and wait for the outcome delivered to its callback.
async fn attempt(
    client: &IdentityClient,
    method: MethodName,
    service_name: &str,
    options: serde_json::Value,
) -> Result<Identity, Box<dyn std::error::Error>> {
    let slot: Arc<Mutex<Option<AttemptOutcome>>> = Arc::new(Mutex::new(None));
    let captured = slot.clone();
    let callback: CompletionCallback = Box::new(move |outcome: &AttemptOutcome| {
        if let Ok(mut slot) = captured.lock() {
            *slot = Some(outcome.clone());
        }
    });

    let attempts = client.attempts();
    let dispatched = match method {
        MethodName::Create => attempts.create(service_name, options, Some(callback)).await,
        MethodName::Authenticate => {
            attempts
                .authenticate(service_name, options, Some(callback))
                .await
        }
    };
    tracing::debug!(?dispatched, "Attempt dispatched");

    let outcome = slot
        .lock()
        .map_err(|_| "completion slot poisoned")?
        .take()
        .ok_or("attempt did not complete")?;
    Ok(outcome?.identity)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing(env!("CARGO_CRATE_NAME"));

    let (server, local) = start_server().await?;

    let connection = Arc::new(local.connect());
    let transport: Arc<dyn RpcTransport> = connection.clone();
    let client = IdentityClient::new(transport.clone(), InMemoryCacheStore::shared()).await?;
    client.attempts().register_service(
        DEMO_SERVICE,
        ServiceProvider::WithCreate(Arc::new(DemoService::new(transport.clone()))),
    )?;
    client.attempts().register_service(
        DEMO_LOGIN_METHOD,
        ServiceProvider::WithCreate(Arc::new(DemoLoginMethod::new(
            client.login_method().clone(),
            transport.clone(),
        ))),
    )?;
    let accounts = client.accounts();

    // Create an account from an identity
    let alice = attempt(&client, MethodName::Create, DEMO_SERVICE, json!({"id": "alice"})).await?;
    let user_id = accounts
        .create(&alice, json!({"profile": {"name": "Alice"}}))
        .await?;
    tracing::info!(%user_id, "Created account");

    // Link a second identity
    let work = attempt(&client, MethodName::Authenticate, DEMO_SERVICE, json!({"id": "alice@work"}))
        .await?;
    accounts.add_identity(&work).await?;
    tracing::info!(identities = ?accounts.get_identities().await?, "Linked identities");

    // Identities signed before a logout must be re-signed
    tokio::time::sleep(Duration::from_millis(1100)).await;
    accounts.logout().await?;
    match accounts.login(&work).await {
        Ok(_) => tracing::warn!("Stale identity was accepted"),
        Err(e) => tracing::info!(error = %e, "Stale identity rejected"),
    }
    let work = attempt(&client, MethodName::Authenticate, DEMO_SERVICE, json!({"id": "alice@work"}))
        .await?;
    let logged_in = accounts.login(&work).await?;
    tracing::info!(user_id = %logged_in, "Logged in with the linked identity");

    // Unlink the first identity
    accounts.remove_identity(&alice.to_ref()).await?;
    accounts.logout().await?;
    let alice = attempt(&client, MethodName::Authenticate, DEMO_SERVICE, json!({"id": "alice"})).await?;
    match accounts.login(&alice).await {
        Ok(_) => tracing::warn!("Unlinked identity was accepted"),
        Err(e) => tracing::info!(error = %e, "Unlinked identity rejected"),
    }

    // Establish an identity through the username login method
    let established = attempt(
        &client,
        MethodName::Create,
        DEMO_LOGIN_METHOD,
        json!({"username": "bob"}),
    )
    .await?;
    tracing::info!(
        service_name = %established.service_name,
        id = %established.id,
        "Established identity through a login method"
    );
    let bob = server
        .login_method()
        .verify_identity_from_login_method(&established)
        .await?;
    tracing::info!(user_id = %bob, "Login-method identity verified");

    connection.close().await?;
    server.shutdown();
    Ok(())
}
