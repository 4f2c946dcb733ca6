//! Accounts-identity flows: create, login, logout and identity linking.

use std::time::Duration;

use identity_link::{
    ACCOUNT_NOT_FOUND, AccountStore, DUPLICATE_ACCOUNT, IdentityError, IdentityRef, LOGIN,
    NOT_LOGGED_IN, RpcError, RpcTransport,
};
use serde_json::json;

use crate::common::{TestContext, fake_identity};

fn assert_rpc_code(result: Result<impl std::fmt::Debug, IdentityError>, code: &str) {
    match result {
        Err(IdentityError::Rpc(e)) if e.has_code(code) => {}
        other => panic!("expected an RPC error with code {code}, got {other:?}"),
    }
}

async fn profile_name(ctx: &TestContext, user_id: &str) -> String {
    let account = ctx
        .server
        .handlers()
        .store()
        .get_account(user_id)
        .await
        .expect("account lookup failed")
        .expect("account exists");
    account.doc["profile"]["name"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_create_and_login() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;
    let accounts = client.identity.accounts();

    // Create an account for a new identity; the client is logged in to it
    let identity1 = fake_identity(&client.identity, "id1").await;
    let user1 = accounts
        .create(&identity1, json!({"profile": {"name": "name1"}}))
        .await
        .expect("create should succeed");
    assert_eq!(client.user_id().await.as_deref(), Some(user1.as_str()));
    assert_eq!(profile_name(&ctx, &user1).await, "name1");

    accounts.logout().await.unwrap();
    assert_eq!(client.user_id().await, None);

    // Logging in with an identity that has no account fails
    let identity2 = fake_identity(&client.identity, "id2").await;
    assert_rpc_code(accounts.login(&identity2).await, ACCOUNT_NOT_FOUND);
    assert_eq!(client.user_id().await, None);

    let user2 = accounts
        .create(&identity2, json!({"profile": {"name": "name2"}}))
        .await
        .expect("create should succeed");
    assert_ne!(user1, user2);
    accounts.logout().await.unwrap();

    // A re-signed identity logs in to the matching account
    let identity2 = fake_identity(&client.identity, "id2").await;
    assert_eq!(accounts.login(&identity2).await.unwrap(), user2);
    assert_eq!(profile_name(&ctx, &user2).await, "name2");
    accounts.logout().await.unwrap();

    let identity1 = fake_identity(&client.identity, "id1").await;
    assert_eq!(accounts.login(&identity1).await.unwrap(), user1);
    assert_eq!(client.user_id().await, Some(user1));
}

#[tokio::test]
async fn test_logout_requires_resigned_identity() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;
    let accounts = client.identity.accounts();

    let identity1 = fake_identity(&client.identity, "id1").await;
    let user1 = accounts
        .create(&identity1, json!({"profile": {"name": "name1"}}))
        .await
        .unwrap();

    // Wait so that the identity is older than the logout
    tokio::time::sleep(Duration::from_millis(1100)).await;
    accounts.logout().await.unwrap();

    // The old identity no longer logs in
    assert_rpc_code(accounts.login(&identity1).await, ACCOUNT_NOT_FOUND);

    // A freshly signed one does
    let identity1 = fake_identity(&client.identity, "id1").await;
    assert_eq!(accounts.login(&identity1).await.unwrap(), user1);
}

#[tokio::test]
async fn test_create_duplicate_identity() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;
    let accounts = client.identity.accounts();

    let identity1 = fake_identity(&client.identity, "id1").await;
    accounts
        .create(&identity1, json!({"profile": {"name": "name1"}}))
        .await
        .unwrap();

    // The same identity cannot create a second account
    assert_rpc_code(
        accounts
            .create(&identity1, json!({"profile": {"name": "name1"}}))
            .await,
        DUPLICATE_ACCOUNT,
    );

    // Neither can a re-signed copy of it
    accounts.logout().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let identity1 = fake_identity(&client.identity, "id1").await;
    assert_rpc_code(
        accounts
            .create(&identity1, json!({"profile": {"name": "name1"}}))
            .await,
        DUPLICATE_ACCOUNT,
    );
}

#[tokio::test]
async fn test_add_and_remove_identity() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;
    let accounts = client.identity.accounts();

    // Given an account created with id1
    let identity1 = fake_identity(&client.identity, "id1").await;
    let user1 = accounts.create(&identity1, json!({})).await.unwrap();

    // When a second identity is linked while logged in
    let identity3 = fake_identity(&client.identity, "id3").await;
    accounts.add_identity(&identity3).await.unwrap();

    // Then both are listed
    let mut identities = accounts.get_identities().await.unwrap();
    identities.sort();
    assert_eq!(
        identities,
        vec![
            IdentityRef::new("fake-identity-service", "id1"),
            IdentityRef::new("fake-identity-service", "id3"),
        ]
    );

    // And the second identity logs in to the same account
    accounts.logout().await.unwrap();
    let identity3 = fake_identity(&client.identity, "id3").await;
    assert_eq!(accounts.login(&identity3).await.unwrap(), user1);

    // When the first identity is removed
    accounts
        .remove_identity(&IdentityRef::new("fake-identity-service", "id1"))
        .await
        .unwrap();
    accounts.logout().await.unwrap();

    // Then it no longer logs in, while the second still does
    let identity1 = fake_identity(&client.identity, "id1").await;
    assert_rpc_code(accounts.login(&identity1).await, ACCOUNT_NOT_FOUND);
    let identity3 = fake_identity(&client.identity, "id3").await;
    assert_eq!(accounts.login(&identity3).await.unwrap(), user1);
}

#[tokio::test]
async fn test_add_identity_owned_by_another_account() {
    let ctx = TestContext::start().await;
    let first = ctx.client().await;
    let second = ctx.client().await;

    let identity1 = fake_identity(&first.identity, "id1").await;
    first
        .identity
        .accounts()
        .create(&identity1, json!({}))
        .await
        .unwrap();

    let identity2 = fake_identity(&second.identity, "id2").await;
    second
        .identity
        .accounts()
        .create(&identity2, json!({}))
        .await
        .unwrap();

    // id1 is already linked to the first account
    let identity1 = fake_identity(&second.identity, "id1").await;
    assert_rpc_code(
        second.identity.accounts().add_identity(&identity1).await,
        DUPLICATE_ACCOUNT,
    );
}

#[tokio::test]
async fn test_identity_calls_require_login() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;
    let accounts = client.identity.accounts();

    let identity = fake_identity(&client.identity, "id1").await;
    assert_rpc_code(accounts.add_identity(&identity).await, NOT_LOGGED_IN);
    assert_rpc_code(
        accounts.remove_identity(&identity.to_ref()).await,
        NOT_LOGGED_IN,
    );
    assert_rpc_code(accounts.get_identities().await, NOT_LOGGED_IN);
}

#[tokio::test]
async fn test_tampered_identity_is_rejected_opaquely() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;

    let mut identity = fake_identity(&client.identity, "id1").await;
    identity.id = "someone-else".to_string();

    match client.identity.accounts().create(&identity, json!({})).await {
        Err(IdentityError::Rpc(RpcError { reason, .. })) => {
            assert_eq!(reason, "Identity verification failed");
        }
        other => panic!("expected verification failure, got {other:?}"),
    }
    assert_eq!(client.user_id().await, None);
}

#[tokio::test]
async fn test_unrecognized_login_request() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;

    let result = client
        .transport
        .call(LOGIN, vec![json!({"password": "x"})])
        .await;

    assert_eq!(
        result,
        Err(RpcError::bad_request(
            "Unrecognized options for login request"
        ))
    );
}
