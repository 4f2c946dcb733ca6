//! Establishing identities through an unrelated login method.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use identity_link::{
    AttemptCoordinator, AuthenticateService, IDENTITY_ESTABLISHED, Identity, IdentityError, LOGIN,
    LOGIN_METHOD_SERVICE_NAME, LoginMethodClient, MethodName, RpcError, RpcTransport,
    ServiceProvider,
};
use serde_json::{Value, json};

use crate::common::{
    CREATE_WITH_FAKE_LOGIN_METHOD, GET_VERIFIED_IDENTITY_RECORD_METHOD, TestClient, TestContext,
    WITH_FAKE_LOGIN_METHOD, fake_login_username, run_attempt,
};

fn random_args() -> Value {
    json!([uuid::Uuid::new_v4().to_string(), uuid::Uuid::new_v4().to_string()])
}

async fn fake_login(client: &TestClient, args: &Value) -> Result<Value, RpcError> {
    client
        .transport
        .call(LOGIN, vec![json!({ "identityFakeLoginService": args })])
        .await
}

async fn verified_record(client: &TestClient, identity: &Identity) -> Value {
    client
        .transport
        .call(
            GET_VERIFIED_IDENTITY_RECORD_METHOD,
            vec![serde_json::to_value(identity).unwrap()],
        )
        .await
        .expect("identity should verify")
}

#[tokio::test]
async fn test_fake_login_service() {
    // The fake login service itself behaves like an ordinary login method
    let ctx = TestContext::start().await;
    let client = ctx.client().await;
    let args = random_args();

    let created = client
        .transport
        .call(
            CREATE_WITH_FAKE_LOGIN_METHOD,
            args.as_array().unwrap().clone(),
        )
        .await
        .expect("create should log in");
    let user_id = client.user_id().await.expect("logged in after create");
    assert_eq!(created["id"], json!(user_id));

    client.identity.accounts().logout().await.unwrap();
    assert_eq!(client.user_id().await, None);

    fake_login(&client, &args).await.expect("login should succeed");
    assert_eq!(client.user_id().await, Some(user_id));
}

#[tokio::test]
async fn test_establish_with_create_then_authenticate() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;
    let args = random_args();
    let options = json!({"fakeLoginService": {"args": args}});

    // Create establishes a loginMethod identity for a new account
    let created = run_attempt(
        &client.identity,
        MethodName::Create,
        WITH_FAKE_LOGIN_METHOD,
        options.clone(),
    )
    .await
    .expect("establish via create should succeed");
    assert_eq!(created.identity.service_name, LOGIN_METHOD_SERVICE_NAME);
    assert_eq!(created.method_name, Some(MethodName::Create));
    assert_eq!(client.user_id().await, None);
    assert!(!client.identity.login_method().is_establishing().await.unwrap());

    let record = verified_record(&client, &created.identity).await;
    assert_eq!(record["username"], json!(fake_login_username(&args)));
    assert_eq!(record["identityOnly"], json!(true));

    // The account cannot be logged in to directly
    let direct = fake_login(&client, &args).await;
    assert_eq!(direct, Err(RpcError::forbidden("User not found")));
    assert_eq!(client.user_id().await, None);

    // Authenticate establishes the same account's identity again
    let authenticated = run_attempt(
        &client.identity,
        MethodName::Authenticate,
        WITH_FAKE_LOGIN_METHOD,
        options,
    )
    .await
    .expect("establish via authenticate should succeed");
    assert_eq!(authenticated.identity.service_name, LOGIN_METHOD_SERVICE_NAME);
    assert_eq!(authenticated.identity.id, created.identity.id);
    assert_eq!(authenticated.method_name, Some(MethodName::Authenticate));

    let record = verified_record(&client, &authenticated.identity).await;
    assert_eq!(record["username"], json!(fake_login_username(&args)));
}

#[tokio::test]
async fn test_establish_propagates_login_failure() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;

    // No account exists for these arguments
    let outcome = run_attempt(
        &client.identity,
        MethodName::Authenticate,
        WITH_FAKE_LOGIN_METHOD,
        json!({"fakeLoginService": {"args": random_args()}}),
    )
    .await;

    assert_eq!(
        outcome,
        Err(IdentityError::Rpc(RpcError::forbidden("User not found")))
    );
    assert!(!client.identity.login_method().is_establishing().await.unwrap());
    assert_eq!(
        client.identity.attempts().pending_invocation().await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_establish_over_existing_account() {
    // An ordinary account established through its login method
    let ctx = TestContext::start().await;
    let client = ctx.client().await;
    let args = random_args();

    client
        .transport
        .call(
            CREATE_WITH_FAKE_LOGIN_METHOD,
            args.as_array().unwrap().clone(),
        )
        .await
        .unwrap();
    let user_id = client.user_id().await.unwrap();
    client.identity.accounts().logout().await.unwrap();

    let outcome = run_attempt(
        &client.identity,
        MethodName::Authenticate,
        WITH_FAKE_LOGIN_METHOD,
        json!({"fakeLoginService": {"args": args}}),
    )
    .await
    .unwrap();
    assert_eq!(outcome.identity.id, user_id);

    // Not establishing any more, so the account logs in normally
    fake_login(&client, &args).await.unwrap();
    assert_eq!(client.user_id().await, Some(user_id));
}

/// Starts establishing and then leaves the page before the login answers.
struct RedirectingLoginMethod {
    login_method: LoginMethodClient,
}

#[async_trait]
impl AuthenticateService for RedirectingLoginMethod {
    async fn authenticate(
        &self,
        attempts: &AttemptCoordinator,
        _options: Value,
    ) -> Result<Value, IdentityError> {
        self.login_method
            .establish_with(
                attempts,
                "loginWithRedirect",
                std::future::pending::<Result<Value, RpcError>>(),
            )
            .await?;
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn test_page_load_completes_establishing() {
    let ctx = TestContext::start().await;
    let args = random_args();

    // Given an ordinary account of the fake login service
    let setup = ctx.client().await;
    setup
        .transport
        .call(
            CREATE_WITH_FAKE_LOGIN_METHOD,
            args.as_array().unwrap().clone(),
        )
        .await
        .unwrap();
    let user_id = setup.user_id().await.unwrap();

    // And a page that starts establishing, then redirects away
    let page1 = ctx.client().await;
    page1
        .identity
        .attempts()
        .register_service(
            "redirecting-login-method",
            ServiceProvider::AuthenticateOnly(Arc::new(RedirectingLoginMethod {
                login_method: page1.identity.login_method().clone(),
            })),
        )
        .unwrap();
    let unloaded = tokio::time::timeout(
        Duration::from_millis(100),
        page1.identity.attempts().authenticate(
            "redirecting-login-method",
            json!({"clientState": "after-redirect"}),
            None,
        ),
    )
    .await;
    assert!(unloaded.is_err(), "the login should still be in flight");

    // When the next page loads over the same client state
    let page2 = ctx.client_with_cache(page1.cache.clone()).await;
    assert!(page2.identity.login_method().is_establishing().await.unwrap());

    // And the redirect's login is answered with the sentinel
    let login_error = fake_login(&page2, &args)
        .await
        .expect_err("login should be hijacked");
    assert!(login_error.has_code(IDENTITY_ESTABLISHED));

    // Then the page-load hook completes the original attempt
    let result = page2
        .identity
        .on_page_load_login(Some(&login_error))
        .await
        .unwrap()
        .expect("establishing should complete");
    assert_eq!(result.identity.service_name, LOGIN_METHOD_SERVICE_NAME);
    assert_eq!(result.identity.id, user_id);
    assert_eq!(result.method_name, Some(MethodName::Authenticate));
    assert_eq!(result.client_state, Some(json!("after-redirect")));
    assert!(!page2.identity.login_method().is_establishing().await.unwrap());
    assert_eq!(page2.user_id().await, None);
}
