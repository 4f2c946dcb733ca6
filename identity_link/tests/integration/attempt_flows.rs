//! Attempt coordination through a real server round trip.

use std::sync::{Arc, Mutex};

use identity_link::{AttemptDispatch, IdentityError, MethodName};
use serde_json::json;

use crate::common::{FAKE_IDENTITY_SERVICE, TestContext, run_attempt};

#[tokio::test]
async fn test_completion_merges_invocation_context() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;

    let outcome = run_attempt(
        &client.identity,
        MethodName::Create,
        FAKE_IDENTITY_SERVICE,
        json!({"id": "id1", "clientState": {"returnTo": "/home"}}),
    )
    .await
    .expect("attempt should succeed");

    assert_eq!(outcome.method_name, Some(MethodName::Create));
    assert_eq!(outcome.client_state, Some(json!({"returnTo": "/home"})));
    assert_eq!(outcome.identity.service_name, FAKE_IDENTITY_SERVICE);
    assert_eq!(outcome.identity.id, "id1");

    // The server accepts what the service produced
    assert!(ctx.server.signer().verify(&outcome.identity).await.is_ok());

    // Nothing is left pending
    assert_eq!(
        client.identity.attempts().pending_invocation().await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_hooks_see_every_completion_until_stopped() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let stopper = client.identity.attempts().on_attempt_completion(move |outcome| {
        let id = outcome.as_ref().map(|r| r.identity.id.clone()).ok();
        recorder.lock().unwrap().push(id);
    });

    run_attempt(
        &client.identity,
        MethodName::Authenticate,
        FAKE_IDENTITY_SERVICE,
        json!({"id": "a"}),
    )
    .await
    .unwrap();
    run_attempt(
        &client.identity,
        MethodName::Authenticate,
        FAKE_IDENTITY_SERVICE,
        json!({"id": "b"}),
    )
    .await
    .unwrap();

    stopper.stop();
    run_attempt(
        &client.identity,
        MethodName::Authenticate,
        FAKE_IDENTITY_SERVICE,
        json!({"id": "c"}),
    )
    .await
    .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some("a".to_string()), Some("b".to_string())]
    );
}

#[tokio::test]
async fn test_second_fire_is_contract_violation() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;

    let outcome = run_attempt(
        &client.identity,
        MethodName::Authenticate,
        FAKE_IDENTITY_SERVICE,
        json!({"id": "id1"}),
    )
    .await
    .unwrap();

    let again = client
        .identity
        .attempts()
        .fire_attempt_completion(Ok(outcome))
        .await;
    assert!(matches!(again, Err(IdentityError::ContractViolation(_))));
}

#[tokio::test]
async fn test_unknown_service() {
    let ctx = TestContext::start().await;
    let client = ctx.client().await;

    let result = client
        .identity
        .attempts()
        .authenticate("no-such-service", json!({}), None)
        .await;

    assert_eq!(
        result,
        Err(IdentityError::ServiceNotFound("no-such-service".to_string()))
    );
}

#[tokio::test]
async fn test_create_requires_create_capability() {
    use async_trait::async_trait;
    use identity_link::{AttemptCoordinator, AuthenticateService, ServiceProvider};
    use serde_json::Value;

    struct AuthenticateOnly;

    #[async_trait]
    impl AuthenticateService for AuthenticateOnly {
        async fn authenticate(
            &self,
            _attempts: &AttemptCoordinator,
            _options: Value,
        ) -> Result<Value, IdentityError> {
            Ok(Value::Null)
        }
    }

    let ctx = TestContext::start().await;
    let client = ctx.client().await;
    let attempts = client.identity.attempts();
    attempts
        .register_service(
            "authenticate-only",
            ServiceProvider::AuthenticateOnly(Arc::new(AuthenticateOnly)),
        )
        .unwrap();

    let fired = Arc::new(Mutex::new(false));
    let flag = fired.clone();
    let _stopper = attempts.on_attempt_completion(move |_| *flag.lock().unwrap() = true);

    let result = attempts
        .create("authenticate-only", json!({}), None)
        .await
        .unwrap();

    assert_eq!(result, AttemptDispatch::Unsupported);
    assert!(!*fired.lock().unwrap());
    assert_eq!(attempts.pending_invocation().await.unwrap(), None);
}
