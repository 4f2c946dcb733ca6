//! Demo identity services: one whose identities the server signs on request,
//! and a username login method bridged into an identity service.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use identity_link::{
    AccountStore, AttemptCoordinator, AttemptResult, AuthenticateService, CreateService,
    Identity, IdentityError, IdentityRpcHandlers, IdentitySigner, LOGIN, LocalMethod,
    LoginHandler, LoginMethodClient, NewAccount, RpcError, RpcSession, RpcTransport,
};

pub(crate) const DEMO_SERVICE: &str = "demo-service";
pub(crate) const DEMO_LOGIN_METHOD: &str = "demo-login-method";

pub(crate) const SIGN_IDENTITY_METHOD: &str = "Demo.signIdentity";
pub(crate) const SIGN_UP_METHOD: &str = "Demo.signUp";

const USERNAME_LOGIN_KEY: &str = "demoUsername";

fn first_arg(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Null)
}

pub(crate) struct SignIdentityMethod {
    signer: Arc<IdentitySigner>,
}

impl SignIdentityMethod {
    pub(crate) fn new(signer: Arc<IdentitySigner>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl LocalMethod for SignIdentityMethod {
    async fn call(
        &self,
        _handlers: &IdentityRpcHandlers,
        _session: &mut RpcSession,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let identity: Identity = serde_json::from_value(first_arg(args))
            .map_err(|_| RpcError::bad_request("Match failed"))?;
        let signed = self.signer.sign(&identity).await?;
        serde_json::to_value(signed).map_err(|_| RpcError::internal())
    }
}

/// Signs up a username account and logs the connection in to it.
pub(crate) struct SignUpMethod;

#[async_trait]
impl LocalMethod for SignUpMethod {
    async fn call(
        &self,
        handlers: &IdentityRpcHandlers,
        session: &mut RpcSession,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let username = first_arg(args)
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::bad_request("Match failed"))?;
        let account = NewAccount {
            username: Some(username),
            ..NewAccount::default()
        };
        handlers.new_user(session, account).await
    }
}

/// Logs in with `{demoUsername: name}`.
pub(crate) struct FakeLoginHandler {
    store: Arc<dyn AccountStore>,
}

impl FakeLoginHandler {
    pub(crate) fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LoginHandler for FakeLoginHandler {
    async fn login(&self, request: &Value) -> Option<Result<String, RpcError>> {
        let username = request.get(USERNAME_LOGIN_KEY)?.as_str()?;
        Some(match self.store.find_by_username(username).await {
            Ok(Some(account)) => Ok(account.id),
            Ok(None) => Err(RpcError::forbidden("User not found")),
            Err(e) => {
                tracing::error!(error = %e, "Username lookup failed");
                Err(RpcError::internal())
            }
        })
    }
}

pub(crate) struct DemoService {
    transport: Arc<dyn RpcTransport>,
}

impl DemoService {
    pub(crate) fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AuthenticateService for DemoService {
    async fn authenticate(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError> {
        let request = json!({ "serviceName": DEMO_SERVICE, "id": options["id"].clone() });
        let outcome = match self.transport.call(SIGN_IDENTITY_METHOD, vec![request]).await {
            Ok(value) => serde_json::from_value::<Identity>(value)
                .map(AttemptResult::new)
                .map_err(|e| IdentityError::InvalidIdentity(e.to_string())),
            Err(e) => Err(e.into()),
        };
        attempts.fire_attempt_completion(outcome).await?;
        Ok(Value::Null)
    }
}

#[async_trait]
impl CreateService for DemoService {
    async fn create(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError> {
        self.authenticate(attempts, options).await
    }
}

/// Username sign-up and login, turned into an identity service.
pub(crate) struct DemoLoginMethod {
    login_method: LoginMethodClient,
    transport: Arc<dyn RpcTransport>,
}

impl DemoLoginMethod {
    pub(crate) fn new(login_method: LoginMethodClient, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            login_method,
            transport,
        }
    }
}

#[async_trait]
impl AuthenticateService for DemoLoginMethod {
    async fn authenticate(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError> {
        let request = json!({ USERNAME_LOGIN_KEY: options["username"].clone() });
        self.login_method
            .establish_with(
                attempts,
                "loginWithUsername",
                self.transport.call(LOGIN, vec![request]),
            )
            .await?;
        Ok(Value::Null)
    }
}

#[async_trait]
impl CreateService for DemoLoginMethod {
    async fn create(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError> {
        self.login_method
            .establish_with(
                attempts,
                "signUpWithUsername",
                self.transport
                    .call(SIGN_UP_METHOD, vec![options["username"].clone()]),
            )
            .await?;
        Ok(Value::Null)
    }
}
