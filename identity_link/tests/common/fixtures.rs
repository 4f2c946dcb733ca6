//! Fake identity services and the server methods backing them.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

use identity_link::{
    AccountStore, AttemptCoordinator, AttemptOutcome, AttemptResult, AuthenticateService,
    CompletionCallback, CreateService, Identity, IdentityClient, IdentityError,
    IdentityRpcHandlers, IdentitySigner, LOGIN, LocalMethod, LoginHandler, LoginMethodClient,
    MethodName, NewAccount, RpcError, RpcSession, RpcTransport,
};

pub const FAKE_IDENTITY_SERVICE: &str = "fake-identity-service";
pub const WITH_FAKE_LOGIN_METHOD: &str = "with-fake-login-method";

pub const SIGN_IDENTITY_METHOD: &str = "Accounts.identity.test.signIdentity";
pub const CREATE_WITH_FAKE_LOGIN_METHOD: &str = "Identity.loginMethod.test.create";
pub const GET_VERIFIED_IDENTITY_RECORD_METHOD: &str =
    "Identity.loginMethod.test.getVerifiedIdentityRecord";

const FAKE_LOGIN_SERVICE_KEY: &str = "identityFakeLoginService";

/// Username of the account the fake login service keeps for `args`.
pub fn fake_login_username(args: &Value) -> String {
    format!("fake:{args}")
}

/// Server method signing `{serviceName, id}` on request.
pub struct SignIdentityMethod {
    signer: Arc<IdentitySigner>,
}

impl SignIdentityMethod {
    pub fn new(signer: Arc<IdentitySigner>) -> Self {
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
        let request = args.into_iter().next().unwrap_or(Value::Null);
        let identity: Identity =
            serde_json::from_value(request).map_err(|_| RpcError::bad_request("Match failed"))?;
        let signed = self.signer.sign(&identity).await?;
        Ok(serde_json::to_value(signed).expect("identity serializes"))
    }
}

/// Identity service whose identities are signed by the server on request.
pub struct FakeIdentityService {
    transport: Arc<dyn RpcTransport>,
}

impl FakeIdentityService {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AuthenticateService for FakeIdentityService {
    async fn authenticate(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError> {
        let request = json!({
            "serviceName": FAKE_IDENTITY_SERVICE,
            "id": options["id"].clone(),
        });
        let outcome = match self.transport.call(SIGN_IDENTITY_METHOD, vec![request]).await {
            Ok(value) => serde_json::from_value::<Identity>(value)
                .map(AttemptResult::new)
                .map_err(|e| IdentityError::InvalidIdentity(e.to_string())),
            Err(e) => Err(IdentityError::Rpc(e)),
        };
        attempts.fire_attempt_completion(outcome).await?;
        Ok(Value::Null)
    }
}

#[async_trait]
impl CreateService for FakeIdentityService {
    async fn create(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError> {
        self.authenticate(attempts, options).await
    }
}

/// `Identity.loginMethod.test.create`: inserts an account recording its
/// arguments and logs the connection in to it.
pub struct FakeCreateMethod;

#[async_trait]
impl LocalMethod for FakeCreateMethod {
    async fn call(
        &self,
        handlers: &IdentityRpcHandlers,
        session: &mut RpcSession,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let args = Value::Array(args);
        let account = NewAccount {
            username: Some(fake_login_username(&args)),
            doc: json!({ FAKE_LOGIN_SERVICE_KEY: { "args": args } }),
            ..NewAccount::default()
        };
        handlers.new_user(session, account).await
    }
}

/// Logs in to the account created by [`FakeCreateMethod`] with the same
/// arguments.
pub struct FakeLoginHandler {
    store: Arc<dyn AccountStore>,
}

impl FakeLoginHandler {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LoginHandler for FakeLoginHandler {
    async fn login(&self, request: &Value) -> Option<Result<String, RpcError>> {
        let args = request.get(FAKE_LOGIN_SERVICE_KEY)?;
        let found = self
            .store
            .find_by_username(&fake_login_username(args))
            .await
            .map_err(|_| RpcError::internal());
        Some(match found {
            Ok(Some(account)) => Ok(account.id),
            Ok(None) => Err(RpcError::forbidden("User not found")),
            Err(e) => Err(e),
        })
    }
}

/// `Identity.loginMethod.test.getVerifiedIdentityRecord`: verifies a
/// `loginMethod` identity and returns the account it names.
pub struct GetVerifiedIdentityRecordMethod;

#[async_trait]
impl LocalMethod for GetVerifiedIdentityRecordMethod {
    async fn call(
        &self,
        handlers: &IdentityRpcHandlers,
        _session: &mut RpcSession,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let request = args.into_iter().next().unwrap_or(Value::Null);
        let identity: Identity =
            serde_json::from_value(request).map_err(|_| RpcError::bad_request("Match failed"))?;
        let user_id = handlers
            .login_method()
            .verify_identity_from_login_method(&identity)
            .await?;
        let account = handlers
            .store()
            .get_account(&user_id)
            .await
            .map_err(|_| RpcError::internal())?;
        Ok(serde_json::to_value(account).expect("account serializes"))
    }
}

/// Identity service that establishes identities through the fake login
/// service. Options carry `{fakeLoginService: {args: [a, b]}}`.
pub struct FakeLoginMethodService {
    login_method: LoginMethodClient,
    transport: Arc<dyn RpcTransport>,
}

impl FakeLoginMethodService {
    pub fn new(login_method: LoginMethodClient, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            login_method,
            transport,
        }
    }
}

fn fake_login_args(options: &Value) -> Vec<Value> {
    options["fakeLoginService"]["args"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl AuthenticateService for FakeLoginMethodService {
    async fn authenticate(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError> {
        let request = json!({ FAKE_LOGIN_SERVICE_KEY: fake_login_args(&options) });
        self.login_method
            .establish_with(
                attempts,
                "loginWithFakeLoginService",
                self.transport.call(LOGIN, vec![request]),
            )
            .await?;
        Ok(Value::Null)
    }
}

#[async_trait]
impl CreateService for FakeLoginMethodService {
    async fn create(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError> {
        self.login_method
            .establish_with(
                attempts,
                "createWithFakeLoginService",
                self.transport
                    .call(CREATE_WITH_FAKE_LOGIN_METHOD, fake_login_args(&options)),
            )
            .await?;
        Ok(Value::Null)
    }
}

/// Run a create or authenticate attempt and return the outcome delivered to
/// its completion callback.
pub async fn run_attempt(
    client: &IdentityClient,
    method: MethodName,
    service_name: &str,
    options: Value,
) -> AttemptOutcome {
    let slot: Arc<Mutex<Option<AttemptOutcome>>> = Arc::new(Mutex::new(None));
    let captured = slot.clone();
    let callback: CompletionCallback = Box::new(move |outcome: &AttemptOutcome| {
        *captured.lock().unwrap() = Some(outcome.clone());
    });

    let dispatched = match method {
        MethodName::Create => {
            client
                .attempts()
                .create(service_name, options, Some(callback))
                .await
        }
        MethodName::Authenticate => {
            client
                .attempts()
                .authenticate(service_name, options, Some(callback))
                .await
        }
    };

    let fired = slot.lock().unwrap().take();
    match (dispatched, fired) {
        (_, Some(outcome)) => outcome,
        (Err(e), None) => Err(e),
        (Ok(dispatch), None) => panic!("no completion fired for {dispatch:?}"),
    }
}

/// Authenticate with the fake identity service and return the signed identity.
pub async fn fake_identity(client: &IdentityClient, id: &str) -> Identity {
    run_attempt(
        client,
        MethodName::Authenticate,
        FAKE_IDENTITY_SERVICE,
        json!({ "id": id }),
    )
    .await
    .expect("fake identity service failed")
    .identity
}
