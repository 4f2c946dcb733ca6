use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::accounts::{
    AccountStore, AccountsError, AccountsIdentityServer, IdentityLoginHandler, NewAccount,
};
use crate::identity::{Identity, IdentityRef};
use crate::login_method::{LoginAttempt, LoginMethodServer, ValidationOutcome};

use super::errors::RpcError;
use super::methods::{
    ACCOUNTS_IDENTITY_ADD_IDENTITY, ACCOUNTS_IDENTITY_CREATE, ACCOUNTS_IDENTITY_GET_IDENTITIES,
    ACCOUNTS_IDENTITY_REMOVE_IDENTITY, LOGIN, LOGIN_METHOD_GET_IDENTITY,
    LOGIN_METHOD_SET_ESTABLISHING, LOGOUT,
};

/// Handles one kind of `login` request.
#[async_trait]
pub trait LoginHandler: Send + Sync {
    /// `None` when `request` is not meant for this handler. Otherwise the id
    /// of the user to log in, or the reason the login failed.
    async fn login(&self, request: &Value) -> Option<Result<String, RpcError>>;
}

/// Server-side state of one client connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcSession {
    pub connection_id: String,
    pub user_id: Option<String>,
}

impl RpcSession {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            user_id: None,
        }
    }
}

/// Server implementations of the identity RPCs.
///
/// Every login, whether from a login handler or from account creation, goes
/// through the login-method validation hooks before the connection is logged
/// in, so that an establishing connection receives the identity-established
/// error instead.
pub struct IdentityRpcHandlers {
    accounts: Arc<AccountsIdentityServer>,
    login_method: Arc<LoginMethodServer>,
    store: Arc<dyn AccountStore>,
    login_handlers: RwLock<Vec<Arc<dyn LoginHandler>>>,
    login_tokens: Mutex<HashMap<String, usize>>,
}

impl IdentityRpcHandlers {
    pub fn new(
        accounts: Arc<AccountsIdentityServer>,
        login_method: Arc<LoginMethodServer>,
        store: Arc<dyn AccountStore>,
    ) -> Self {
        let identity_handler: Arc<dyn LoginHandler> =
            Arc::new(IdentityLoginHandler::new(accounts.clone()));
        Self {
            accounts,
            login_method,
            store,
            login_handlers: RwLock::new(vec![identity_handler]),
            login_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Add a login handler. Handlers are tried in registration order.
    pub fn register_login_handler(&self, handler: Arc<dyn LoginHandler>) {
        self.login_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn accounts(&self) -> &Arc<AccountsIdentityServer> {
        &self.accounts
    }

    pub fn login_method(&self) -> &Arc<LoginMethodServer> {
        &self.login_method
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    /// Run `method` if it is one of the identity RPCs; `None` otherwise.
    #[tracing::instrument(skip(self, session, args), fields(connection_id = %session.connection_id))]
    pub async fn dispatch(
        &self,
        session: &mut RpcSession,
        method: &str,
        args: &[Value],
    ) -> Option<Result<Value, RpcError>> {
        let result = match method {
            ACCOUNTS_IDENTITY_CREATE => self.create(session, args).await,
            ACCOUNTS_IDENTITY_ADD_IDENTITY => self.add_identity(session, args).await,
            ACCOUNTS_IDENTITY_REMOVE_IDENTITY => self.remove_identity(session, args).await,
            ACCOUNTS_IDENTITY_GET_IDENTITIES => self.get_identities(session).await,
            LOGIN_METHOD_SET_ESTABLISHING => self.set_establishing(session, args).await,
            LOGIN_METHOD_GET_IDENTITY => self.get_identity(session).await,
            LOGIN => self.login(session, args).await,
            LOGOUT => self.logout(session).await,
            _ => return None,
        };
        if let Err(e) = &result {
            tracing::debug!(method, error = %e, "RPC failed");
        }
        Some(result)
    }

    async fn create(&self, session: &mut RpcSession, args: &[Value]) -> Result<Value, RpcError> {
        let identity: Identity = arg(args, 0)?;
        let account_doc: Value = arg(args, 1)?;
        let account = self
            .accounts
            .prepare_account(&identity, account_doc)
            .await?;
        self.new_user(session, account).await
    }

    async fn add_identity(&self, session: &RpcSession, args: &[Value]) -> Result<Value, RpcError> {
        let identity: Identity = arg(args, 0)?;
        self.accounts
            .add_identity(session.user_id.as_deref(), &identity)
            .await?;
        Ok(Value::Null)
    }

    async fn remove_identity(
        &self,
        session: &RpcSession,
        args: &[Value],
    ) -> Result<Value, RpcError> {
        let identity: IdentityRef = arg(args, 0)?;
        self.accounts
            .remove_identity(session.user_id.as_deref(), &identity)
            .await?;
        Ok(Value::Null)
    }

    async fn get_identities(&self, session: &RpcSession) -> Result<Value, RpcError> {
        let user_id = session
            .user_id
            .as_deref()
            .ok_or(AccountsError::NotLoggedIn)?;
        let identities = self.accounts.get_identities(user_id).await?;
        serde_json::to_value(identities).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialize identities");
            RpcError::internal()
        })
    }

    async fn set_establishing(
        &self,
        session: &RpcSession,
        args: &[Value],
    ) -> Result<Value, RpcError> {
        let flag: bool = arg(args, 0)?;
        self.login_method
            .set_establishing(&session.connection_id, flag)
            .await?;
        Ok(Value::Null)
    }

    async fn get_identity(&self, session: &RpcSession) -> Result<Value, RpcError> {
        let identity = self
            .login_method
            .get_identity(&session.connection_id)
            .await?;
        serde_json::to_value(identity).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialize established identity");
            RpcError::internal()
        })
    }

    async fn login(&self, session: &mut RpcSession, args: &[Value]) -> Result<Value, RpcError> {
        let request: Value = arg(args, 0)?;
        let handlers: Vec<Arc<dyn LoginHandler>> = self
            .login_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for handler in handlers {
            if let Some(result) = handler.login(&request).await {
                return self.finish_login(session, result).await;
            }
        }
        Err(RpcError::bad_request(
            "Unrecognized options for login request",
        ))
    }

    /// Insert a new account on behalf of a login method and log the
    /// connection in as it, unless the new-user hook establishes an identity
    /// instead.
    pub async fn new_user(
        &self,
        session: &mut RpcSession,
        account: NewAccount,
    ) -> Result<Value, RpcError> {
        match self
            .login_method
            .validate_new_user(&session.connection_id, account.clone())
            .await?
        {
            ValidationOutcome::Establish(_) => Err(RpcError::identity_established()),
            ValidationOutcome::Continue => {
                let result = self
                    .store
                    .insert_account(account)
                    .await
                    .map(|account| account.id)
                    .map_err(|e| RpcError::from(AccountsError::from(e)));
                self.finish_login(session, result).await
            }
        }
    }

    /// Run the login-attempt hook on the outcome of a login method and, when
    /// it allows, log the connection in. Returns `{id}` of the user.
    pub async fn finish_login(
        &self,
        session: &mut RpcSession,
        result: Result<String, RpcError>,
    ) -> Result<Value, RpcError> {
        let attempt = match result {
            Ok(user_id) => match self.store.get_account(&user_id).await {
                Ok(Some(user)) => LoginAttempt::succeeded(user),
                Ok(None) => LoginAttempt::failed(AccountsError::AccountNotFound.into()),
                Err(e) => return Err(AccountsError::from(e).into()),
            },
            Err(e) => LoginAttempt::failed(e),
        };

        match self
            .login_method
            .validate_login_attempt(&session.connection_id, &attempt)
            .await?
        {
            ValidationOutcome::Establish(_) => Err(RpcError::identity_established()),
            ValidationOutcome::Continue => {
                let Some(user) = attempt.user else {
                    return Err(RpcError::forbidden("Login forbidden"));
                };
                self.log_in(session, user.id);
                Ok(json!({ "id": session.user_id }))
            }
        }
    }

    fn log_in(&self, session: &mut RpcSession, user_id: String) {
        let mut tokens = self
            .login_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *tokens.entry(user_id.clone()).or_insert(0) += 1;
        tracing::info!(connection_id = %session.connection_id, %user_id, "Logged in");
        session.user_id = Some(user_id);
    }

    async fn logout(&self, session: &mut RpcSession) -> Result<Value, RpcError> {
        let Some(user_id) = session.user_id.take() else {
            return Ok(Value::Null);
        };
        let (old_count, new_count) = {
            let mut tokens = self
                .login_tokens
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let old_count = tokens.get(&user_id).copied().unwrap_or(0);
            let new_count = old_count.saturating_sub(1);
            if new_count == 0 {
                tokens.remove(&user_id);
            } else {
                tokens.insert(user_id.clone(), new_count);
            }
            (old_count, new_count)
        };
        tracing::info!(connection_id = %session.connection_id, %user_id, "Logged out");
        self.accounts
            .login_tokens_changed(&user_id, old_count, new_count)
            .await?;
        Ok(Value::Null)
    }

    /// Drop the login-method state of a closed connection. Login tokens
    /// outlive the connection.
    pub async fn connection_closed(&self, session: &RpcSession) -> Result<(), RpcError> {
        self.login_method
            .remove_connection(&session.connection_id)
            .await
    }
}

fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, RpcError> {
    let value = args.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        tracing::debug!(error = %e, index, "Argument check failed");
        RpcError::bad_request("Match failed")
    })
}
