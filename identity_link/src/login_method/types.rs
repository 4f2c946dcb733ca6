use serde::{Deserialize, Serialize};

use crate::accounts::Account;
use crate::identity::Identity;
use crate::rpc::RpcError;

/// Service name of identities established through a login method.
pub const LOGIN_METHOD_SERVICE_NAME: &str = "loginMethod";

/// Cache prefix of the client's persisted establishing flag.
pub const ESTABLISHING_STATE_PREFIX: &str = "identity_login_method_ctx";

pub(super) const ESTABLISHING_KEY: &str = "is_establishing.v1";

pub(super) const CONNECTION_STATE_PREFIX: &str = "identity_connection";

/// What a validation hook decided.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Let the login or account creation proceed normally.
    Continue,
    /// An identity was established and stored on the connection. The login
    /// call must be answered with the identity-established error.
    Establish(Identity),
}

/// A login attempt as seen by the validation hook.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginAttempt {
    pub allowed: bool,
    pub error: Option<RpcError>,
    pub user: Option<Account>,
}

impl LoginAttempt {
    pub fn succeeded(user: Account) -> Self {
        Self {
            allowed: true,
            error: None,
            user: Some(user),
        }
    }

    pub fn failed(error: RpcError) -> Self {
        Self {
            allowed: false,
            error: Some(error),
            user: None,
        }
    }
}

/// Login-method state of one server connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConnectionState {
    pub(super) establishing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) identity: Option<Identity>,
}
