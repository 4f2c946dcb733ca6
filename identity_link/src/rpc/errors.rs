use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Returned by a login call that was hijacked to establish an identity. The
/// identity can then be fetched with `Identity.loginMethod._getIdentity`.
pub const IDENTITY_ESTABLISHED: &str = "identity-login-method-established-identity";

pub const ACCOUNT_NOT_FOUND: &str = "accounts-identity-account-not-found";
pub const DUPLICATE_ACCOUNT: &str = "accounts-identity-duplicate-account";
pub const NOT_LOGGED_IN: &str = "accounts-identity-not-logged-in";

/// The error code carried over the wire: either an HTTP-like status or a
/// stable string code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Status(u16),
    Named(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "{status}"),
            Self::Named(code) => write!(f, "{code}"),
        }
    }
}

/// An error as seen by the caller of a remote procedure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason} [{code}]")]
pub struct RpcError {
    pub code: ErrorCode,
    pub reason: String,
}

impl RpcError {
    pub fn status(status: u16, reason: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Status(status),
            reason: reason.into(),
        }
    }

    pub fn named(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Named(code.into()),
            reason: reason.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::status(403, reason)
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::status(400, reason)
    }

    pub fn internal() -> Self {
        Self::status(500, "Internal server error")
    }

    pub fn identity_established() -> Self {
        Self::named(IDENTITY_ESTABLISHED, "Identity established.")
    }

    pub fn is_identity_established(&self) -> bool {
        self.has_code(IDENTITY_ESTABLISHED)
    }

    pub fn has_code(&self, code: &str) -> bool {
        matches!(&self.code, ErrorCode::Named(c) if c == code)
    }
}
