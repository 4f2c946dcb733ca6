use thiserror::Error;

use crate::rpc::RpcError;
use crate::storage::StorageError;
use crate::utils::UtilError;

/// Errors raised by the identity layer.
///
/// `SecretUnavailable`, `ClaimMismatch` and `Token` describe why a verification
/// failed. They are logged and then replaced by `VerificationFailed` before
/// they leave the verifier.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentityError {
    #[error("Service already registered: {0}")]
    ServiceAlreadyRegistered(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Identity verification failed")]
    VerificationFailed,

    #[error("{0}")]
    SecretUnavailable(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Claim mismatch: {0}")]
    ClaimMismatch(String),

    #[error("Token error: {0}")]
    Token(String),

    /// A provider or caller broke the attempt-completion protocol.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

impl IdentityError {
    /// Stable wire code for the errors that have one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::ServiceAlreadyRegistered(_) => Some("identity-service-already-registered"),
            Self::ServiceNotFound(_) => Some("identity-service-not-found"),
            Self::VerificationFailed => Some("verification-failed"),
            _ => None,
        }
    }

    /// Log the error and return self
    pub fn log(self) -> Self {
        match &self {
            Self::ContractViolation(msg) => tracing::error!("Contract violation: {}", msg),
            Self::Storage(msg) => tracing::error!("Storage error: {}", msg),
            other => tracing::warn!("{}", other),
        }
        self
    }
}

impl From<StorageError> for IdentityError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for IdentityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Token(err.to_string())
    }
}

impl From<IdentityError> for RpcError {
    fn from(err: IdentityError) -> Self {
        match (&err, err.code()) {
            (IdentityError::Rpc(rpc), _) => rpc.clone(),
            (IdentityError::VerificationFailed, Some(code)) => {
                RpcError::named(code, "Identity verification failed")
            }
            (_, Some(code)) => RpcError::named(code, err.to_string()),
            (IdentityError::InvalidIdentity(reason), None) => RpcError::bad_request(reason.clone()),
            _ => {
                tracing::error!("Identity error hidden from caller: {}", err);
                RpcError::internal()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::ErrorCode;

    #[test]
    fn test_codes() {
        assert_eq!(
            IdentityError::ServiceAlreadyRegistered("fake".to_string()).code(),
            Some("identity-service-already-registered")
        );
        assert_eq!(
            IdentityError::ServiceNotFound("fake".to_string()).code(),
            Some("identity-service-not-found")
        );
        assert_eq!(
            IdentityError::VerificationFailed.code(),
            Some("verification-failed")
        );
        assert_eq!(IdentityError::Token("bad".to_string()).code(), None);
    }

    #[test]
    fn test_verification_detail_never_reaches_the_wire() {
        // Given internal verification detail
        let detail = IdentityError::SecretUnavailable("Secret for keyId k1 is not available".into());

        // When converted for the caller
        let rpc = RpcError::from(detail);

        // Then only an opaque internal error is returned
        assert_eq!(rpc.code, ErrorCode::Status(500));
        assert!(!rpc.reason.contains("k1"));

        let rpc = RpcError::from(IdentityError::VerificationFailed);
        assert!(rpc.has_code("verification-failed"));
    }

    #[test]
    fn test_rpc_errors_pass_through() {
        let original = RpcError::forbidden("Login forbidden");
        let wrapped = IdentityError::from(original.clone());
        assert_eq!(RpcError::from(wrapped), original);
    }

    #[test]
    fn test_from_storage_error() {
        let err = IdentityError::from(StorageError::Storage("db down".to_string()));
        assert!(matches!(err, IdentityError::Storage(msg) if msg.contains("db down")));
    }
}
