//! Central configuration for the identity_link crate

use std::sync::LazyLock;
use std::time::Duration;

const DEFAULT_MAX_SECRET_AGE_SECS: u64 = 2 * 24 * 60 * 60;
const DEFAULT_CONNECTION_STATE_TTL_SECS: u64 = 60 * 60;

/// Identities signed with secrets older than this are rejected.
///
/// Read from `IDENTITY_MAX_SECRET_AGE` (seconds). Default: two days.
pub static IDENTITY_MAX_SECRET_AGE: LazyLock<Duration> = LazyLock::new(|| {
    Duration::from_secs(parse_u64_or(
        std::env::var("IDENTITY_MAX_SECRET_AGE").ok(),
        DEFAULT_MAX_SECRET_AGE_SECS,
    ))
});

/// Combined with every stored secret, so that an attacker needs both this value
/// and a recent secret from the database in order to sign identities.
pub static IDENTITY_ADDITIONAL_SECRET: LazyLock<String> =
    LazyLock::new(|| std::env::var("IDENTITY_ADDITIONAL_SECRET").unwrap_or_default());

/// When true, `Accounts.identity.create` is rejected with 403 "Signups forbidden".
pub static IDENTITY_FORBID_CLIENT_ACCOUNT_CREATION: LazyLock<bool> = LazyLock::new(|| {
    parse_bool_or(
        std::env::var("IDENTITY_FORBID_CLIENT_ACCOUNT_CREATION").ok(),
        false,
    )
});

/// How long connection-scoped login-method state is retained, in seconds.
pub static IDENTITY_CONNECTION_STATE_TTL: LazyLock<u64> = LazyLock::new(|| {
    parse_u64_or(
        std::env::var("IDENTITY_CONNECTION_STATE_TTL").ok(),
        DEFAULT_CONNECTION_STATE_TTL_SECS,
    )
});

/// Configuration handed to the server-side constructors.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityConfig {
    pub max_secret_age: Duration,
    pub additional_secret: String,
    pub forbid_client_account_creation: bool,
    pub connection_state_ttl: u64,
}

impl IdentityConfig {
    /// Snapshot of the environment-driven settings.
    pub fn from_env() -> Self {
        Self {
            max_secret_age: *IDENTITY_MAX_SECRET_AGE,
            additional_secret: IDENTITY_ADDITIONAL_SECRET.clone(),
            forbid_client_account_creation: *IDENTITY_FORBID_CLIENT_ACCOUNT_CREATION,
            connection_state_ttl: *IDENTITY_CONNECTION_STATE_TTL,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            max_secret_age: Duration::from_secs(DEFAULT_MAX_SECRET_AGE_SECS),
            additional_secret: String::new(),
            forbid_client_account_creation: false,
            connection_state_ttl: DEFAULT_CONNECTION_STATE_TTL_SECS,
        }
    }
}

fn parse_u64_or(value: Option<String>, default: u64) -> u64 {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool_or(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("TRUE") | Some("True") => true,
        Some("0") | Some("false") | Some("FALSE") | Some("False") => false,
        _ => default,
    }
}
