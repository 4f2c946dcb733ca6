//! Login-method bridge: turns any login method into an identity service.
//!
//! The client sets a connection-scoped establishing flag on the server and
//! runs the login. While the flag is set, the server's validation hooks sign a
//! `loginMethod` identity for the account instead of logging in, stash it on
//! the connection and fail the login with the identity-established error. The
//! client then fetches the identity and completes the pending attempt.

mod client;
mod server;
mod types;

pub use client::LoginMethodClient;
pub use server::LoginMethodServer;
pub use types::{
    ESTABLISHING_STATE_PREFIX, LOGIN_METHOD_SERVICE_NAME, LoginAttempt, ValidationOutcome,
};
