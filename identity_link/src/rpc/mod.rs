//! The remote-procedure surface: wire errors, method names, the transport
//! trait, the server-side handlers and an in-process server.

mod errors;
mod handlers;
pub mod local;
mod methods;
mod transport;

pub use errors::{
    ACCOUNT_NOT_FOUND, DUPLICATE_ACCOUNT, ErrorCode, IDENTITY_ESTABLISHED, NOT_LOGGED_IN,
    RpcError,
};
pub use handlers::{IdentityRpcHandlers, LoginHandler, RpcSession};
pub use methods::*;
pub use transport::RpcTransport;
