use async_trait::async_trait;
use serde_json::Value;

use super::errors::RpcError;

/// Calls a named remote procedure with positional arguments.
///
/// The server side of a transport keeps a connection-scoped slot that hooks
/// invoked during the call can read and write.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError>;
}
