//! An in-process RPC server. Each [`LocalConnection`] is a client transport
//! with its own server-side session, so several simulated clients can share
//! one server.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use super::errors::RpcError;
use super::handlers::{IdentityRpcHandlers, RpcSession};
use super::transport::RpcTransport;

/// An application-defined method served next to the identity RPCs.
#[async_trait]
pub trait LocalMethod: Send + Sync {
    async fn call(
        &self,
        handlers: &IdentityRpcHandlers,
        session: &mut RpcSession,
        args: Vec<Value>,
    ) -> Result<Value, RpcError>;
}

pub struct LocalServer {
    handlers: Arc<IdentityRpcHandlers>,
    methods: RwLock<HashMap<String, Arc<dyn LocalMethod>>>,
}

impl LocalServer {
    pub fn new(handlers: Arc<IdentityRpcHandlers>) -> Arc<Self> {
        Arc::new(Self {
            handlers,
            methods: RwLock::new(HashMap::new()),
        })
    }

    pub fn handlers(&self) -> &Arc<IdentityRpcHandlers> {
        &self.handlers
    }

    /// Serve `method` under `name`, replacing any method of the same name.
    pub fn register_method(&self, name: &str, method: Arc<dyn LocalMethod>) {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), method);
    }

    /// Open a new connection with a fresh, logged-out session.
    pub fn connect(self: &Arc<Self>) -> LocalConnection {
        let connection_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(%connection_id, "Connection opened");
        LocalConnection {
            server: self.clone(),
            connection_id: connection_id.clone(),
            session: Mutex::new(RpcSession::new(connection_id)),
        }
    }

    fn method(&self, name: &str) -> Option<Arc<dyn LocalMethod>> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// Calls on one connection run one at a time, in order.
pub struct LocalConnection {
    server: Arc<LocalServer>,
    connection_id: String,
    session: Mutex<RpcSession>,
}

impl LocalConnection {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// The user this connection is logged in as.
    pub async fn user_id(&self) -> Option<String> {
        self.session.lock().await.user_id.clone()
    }

    pub async fn close(&self) -> Result<(), RpcError> {
        let session = self.session.lock().await;
        tracing::debug!(connection_id = %self.connection_id, "Connection closed");
        self.server.handlers.connection_closed(&session).await
    }
}

#[async_trait]
impl RpcTransport for LocalConnection {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        let mut session = self.session.lock().await;

        if let Some(result) = self
            .server
            .handlers
            .dispatch(&mut session, method, &args)
            .await
        {
            return result;
        }

        match self.server.method(method) {
            Some(custom) => custom.call(&self.server.handlers, &mut session, args).await,
            None => Err(RpcError::status(404, format!("Method '{method}' not found"))),
        }
    }
}
