use serde_json::{Value, json};
use std::sync::Arc;

use crate::identity::{Identity, IdentityError, IdentityRef};
use crate::rpc::{
    ACCOUNTS_IDENTITY_ADD_IDENTITY, ACCOUNTS_IDENTITY_CREATE, ACCOUNTS_IDENTITY_GET_IDENTITIES,
    ACCOUNTS_IDENTITY_REMOVE_IDENTITY, LOGIN, LOGOUT, RpcError, RpcTransport,
};

/// Client half of accounts-identity. Each call is a single RPC.
#[derive(Clone)]
pub struct AccountsIdentityClient {
    transport: Arc<dyn RpcTransport>,
}

impl AccountsIdentityClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    /// Create an account for `identity` and log in to it. Returns the user id.
    pub async fn create(
        &self,
        identity: &Identity,
        account_doc: Value,
    ) -> Result<String, IdentityError> {
        require_signed_fields(identity)?;
        let result = self
            .transport
            .call(
                ACCOUNTS_IDENTITY_CREATE,
                vec![to_value(identity)?, account_doc],
            )
            .await?;
        user_id_from(result)
    }

    /// Log in to the account linked to `identity`. Returns the user id.
    pub async fn login(&self, identity: &Identity) -> Result<String, IdentityError> {
        require_signed_fields(identity)?;
        let result = self
            .transport
            .call(LOGIN, vec![json!({ "identity": to_value(identity)? })])
            .await?;
        user_id_from(result)
    }

    pub async fn add_identity(&self, identity: &Identity) -> Result<(), IdentityError> {
        require_signed_fields(identity)?;
        self.transport
            .call(ACCOUNTS_IDENTITY_ADD_IDENTITY, vec![to_value(identity)?])
            .await?;
        Ok(())
    }

    pub async fn remove_identity(&self, identity: &IdentityRef) -> Result<(), IdentityError> {
        let identity = serde_json::to_value(identity)
            .map_err(|e| IdentityError::InvalidIdentity(e.to_string()))?;
        self.transport
            .call(ACCOUNTS_IDENTITY_REMOVE_IDENTITY, vec![identity])
            .await?;
        Ok(())
    }

    /// The identities linked to the logged-in account.
    pub async fn get_identities(&self) -> Result<Vec<IdentityRef>, IdentityError> {
        let result = self
            .transport
            .call(ACCOUNTS_IDENTITY_GET_IDENTITIES, vec![])
            .await?;
        serde_json::from_value(result).map_err(|e| {
            IdentityError::Rpc(RpcError::bad_request(format!("Malformed identity list: {e}")))
        })
    }

    pub async fn logout(&self) -> Result<(), IdentityError> {
        self.transport.call(LOGOUT, vec![]).await?;
        Ok(())
    }
}

fn require_signed_fields(identity: &Identity) -> Result<(), IdentityError> {
    if identity.when.is_none() || identity.service_name.is_empty() || identity.id.is_empty() {
        return Err(IdentityError::InvalidIdentity(
            "when, serviceName and id are required".to_string(),
        ));
    }
    Ok(())
}

fn to_value(identity: &Identity) -> Result<Value, IdentityError> {
    serde_json::to_value(identity).map_err(|e| IdentityError::InvalidIdentity(e.to_string()))
}

fn user_id_from(result: Value) -> Result<String, IdentityError> {
    result
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            IdentityError::Rpc(RpcError::bad_request("Login result carries no user id"))
        })
}
