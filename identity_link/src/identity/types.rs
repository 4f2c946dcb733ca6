use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claim names that carry the identity's own fields inside a signed token, or
/// that are the wire names of its fields. Extra claims may not use them.
pub const RESERVED_CLAIMS: [&str; 9] = [
    "serviceName",
    "id",
    "when",
    "keyId",
    "signature",
    "iss",
    "sub",
    "iat",
    "_keyId",
];

/// A service's assertion that an external principal is who they claim to be.
///
/// Providers build an unsigned identity from `service_name`, `id` and any extra
/// claims. Signing fills in `when`, `key_id` and `signature`; after that the
/// value is only ever read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub service_name: String,
    pub id: String,
    /// Seconds since the epoch at which the identity was signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identity {
    pub fn new(service_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            id: id.into(),
            when: None,
            key_id: None,
            signature: None,
            extra: Map::new(),
        }
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    pub fn is_signed(&self) -> bool {
        self.when.is_some() && self.key_id.is_some() && self.signature.is_some()
    }

    pub fn to_ref(&self) -> IdentityRef {
        IdentityRef {
            service_name: self.service_name.clone(),
            id: self.id.clone(),
        }
    }
}

/// The `{serviceName, id}` pair under which an identity is linked to an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    pub service_name: String,
    pub id: String,
}

impl IdentityRef {
    pub fn new(service_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            id: id.into(),
        }
    }
}

impl From<&Identity> for IdentityRef {
    fn from(identity: &Identity) -> Self {
        identity.to_ref()
    }
}
