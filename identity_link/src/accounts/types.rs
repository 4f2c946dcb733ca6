use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

use crate::identity::IdentityRef;

/// An account as stored by the accounts collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    /// The rest of the account document (profile, per-service data, ...).
    pub doc: Value,
    pub identities: Vec<IdentityRef>,
    /// Identities signed before this time (seconds) cannot log in. `None` when
    /// the account has never had an identity.
    pub not_signed_before: Option<i64>,
    /// Created only to carry an established identity. Such accounts cannot be
    /// logged in to directly.
    pub identity_only: bool,
    pub created_at: DateTime<Utc>,
}

/// An account about to be inserted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewAccount {
    pub username: Option<String>,
    pub email: Option<String>,
    pub doc: Value,
    pub identities: Vec<IdentityRef>,
    pub not_signed_before: Option<i64>,
    pub identity_only: bool,
}

impl NewAccount {
    /// Build an account from a client-supplied document. Top-level `username`
    /// and `email` strings become the uniquely indexed columns; everything else
    /// stays in the document.
    pub fn from_document(doc: Value) -> Self {
        let mut fields = match doc {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other);
                fields
            }
        };
        let username = take_string(&mut fields, "username");
        let email = take_string(&mut fields, "email");

        Self {
            username,
            email,
            doc: Value::Object(fields),
            ..Self::default()
        }
    }

    pub fn with_identity(mut self, identity: IdentityRef) -> Self {
        self.identities.push(identity);
        self
    }
}

fn take_string(fields: &mut Map<String, Value>, name: &str) -> Option<String> {
    match fields.remove(name) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            fields.insert(name.to_string(), other);
            None
        }
        None => None,
    }
}

#[derive(Debug, FromRow)]
pub(super) struct AccountRow {
    pub(super) id: String,
    pub(super) username: Option<String>,
    pub(super) email: Option<String>,
    pub(super) doc: String,
    pub(super) not_signed_before: Option<i64>,
    pub(super) identity_only: bool,
    pub(super) created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub(super) struct IdentityRow {
    pub(super) service_name: String,
    pub(super) identity_id: String,
}

impl AccountRow {
    pub(super) fn into_account(
        self,
        identities: Vec<IdentityRow>,
    ) -> Result<Account, serde_json::Error> {
        Ok(Account {
            id: self.id,
            username: self.username,
            email: self.email,
            doc: serde_json::from_str(&self.doc)?,
            identities: identities
                .into_iter()
                .map(|row| IdentityRef::new(row.service_name, row.identity_id))
                .collect(),
            not_signed_before: self.not_signed_before,
            identity_only: self.identity_only,
            created_at: self.created_at,
        })
    }
}
