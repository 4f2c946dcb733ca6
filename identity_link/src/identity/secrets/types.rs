use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A symmetric signing secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub id: String,
    /// Milliseconds since the epoch.
    pub created_at_ms: i64,
    pub key: String,
}

impl Secret {
    pub(crate) fn expires_at_ms(&self, max_age_ms: i64) -> i64 {
        self.created_at_ms.saturating_add(max_age_ms)
    }

    pub(crate) fn half_life_at_ms(&self, max_age_ms: i64) -> i64 {
        self.created_at_ms.saturating_add(max_age_ms / 2)
    }
}
