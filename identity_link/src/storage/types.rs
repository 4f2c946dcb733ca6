use serde::{Deserialize, Serialize};

/// Data stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheData {
    pub value: String,
}

impl CacheData {
    /// Serialize any value as the JSON payload of a cache entry.
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            value: serde_json::to_string(value)?,
        })
    }

    pub fn to_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.value)
    }
}
