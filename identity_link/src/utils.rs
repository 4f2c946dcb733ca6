use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use ring::rand::SecureRandom;
use std::time::Duration;
use thiserror::Error;

pub(crate) fn base64url_encode(input: Vec<u8>) -> Result<String, UtilError> {
    Ok(URL_SAFE_NO_PAD.encode(input))
}

/// Generate `len` random bytes from the system CSPRNG, base64url encoded.
pub fn gen_random_string(len: usize) -> Result<String, UtilError> {
    let rng = ring::rand::SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| UtilError::Crypto("Failed to generate random string".to_string()))?;
    let encoded = base64url_encode(bytes)
        .map_err(|_| UtilError::Crypto("Failed to encode random string".to_string()))?;
    Ok(encoded)
}

/// A uniformly distributed delay in `[0, max)`.
pub(crate) fn random_jitter(max: Duration) -> Result<Duration, UtilError> {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Ok(Duration::ZERO);
    }
    let rng = ring::rand::SystemRandom::new();
    let mut buf = [0u8; 8];
    rng.fill(&mut buf)
        .map_err(|_| UtilError::Crypto("Failed to generate jitter".to_string()))?;
    Ok(Duration::from_millis(u64::from_le_bytes(buf) % max_ms))
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn now_secs() -> i64 {
    Utc::now().timestamp()
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UtilError {
    #[error("Crypto error: {0}")]
    Crypto(String),
}
