use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::utils::now_secs;

use super::errors::IdentityError;
use super::secrets::{Secret, SecretStore};
use super::types::{Identity, RESERVED_CLAIMS};

type HmacSha256 = Hmac<Sha256>;

const CLAIM_ISSUER: &str = "iss";
const CLAIM_SUBJECT: &str = "sub";
const CLAIM_ISSUED_AT: &str = "iat";
const CLAIM_KEY_ID: &str = "_keyId";

/// Signs identities with the current secret and verifies them against the
/// secret they name.
///
/// The token is an HS256 JWT with `iss = serviceName`, `sub = id`,
/// `iat = when` and `_keyId` plus every extra claim in its payload. The MAC key
/// is HMAC-SHA256(additional_secret, secret.key), so signers with different
/// additional secrets never accept each other's identities.
pub struct IdentitySigner {
    secrets: SecretStore,
    additional_secret: String,
}

impl IdentitySigner {
    pub fn new(secrets: SecretStore, additional_secret: impl Into<String>) -> Self {
        Self {
            secrets,
            additional_secret: additional_secret.into(),
        }
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    /// Return a signed copy of `identity` with `when`, `key_id` and
    /// `signature` filled in.
    #[tracing::instrument(skip(self, identity), fields(service_name = %identity.service_name))]
    pub async fn sign(&self, identity: &Identity) -> Result<Identity, IdentityError> {
        if identity.service_name.is_empty() {
            return Err(IdentityError::InvalidIdentity(
                "serviceName is required".to_string(),
            ));
        }
        if identity.id.is_empty() {
            return Err(IdentityError::InvalidIdentity("id is required".to_string()));
        }
        if let Some(name) = identity
            .extra
            .keys()
            .find(|name| RESERVED_CLAIMS.contains(&name.as_str()))
        {
            return Err(IdentityError::InvalidIdentity(format!(
                "claim name '{name}' is reserved"
            )));
        }

        let secret = self.secrets.get_current()?;
        let issued_at = now_secs();

        let mut claims = identity.extra.clone();
        claims.insert(CLAIM_KEY_ID.to_string(), Value::from(secret.id.clone()));
        claims.insert(
            CLAIM_ISSUER.to_string(),
            Value::from(identity.service_name.clone()),
        );
        claims.insert(CLAIM_SUBJECT.to_string(), Value::from(identity.id.clone()));
        claims.insert(CLAIM_ISSUED_AT.to_string(), Value::from(issued_at));

        let key = self.derive_key(&secret)?;
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&key),
        )?;

        tracing::debug!(key_id = %secret.id, "Signed identity");

        Ok(Identity {
            when: Some(issued_at),
            key_id: Some(secret.id),
            signature: Some(token),
            ..identity.clone()
        })
    }

    /// Check that `identity` was signed by this signer domain and that none of
    /// its fields changed since.
    ///
    /// Every failure is reported as [`IdentityError::VerificationFailed`]; the
    /// reason is only logged.
    pub async fn verify(&self, identity: &Identity) -> Result<(), IdentityError> {
        match self.check(identity).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    service_name = %identity.service_name,
                    error = %e,
                    "Identity verification failed"
                );
                Err(IdentityError::VerificationFailed)
            }
        }
    }

    async fn check(&self, identity: &Identity) -> Result<(), IdentityError> {
        let (Some(when), Some(key_id), Some(token)) = (
            identity.when,
            identity.key_id.as_deref(),
            identity.signature.as_deref(),
        ) else {
            return Err(IdentityError::InvalidIdentity(
                "when, keyId and signature are required".to_string(),
            ));
        };

        let secret = self.secrets.get_by_key_id(key_id).await?;
        let key = self.derive_key(&secret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&[CLAIM_ISSUER, CLAIM_SUBJECT]);
        validation.set_issuer(&[identity.service_name.as_str()]);

        let mut claims = jsonwebtoken::decode::<Map<String, Value>>(
            token,
            &DecodingKey::from_secret(&key),
            &validation,
        )?
        .claims;

        let issued_at = claims.remove(CLAIM_ISSUED_AT).and_then(|v| v.as_i64());
        if issued_at != Some(when) {
            return Err(IdentityError::ClaimMismatch(format!(
                "when mismatch: expected {when} got {issued_at:?}"
            )));
        }

        let subject = claims.remove(CLAIM_SUBJECT);
        if subject.as_ref().and_then(Value::as_str) != Some(identity.id.as_str()) {
            return Err(IdentityError::ClaimMismatch(format!(
                "subject mismatch: expected {} got {subject:?}",
                identity.id
            )));
        }

        let issuer = claims.remove(CLAIM_ISSUER);
        if issuer.as_ref().and_then(Value::as_str) != Some(identity.service_name.as_str()) {
            return Err(IdentityError::ClaimMismatch(format!(
                "issuer mismatch: expected {} got {issuer:?}",
                identity.service_name
            )));
        }

        let signed_key_id = claims.remove(CLAIM_KEY_ID);
        if signed_key_id.as_ref().and_then(Value::as_str) != Some(key_id) {
            return Err(IdentityError::ClaimMismatch(format!(
                "keyId mismatch: expected {key_id} got {signed_key_id:?}"
            )));
        }

        // What remains must be exactly the extra claims
        if claims != identity.extra {
            return Err(IdentityError::ClaimMismatch(format!(
                "other payload mismatch: expected {:?} got {:?}",
                identity.extra, claims
            )));
        }

        Ok(())
    }

    fn derive_key(&self, secret: &Secret) -> Result<Vec<u8>, IdentityError> {
        let mut mac = HmacSha256::new_from_slice(self.additional_secret.as_bytes())
            .map_err(|e| IdentityError::Token(format!("Invalid additional secret: {e}")))?;
        mac.update(secret.key.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
