use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use gateway_core_types::{ConsentId, OrganizationId, SharedClock};
use gateway_policy_center::{PaginationPolicy, MAX_KEY_TTL_MINUTES};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::PaginationError;

type HmacSha256 = Hmac<Sha256>;

/// Request attributes a key is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBinding {
    pub consent_id: ConsentId,
    pub organization_id: OrganizationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

/// Decoded key contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyClaims {
    #[serde(flatten)]
    pub binding: KeyBinding,
    pub issued_at: DateTime<Utc>,
    pub nonce: String,
}

struct KeyState {
    secret: Vec<u8>,
    ttl: Duration,
}

/// Issues and verifies stateless continuation keys.
///
/// A key is `base64url(claims).base64url(hmac_sha256(secret, claims))`.
pub struct PaginationKeyManager {
    state: RwLock<KeyState>,
    clock: SharedClock,
}

impl PaginationKeyManager {
    pub fn new(policy: &PaginationPolicy, clock: SharedClock) -> Self {
        let secret = match &policy.signing_secret {
            Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
            _ => {
                warn!(
                    target: "pagination-keys",
                    "no signing secret configured, keys will not survive a restart"
                );
                random_secret()
            }
        };
        Self {
            state: RwLock::new(KeyState {
                secret,
                ttl: ttl_from(policy),
            }),
            clock,
        }
    }

    pub fn with_secret(secret: impl AsRef<[u8]>, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            state: RwLock::new(KeyState {
                secret: secret.as_ref().to_vec(),
                ttl,
            }),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.state.read().ttl
    }

    /// Applies a new TTL; a changed configured secret rotates the signing key.
    pub fn update_policy(&self, policy: &PaginationPolicy) {
        let mut state = self.state.write();
        state.ttl = ttl_from(policy);
        if let Some(secret) = policy.signing_secret.as_deref().filter(|s| !s.is_empty()) {
            if state.secret.as_slice() != secret.as_bytes() {
                debug!(target: "pagination-keys", "rotating signing secret");
                state.secret = secret.as_bytes().to_vec();
            }
        }
    }

    pub fn issue(&self, binding: KeyBinding) -> Result<String, PaginationError> {
        let claims = KeyClaims {
            binding,
            issued_at: self.clock.now(),
            nonce: Uuid::new_v4().simple().to_string(),
        };
        let payload =
            serde_json::to_vec(&claims).map_err(|err| PaginationError::Encode(err.to_string()))?;
        let signature = self.sign(&payload)?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Structure, signature and TTL check.
    pub fn validate(&self, key: &str) -> bool {
        self.decode(key).is_ok()
    }

    pub fn decode(&self, key: &str) -> Result<KeyClaims, PaginationError> {
        let (payload_part, signature_part) =
            key.trim().split_once('.').ok_or(PaginationError::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| PaginationError::Malformed)?;
        let provided = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|_| PaginationError::Malformed)?;

        let expected = self.sign(&payload)?;
        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return Err(PaginationError::BadSignature);
        }

        let claims: KeyClaims =
            serde_json::from_slice(&payload).map_err(|_| PaginationError::Malformed)?;
        if self.clock.now() - claims.issued_at > self.ttl() {
            return Err(PaginationError::Expired);
        }
        Ok(claims)
    }

    /// Full check for a continuation request described by `scope`.
    ///
    /// The key must carry the same consent, organisation, account, account type
    /// and page size, and `scope.page` must come after the page it was issued on.
    pub fn validate_for(&self, key: &str, scope: &KeyBinding) -> Result<KeyClaims, PaginationError> {
        let claims = self.decode(key)?;
        let bound = &claims.binding;
        if bound.consent_id != scope.consent_id {
            return Err(PaginationError::ScopeMismatch("consent"));
        }
        if bound.organization_id != scope.organization_id {
            return Err(PaginationError::ScopeMismatch("organisation"));
        }
        if bound.account_id != scope.account_id {
            return Err(PaginationError::ScopeMismatch("account"));
        }
        if bound.account_type != scope.account_type {
            return Err(PaginationError::ScopeMismatch("account type"));
        }
        if bound.page_size != scope.page_size {
            return Err(PaginationError::ScopeMismatch("page size"));
        }
        if scope.page <= bound.page {
            return Err(PaginationError::ScopeMismatch("page"));
        }
        Ok(claims)
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, PaginationError> {
        let state = self.state.read();
        let mut mac = HmacSha256::new_from_slice(&state.secret)
            .map_err(|err| PaginationError::Encode(err.to_string()))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Hand-built snapshots skip path validation; the lifetime is clamped to the same range.
fn ttl_from(policy: &PaginationPolicy) -> Duration {
    let minutes = policy.key_ttl_minutes.clamp(1, MAX_KEY_TTL_MINUTES);
    Duration::minutes(i64::try_from(minutes).unwrap_or(60))
}

fn random_secret() -> Vec<u8> {
    let mut secret = Vec::with_capacity(32);
    secret.extend_from_slice(Uuid::new_v4().as_bytes());
    secret.extend_from_slice(Uuid::new_v4().as_bytes());
    secret
}
