//! Signed compact tokens.
//!
//! A token is `base64url(json payload) "." base64url(HMAC-SHA256(key,
//! payload))`. The same envelope carries session tokens issued to linked
//! accounts and identity assertions minted by the upstream identity gateway;
//! each uses its own key.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::Sha256;
use uuid::Uuid;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted key length in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// The only role sessions are issued for.
pub const USER_ROLE: &str = "user";

/// Fixed absolute session lifetime; there is no refresh.
pub const DEFAULT_SESSION_TTL: TimeDelta = TimeDelta::days(7);

// ─── Signer ──────────────────────────────────────────────────────────────────

/// Why a sealed envelope could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
  #[error("malformed token")]
  Malformed,
  #[error("bad signature")]
  BadSignature,
  #[error("unreadable payload")]
  Payload,
}

#[derive(Clone)]
pub struct Signer {
  mac: HmacSha256,
}

impl std::fmt::Debug for Signer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Signer").finish_non_exhaustive()
  }
}

impl Signer {
  pub fn new(key: impl Into<Vec<u8>>) -> Result<Self> {
    let key = key.into();
    if key.len() < MIN_KEY_LEN {
      return Err(Error::Validation(format!(
        "signing key must be at least {MIN_KEY_LEN} bytes, got {}",
        key.len()
      )));
    }
    let mac = <HmacSha256 as Mac>::new_from_slice(&key)
      .map_err(|e| Error::Validation(format!("unusable signing key: {e}")))?;
    Ok(Self { mac })
  }

  /// Parse a hex-encoded key, as stored in configuration.
  pub fn from_hex(hex_key: &str) -> Result<Self> {
    let key = hex::decode(hex_key.trim())
      .map_err(|e| Error::Validation(format!("signing key is not hex: {e}")))?;
    Self::new(key)
  }

  fn mac(&self) -> HmacSha256 { self.mac.clone() }

  pub fn seal<T: Serialize>(&self, payload: &T) -> Result<String> {
    let body = B64.encode(serde_json::to_vec(payload)?);
    let mut mac = self.mac();
    mac.update(body.as_bytes());
    let sig = B64.encode(mac.finalize().into_bytes());
    Ok(format!("{body}.{sig}"))
  }

  /// Verify the signature in constant time, then decode the payload.
  pub fn open<T: DeserializeOwned>(
    &self,
    token: &str,
  ) -> std::result::Result<T, OpenError> {
    let (body, sig) = token.split_once('.').ok_or(OpenError::Malformed)?;
    let sig = B64.decode(sig).map_err(|_| OpenError::Malformed)?;

    let mut mac = self.mac();
    mac.update(body.as_bytes());
    mac.verify_slice(&sig).map_err(|_| OpenError::BadSignature)?;

    let bytes = B64.decode(body).map_err(|_| OpenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| OpenError::Payload)
  }
}

// ─── Session tokens ──────────────────────────────────────────────────────────

/// What a verified session token asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
  pub account_id:   Uuid,
  pub email:        String,
  pub role:         String,
  pub issued_at_ms: i64,
}

/// Issues and verifies session tokens for linked accounts. Verification
/// needs no store round trip.
#[derive(Debug, Clone)]
pub struct SessionTokens {
  signer: Signer,
  ttl:    TimeDelta,
}

impl SessionTokens {
  pub fn new(signer: Signer) -> Self {
    Self { signer, ttl: DEFAULT_SESSION_TTL }
  }

  pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn issue(&self, account_id: Uuid, email: &str) -> Result<String> {
    self.issue_at(account_id, email, Utc::now())
  }

  pub fn issue_at(
    &self,
    account_id: Uuid,
    email: &str,
    now: DateTime<Utc>,
  ) -> Result<String> {
    self.signer.seal(&SessionClaims {
      account_id,
      email: email.to_owned(),
      role: USER_ROLE.to_owned(),
      issued_at_ms: now.timestamp_millis(),
    })
  }

  pub fn verify(&self, token: &str) -> Result<SessionClaims> {
    self.verify_at(token, Utc::now())
  }

  pub fn verify_at(
    &self,
    token: &str,
    now: DateTime<Utc>,
  ) -> Result<SessionClaims> {
    let claims: SessionClaims = self
      .signer
      .open(token)
      .map_err(|e| Error::InvalidToken(e.to_string()))?;

    if claims.role != USER_ROLE {
      return Err(Error::InvalidToken(format!(
        "unexpected role {:?}",
        claims.role
      )));
    }

    let age_ms = now.timestamp_millis() - claims.issued_at_ms;
    if age_ms > self.ttl.num_milliseconds() {
      return Err(Error::TokenExpired);
    }

    Ok(claims)
  }
}
