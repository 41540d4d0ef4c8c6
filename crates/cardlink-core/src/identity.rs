//! Identity linker: binds one external identity to exactly one account and
//! turns a verified identity back into a session.
//!
//! The one-to-one invariant is enforced by [`ProfileStore::link_identity`],
//! a single conditional write. The reads performed beforehand only exist to
//! give callers a precise error; they do not guard anything.

use std::{future::Future, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  account::AccountProfile,
  mapping::{IdentityMapping, LinkOutcome},
  store::ProfileStore,
  token::{SessionClaims, SessionTokens, Signer},
};

// ─── Proof verification ──────────────────────────────────────────────────────

/// An identity that an [`IdentityVerifier`] has vouched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
  pub external_id: String,
  pub email:       Option<String>,
}

/// Turns an opaque proof into a verified identity.
///
/// Token issuance and verification belong to the identity provider; this
/// crate only consumes the result.
pub trait IdentityVerifier: Send + Sync {
  /// Fails with [`Error::InvalidProof`] if the proof is not acceptable.
  fn verify<'a>(
    &'a self,
    proof: &'a str,
  ) -> impl Future<Output = Result<VerifiedIdentity>> + Send + 'a;
}

/// The payload of an assertion minted by the upstream identity gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAssertion {
  pub external_id:  String,
  pub email:        Option<String>,
  pub issued_at_ms: i64,
}

/// Accepts assertions signed with the secret shared with the identity
/// gateway.
#[derive(Debug, Clone)]
pub struct SignedAssertionVerifier {
  signer:  Signer,
  max_age: TimeDelta,
}

impl SignedAssertionVerifier {
  pub const DEFAULT_MAX_AGE: TimeDelta = TimeDelta::minutes(10);

  pub fn new(signer: Signer) -> Self {
    Self { signer, max_age: Self::DEFAULT_MAX_AGE }
  }

  /// Mint an assertion; used by the gateway side and by tests.
  pub fn mint(
    &self,
    external_id: &str,
    email: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<String> {
    self.signer.seal(&IdentityAssertion {
      external_id:  external_id.to_owned(),
      email:        email.map(str::to_owned),
      issued_at_ms: now.timestamp_millis(),
    })
  }

  pub fn verify_at(
    &self,
    proof: &str,
    now: DateTime<Utc>,
  ) -> Result<VerifiedIdentity> {
    let assertion: IdentityAssertion = self
      .signer
      .open(proof)
      .map_err(|e| Error::InvalidProof(e.to_string()))?;

    if now.timestamp_millis() - assertion.issued_at_ms
      > self.max_age.num_milliseconds()
    {
      return Err(Error::InvalidProof("assertion expired".into()));
    }
    if assertion.external_id.is_empty() {
      return Err(Error::InvalidProof("assertion has no subject".into()));
    }

    Ok(VerifiedIdentity {
      external_id: assertion.external_id,
      email:       assertion.email,
    })
  }
}

impl IdentityVerifier for SignedAssertionVerifier {
  async fn verify(&self, proof: &str) -> Result<VerifiedIdentity> {
    self.verify_at(proof, Utc::now())
  }
}

// ─── Requests and results ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LinkRequest {
  pub account_id:  Uuid,
  /// The slug from the registration link; must match the account's slug.
  pub slug:        String,
  pub external_id: String,
  pub email:       String,
  pub proof:       String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkResult {
  pub account_id: Uuid,
  pub linked:     bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
  pub token:   String,
  pub account: AccountProfile,
}

// ─── Linker ──────────────────────────────────────────────────────────────────

pub struct IdentityLinker<S, V> {
  store:    Arc<S>,
  verifier: Arc<V>,
  tokens:   SessionTokens,
}

impl<S, V> Clone for IdentityLinker<S, V> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      verifier: Arc::clone(&self.verifier),
      tokens:   self.tokens.clone(),
    }
  }
}

impl<S, V> IdentityLinker<S, V>
where
  S: ProfileStore,
  V: IdentityVerifier,
{
  pub fn new(store: Arc<S>, verifier: Arc<V>, tokens: SessionTokens) -> Self {
    Self { store, verifier, tokens }
  }

  /// Bind `req.external_id` to `req.account_id`.
  ///
  /// Succeeds at most once per external identity and at most once per
  /// account, however many attempts race.
  pub async fn link(&self, req: LinkRequest) -> Result<LinkResult> {
    let identity = self.verifier.verify(&req.proof).await?;
    if identity.external_id != req.external_id {
      return Err(Error::InvalidProof(
        "proof was issued for a different identity".into(),
      ));
    }

    let account = self
      .store
      .get_account(req.account_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::AccountNotFound(req.account_id))?;

    if account.url_slug.as_deref() != Some(req.slug.as_str()) {
      return Err(Error::SlugMismatch {
        account_id: req.account_id,
        given:      req.slug,
      });
    }
    if account.google_uid.is_some() {
      return Err(Error::AlreadyLinked(req.account_id));
    }
    if let Some(holder) = self
      .store
      .find_account_by_external_id(&req.external_id)
      .await
      .map_err(Error::store)?
      && holder.account_id != req.account_id
    {
      return Err(Error::IdentityTaken(req.external_id));
    }

    let outcome = self
      .store
      .link_identity(IdentityMapping {
        external_id: req.external_id.clone(),
        account_id:  req.account_id,
        email:       req.email,
        linked_at:   Utc::now(),
      })
      .await
      .map_err(Error::store)?;

    match outcome {
      LinkOutcome::Linked => {
        info!(account_id = %req.account_id, external_id = %req.external_id, "linked identity");
        Ok(LinkResult { account_id: req.account_id, linked: true })
      }
      LinkOutcome::IdentityTaken => Err(Error::IdentityTaken(req.external_id)),
      LinkOutcome::AccountAlreadyLinked => {
        Err(Error::AlreadyLinked(req.account_id))
      }
      LinkOutcome::AccountNotFound => {
        Err(Error::AccountNotFound(req.account_id))
      }
    }
  }

  /// Exchange a proof for a session token.
  pub async fn login(&self, proof: &str) -> Result<LoginResult> {
    let identity = self.verifier.verify(proof).await?;

    let mapping = self
      .store
      .get_identity_mapping(&identity.external_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::IdentityNotRegistered(identity.external_id.clone()))?;

    let account = self
      .store
      .get_account(mapping.account_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::AccountNotFound(mapping.account_id))?;

    if account.google_uid.as_deref() != Some(identity.external_id.as_str()) {
      return Err(Error::LinkSuperseded(account.account_id));
    }

    let now = Utc::now();
    if !self
      .store
      .touch_login(account.account_id, now)
      .await
      .map_err(Error::store)?
    {
      return Err(Error::AccountNotFound(account.account_id));
    }

    let email = account
      .google_email
      .clone()
      .or_else(|| account.email.clone())
      .unwrap_or(mapping.email);
    let token = self.tokens.issue_at(account.account_id, &email, now)?;

    info!(account_id = %account.account_id, "login");
    Ok(LoginResult { token, account: account.profile() })
  }

  pub fn issue_token(&self, account_id: Uuid, email: &str) -> Result<String> {
    self.tokens.issue(account_id, email)
  }

  pub fn verify_token(&self, token: &str) -> Result<SessionClaims> {
    self.tokens.verify(token)
  }
}
