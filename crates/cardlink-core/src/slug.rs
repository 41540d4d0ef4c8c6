//! Slug registry. Derives public slugs, maps them to accounts, and resolves
//! them back.
//!
//! Registration writes the account's slug fields and then the mapping; the
//! two writes are not transactional. A failure between them leaves an account
//! pointing at an unmapped slug, which [`SlugRegistry::resolve`] reports as
//! not found rather than repairing.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result, account::Account, mapping::SlugMapping, store::ProfileStore,
};

/// Number of account-id characters appended to every slug.
pub const ID_SUFFIX_LEN: usize = 6;

// ─── Derivation ──────────────────────────────────────────────────────────────

/// Derive the slug for `display_name` owned by `account_id`.
///
/// Lower-cases, drops everything outside `[a-z0-9\s-]`, turns whitespace runs
/// into single hyphens, collapses hyphen runs, trims edge hyphens, then
/// appends `-` and the first six characters of the account id. A name with
/// nothing left after filtering yields just the id prefix.
pub fn generate_slug(display_name: &str, account_id: &str) -> String {
  let lowered = display_name.to_lowercase();

  let mut base = String::with_capacity(lowered.len());
  let mut pending_hyphen = false;
  for c in lowered.chars() {
    if c.is_whitespace() || c == '-' {
      pending_hyphen = true;
    } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
      if pending_hyphen && !base.is_empty() {
        base.push('-');
      }
      pending_hyphen = false;
      base.push(c);
    }
  }

  let suffix: String = account_id.chars().take(ID_SUFFIX_LEN).collect();
  if base.is_empty() {
    suffix
  } else {
    format!("{base}-{suffix}")
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Returned by [`SlugRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugRegistration {
  pub slug:       String,
  pub public_url: String,
}

pub struct SlugRegistry<S> {
  store:           Arc<S>,
  public_base_url: String,
}

impl<S> Clone for SlugRegistry<S> {
  fn clone(&self) -> Self {
    Self {
      store:           Arc::clone(&self.store),
      public_base_url: self.public_base_url.clone(),
    }
  }
}

impl<S: ProfileStore> SlugRegistry<S> {
  pub fn new(store: Arc<S>, public_base_url: impl Into<String>) -> Self {
    Self { store, public_base_url: public_base_url.into() }
  }

  pub fn public_url(&self, slug: &str) -> String {
    format!("{}/{slug}", self.public_base_url.trim_end_matches('/'))
  }

  /// Derive and store the slug for `account_id`.
  ///
  /// Fails with [`Error::SlugTaken`] if the derived slug is actively mapped
  /// to a different account. Re-registering the same account is idempotent;
  /// a previous, different slug for the account is deactivated.
  pub async fn register(&self, account_id: Uuid) -> Result<SlugRegistration> {
    let account = self
      .store
      .get_account(account_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::AccountNotFound(account_id))?;

    let display_name = account
      .display_name()
      .ok_or_else(|| {
        Error::Validation(format!("account {account_id} has no display name"))
      })?
      .to_owned();

    let slug = generate_slug(&display_name, &account_id.to_string());

    if let Some(existing) = self
      .store
      .get_slug_mapping(&slug)
      .await
      .map_err(Error::store)?
      && existing.is_active
      && existing.account_id != account_id
    {
      return Err(Error::SlugTaken(slug));
    }

    let public_url = self.public_url(&slug);

    let updated = self
      .store
      .set_account_slug(account_id, slug.clone(), public_url.clone())
      .await
      .map_err(Error::store)?;
    if !updated {
      return Err(Error::AccountNotFound(account_id));
    }

    self
      .store
      .put_slug_mapping(SlugMapping {
        slug: slug.clone(),
        account_id,
        display_name,
        is_active: true,
        created_at: Utc::now(),
      })
      .await
      .map_err(Error::store)?;

    if let Some(previous) = account.url_slug.as_deref()
      && previous != slug
    {
      self.store.deactivate_slug(previous).await.map_err(Error::store)?;
      info!(%account_id, previous, "deactivated superseded slug");
    }

    info!(%account_id, %slug, "registered slug");
    Ok(SlugRegistration { slug, public_url })
  }

  /// Resolve an active slug to its account.
  pub async fn resolve(&self, slug: &str) -> Result<Account> {
    let mapping = self
      .store
      .get_slug_mapping(slug)
      .await
      .map_err(Error::store)?
      .filter(|m| m.is_active)
      .ok_or_else(|| Error::SlugNotFound(slug.to_owned()))?;

    match self
      .store
      .get_account(mapping.account_id)
      .await
      .map_err(Error::store)?
    {
      Some(account) => Ok(account),
      None => {
        warn!(slug, account_id = %mapping.account_id, "slug maps to a missing account");
        Err(Error::AccountNotFound(mapping.account_id))
      }
    }
  }

  /// Deactivate a mapping on behalf of `owner`, who must be the account it
  /// points at. The document is kept.
  pub async fn deactivate(&self, slug: &str, owner: Uuid) -> Result<()> {
    let mapping = self
      .store
      .get_slug_mapping(slug)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::SlugNotFound(slug.to_owned()))?;
    if mapping.account_id != owner {
      return Err(Error::NotSlugOwner { account_id: owner, slug: slug.to_owned() });
    }

    if self.store.deactivate_slug(slug).await.map_err(Error::store)? {
      info!(slug, "deactivated slug");
      Ok(())
    } else {
      Err(Error::SlugNotFound(slug.to_owned()))
    }
  }
}
