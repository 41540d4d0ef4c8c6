//! Lookup documents keyed by something other than the account id.
//!
//! Slug mappings are never hard-deleted; a superseded slug is deactivated.
//! Identity mappings are created once and never change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Slugs ───────────────────────────────────────────────────────────────────

/// Resolves a public slug to the account it was generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugMapping {
  pub slug:         String,
  pub account_id:   Uuid,
  /// Denormalised copy of the account's display name at registration time.
  pub display_name: String,
  pub is_active:    bool,
  pub created_at:   DateTime<Utc>,
}

// ─── External identities ─────────────────────────────────────────────────────

/// Binds one external identity to exactly one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMapping {
  pub external_id: String,
  pub account_id:  Uuid,
  pub email:       String,
  pub linked_at:   DateTime<Utc>,
}

/// Input to [`crate::store::ProfileStore::link_identity`].
///
/// The store must create the mapping and write the account's identity fields
/// as a single conditional unit: the mapping must not exist yet and the
/// account must not hold an identity yet.
pub type IdentityLink = IdentityMapping;

/// Result of a conditional identity link attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
  Linked,
  /// A mapping for this external id already exists.
  IdentityTaken,
  /// The target account already holds an external identity.
  AccountAlreadyLinked,
  AccountNotFound,
}
