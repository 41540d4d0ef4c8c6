//! Account, the root entity of cardlink.
//!
//! An account is the profile owner's record. Its slug fields are written by
//! the slug registry, its identity fields by the identity linker, and its
//! counters by the engagement tracker. Everything else is written by
//! collaborators outside this workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Account ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
  pub account_id:          Uuid,
  pub display_name:        Option<String>,
  pub email:               Option<String>,
  pub phone:               Option<String>,
  pub company:             Option<String>,
  pub job_title:           Option<String>,
  pub url_slug:            Option<String>,
  pub public_url:          Option<String>,
  /// External identity bound to this account; at most one, set once.
  pub google_uid:          Option<String>,
  pub google_email:        Option<String>,
  pub total_views:         u64,
  pub total_contact_saves: u64,
  pub created_at:          DateTime<Utc>,
  pub updated_at:          DateTime<Utc>,
  pub last_viewed_at:      Option<DateTime<Utc>>,
  pub last_login_at:       Option<DateTime<Utc>>,
}

impl Account {
  /// The trimmed display name, if one is set and non-blank.
  pub fn display_name(&self) -> Option<&str> {
    non_blank(self.display_name.as_deref())
  }

  /// True when the profile carries a name, an email and a phone number.
  pub fn is_complete(&self) -> bool {
    self.display_name().is_some()
      && non_blank(self.email.as_deref()).is_some()
      && non_blank(self.phone.as_deref()).is_some()
  }

  pub fn profile(&self) -> AccountProfile { AccountProfile::from(self) }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
  s.map(str::trim).filter(|s| !s.is_empty())
}

// ─── NewAccount ──────────────────────────────────────────────────────────────

/// Input to [`crate::store::ProfileStore::create_account`].
///
/// `created_at` is normally assigned by the store; it may be supplied when
/// importing records that already exist elsewhere.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
  pub display_name: Option<String>,
  pub email:        Option<String>,
  pub phone:        Option<String>,
  pub company:      Option<String>,
  pub job_title:    Option<String>,
  pub created_at:   Option<DateTime<Utc>>,
}

impl NewAccount {
  pub fn named(display_name: impl Into<String>) -> Self {
    Self { display_name: Some(display_name.into()), ..Default::default() }
  }
}

// ─── Public view ─────────────────────────────────────────────────────────────

/// The fields of an account that may be shown to anyone holding its slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
  pub account_id:          Uuid,
  pub display_name:        Option<String>,
  pub email:               Option<String>,
  pub phone:               Option<String>,
  pub company:             Option<String>,
  pub job_title:           Option<String>,
  pub url_slug:            Option<String>,
  pub public_url:          Option<String>,
  pub total_views:         u64,
  pub total_contact_saves: u64,
  pub created_at:          DateTime<Utc>,
}

impl From<&Account> for AccountProfile {
  fn from(a: &Account) -> Self {
    Self {
      account_id:          a.account_id,
      display_name:        a.display_name.clone(),
      email:               a.email.clone(),
      phone:               a.phone.clone(),
      company:             a.company.clone(),
      job_title:           a.job_title.clone(),
      url_slug:            a.url_slug.clone(),
      public_url:          a.public_url.clone(),
      total_views:         a.total_views,
      total_contact_saves: a.total_contact_saves,
      created_at:          a.created_at,
    }
  }
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::ProfileStore::search_accounts`].
#[derive(Debug, Clone, Default)]
pub struct AccountQuery {
  /// Case-insensitive substring matched against display name, company and
  /// slug. No fuzzy matching.
  pub text:   Option<String>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn account() -> Account {
    let now = Utc::now();
    Account {
      account_id:          Uuid::new_v4(),
      display_name:        Some("Ada Lovelace".into()),
      email:               Some("ada@example.com".into()),
      phone:               Some("+44 20 0000 0000".into()),
      company:             None,
      job_title:           None,
      url_slug:            None,
      public_url:          None,
      google_uid:          None,
      google_email:        None,
      total_views:         0,
      total_contact_saves: 0,
      created_at:          now,
      updated_at:          now,
      last_viewed_at:      None,
      last_login_at:       None,
    }
  }

  #[test]
  fn complete_profile_needs_name_email_and_phone() {
    let mut a = account();
    assert!(a.is_complete());

    a.phone = Some("   ".into());
    assert!(!a.is_complete());

    a.phone = Some("555".into());
    a.display_name = None;
    assert!(!a.is_complete());
  }

  #[test]
  fn profile_omits_identity_fields() {
    let mut a = account();
    a.google_uid = Some("g-123".into());
    let json = serde_json::to_value(a.profile()).unwrap();
    assert!(json.get("google_uid").is_none());
    assert_eq!(json["display_name"], "Ada Lovelace");
  }
}
