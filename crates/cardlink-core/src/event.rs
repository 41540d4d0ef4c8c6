//! Engagement events and the aggregates derived from them.
//!
//! Events are strictly append-only: they form the audit trail that the
//! denormalised counters on accounts and aggregates are derived from.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ─── Event kind ──────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
  View,
  ContactSave,
}

// ─── Request metadata ────────────────────────────────────────────────────────

/// What the HTTP layer knows about the request that caused an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
  pub user_agent:     Option<String>,
  pub referer:        Option<String>,
  pub client_address: Option<String>,
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// An append-only engagement record. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub event_id:    Uuid,
  pub kind:        EventKind,
  pub account_id:  Uuid,
  /// Server-assigned.
  pub occurred_at: DateTime<Utc>,
  pub slug:        Option<String>,
  pub request:     RequestMeta,
  /// Free-form caller-supplied context.
  pub metadata:    Option<serde_json::Value>,
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

/// Which counter an increment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
  Views,
  ContactSaves,
}

/// Per-account, per-UTC-day view count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAggregate {
  pub account_id:   Uuid,
  pub date:         NaiveDate,
  pub view_count:   u64,
  pub last_updated: DateTime<Utc>,
}

/// Cross-account totals, kept as a singleton document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalAggregate {
  pub total_profile_views: u64,
  pub total_contact_saves: u64,
  pub last_updated:        DateTime<Utc>,
}
