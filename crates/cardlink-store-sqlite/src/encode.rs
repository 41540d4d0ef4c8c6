//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that text ordering matches time ordering. Dates are `YYYY-MM-DD`.
//! UUIDs are stored as hyphenated lowercase strings. Counters are `INTEGER`.

use std::str::FromStr as _;

use cardlink_core::{
  account::Account,
  event::{
    Counter, DailyAggregate, Event, EventKind, GlobalAggregate, RequestMeta,
  },
  mapping::{IdentityMapping, SlugMapping},
  store::Mutation,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound as _, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums and counters ──────────────────────────────────────────────────────

pub fn encode_kind(k: EventKind) -> &'static str {
  match k {
    EventKind::View => "view",
    EventKind::ContactSave => "contact_save",
  }
}

pub fn decode_kind(s: &str) -> Result<EventKind> {
  EventKind::from_str(s)
    .map_err(|_| Error::Decode(format!("unknown event kind: {s:?}")))
}

pub fn account_counter_column(c: Counter) -> &'static str {
  match c {
    Counter::Views => "total_views",
    Counter::ContactSaves => "total_contact_saves",
  }
}

pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Mutations ───────────────────────────────────────────────────────────────

/// A [`Mutation`] with every value already encoded, ready to move onto the
/// database thread.
pub enum RawMutation {
  IncrementAccount {
    account_id:        Uuid,
    column:            &'static str,
    by:                i64,
    touch_last_viewed: bool,
  },
  IncrementGlobal {
    views: i64,
    saves: i64,
  },
  IncrementDaily {
    account_id: String,
    date:       String,
    by:         i64,
  },
  AppendEvent(RawEvent),
}

pub fn encode_mutation(m: Mutation) -> Result<RawMutation> {
  Ok(match m {
    Mutation::IncrementAccount { account_id, counter, by, touch_last_viewed } => {
      RawMutation::IncrementAccount {
        account_id,
        column: account_counter_column(counter),
        by: encode_count(by),
        touch_last_viewed,
      }
    }
    Mutation::IncrementGlobal { counter, by } => {
      let by = encode_count(by);
      match counter {
        Counter::Views => RawMutation::IncrementGlobal { views: by, saves: 0 },
        Counter::ContactSaves => {
          RawMutation::IncrementGlobal { views: 0, saves: by }
        }
      }
    }
    Mutation::IncrementDaily { account_id, date, by } => {
      RawMutation::IncrementDaily {
        account_id: encode_uuid(account_id),
        date:       encode_date(date),
        by:         encode_count(by),
      }
    }
    Mutation::AppendEvent(event) => RawMutation::AppendEvent(RawEvent::from_event(event)?),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawAccount::from_row`].
pub const ACCOUNT_COLUMNS: &str = "account_id, display_name, email, phone, \
  company, job_title, url_slug, public_url, google_uid, google_email, \
  total_views, total_contact_saves, created_at, updated_at, last_viewed_at, \
  last_login_at";

/// Raw values read directly from an `accounts` row.
pub struct RawAccount {
  pub account_id:          String,
  pub display_name:        Option<String>,
  pub email:               Option<String>,
  pub phone:               Option<String>,
  pub company:             Option<String>,
  pub job_title:           Option<String>,
  pub url_slug:            Option<String>,
  pub public_url:          Option<String>,
  pub google_uid:          Option<String>,
  pub google_email:        Option<String>,
  pub total_views:         i64,
  pub total_contact_saves: i64,
  pub created_at:          String,
  pub updated_at:          String,
  pub last_viewed_at:      Option<String>,
  pub last_login_at:       Option<String>,
}

impl RawAccount {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      account_id:          row.get(0)?,
      display_name:        row.get(1)?,
      email:               row.get(2)?,
      phone:               row.get(3)?,
      company:             row.get(4)?,
      job_title:           row.get(5)?,
      url_slug:            row.get(6)?,
      public_url:          row.get(7)?,
      google_uid:          row.get(8)?,
      google_email:        row.get(9)?,
      total_views:         row.get(10)?,
      total_contact_saves: row.get(11)?,
      created_at:          row.get(12)?,
      updated_at:          row.get(13)?,
      last_viewed_at:      row.get(14)?,
      last_login_at:       row.get(15)?,
    })
  }

  pub fn into_account(self) -> Result<Account> {
    Ok(Account {
      account_id:          decode_uuid(&self.account_id)?,
      display_name:        self.display_name,
      email:               self.email,
      phone:               self.phone,
      company:             self.company,
      job_title:           self.job_title,
      url_slug:            self.url_slug,
      public_url:          self.public_url,
      google_uid:          self.google_uid,
      google_email:        self.google_email,
      total_views:         decode_count(self.total_views),
      total_contact_saves: decode_count(self.total_contact_saves),
      created_at:          decode_dt(&self.created_at)?,
      updated_at:          decode_dt(&self.updated_at)?,
      last_viewed_at:      decode_opt_dt(self.last_viewed_at)?,
      last_login_at:       decode_opt_dt(self.last_login_at)?,
    })
  }
}

/// Raw values read directly from a `slug_mappings` row.
pub struct RawSlugMapping {
  pub slug:         String,
  pub account_id:   String,
  pub display_name: String,
  pub is_active:    bool,
  pub created_at:   String,
}

impl RawSlugMapping {
  pub fn into_mapping(self) -> Result<SlugMapping> {
    Ok(SlugMapping {
      slug:         self.slug,
      account_id:   decode_uuid(&self.account_id)?,
      display_name: self.display_name,
      is_active:    self.is_active,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `identity_mappings` row.
pub struct RawIdentityMapping {
  pub external_id: String,
  pub account_id:  String,
  pub email:       String,
  pub linked_at:   String,
}

impl RawIdentityMapping {
  pub fn into_mapping(self) -> Result<IdentityMapping> {
    Ok(IdentityMapping {
      external_id: self.external_id,
      account_id:  decode_uuid(&self.account_id)?,
      email:       self.email,
      linked_at:   decode_dt(&self.linked_at)?,
    })
  }
}

/// Column list matching [`RawEvent::from_row`].
pub const EVENT_COLUMNS: &str = "event_id, kind, account_id, occurred_at, \
  slug, user_agent, referer, client_address, metadata_json";

/// Raw values of an `events` row, in both directions.
pub struct RawEvent {
  pub event_id:       String,
  pub kind:           String,
  pub account_id:     String,
  pub occurred_at:    String,
  pub slug:           Option<String>,
  pub user_agent:     Option<String>,
  pub referer:        Option<String>,
  pub client_address: Option<String>,
  pub metadata_json:  Option<String>,
}

impl RawEvent {
  pub fn from_event(e: Event) -> Result<Self> {
    Ok(Self {
      event_id:       encode_uuid(e.event_id),
      kind:           encode_kind(e.kind).to_owned(),
      account_id:     encode_uuid(e.account_id),
      occurred_at:    encode_dt(e.occurred_at),
      slug:           e.slug,
      user_agent:     e.request.user_agent,
      referer:        e.request.referer,
      client_address: e.request.client_address,
      metadata_json:  e.metadata.as_ref().map(serde_json::to_string).transpose()?,
    })
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:       row.get(0)?,
      kind:           row.get(1)?,
      account_id:     row.get(2)?,
      occurred_at:    row.get(3)?,
      slug:           row.get(4)?,
      user_agent:     row.get(5)?,
      referer:        row.get(6)?,
      client_address: row.get(7)?,
      metadata_json:  row.get(8)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:    decode_uuid(&self.event_id)?,
      kind:        decode_kind(&self.kind)?,
      account_id:  decode_uuid(&self.account_id)?,
      occurred_at: decode_dt(&self.occurred_at)?,
      slug:        self.slug,
      request:     RequestMeta {
        user_agent:     self.user_agent,
        referer:        self.referer,
        client_address: self.client_address,
      },
      metadata:    self
        .metadata_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
    })
  }
}

/// Raw values read directly from a `daily_aggregates` row.
pub struct RawDaily {
  pub account_id:   String,
  pub date:         String,
  pub view_count:   i64,
  pub last_updated: String,
}

impl RawDaily {
  pub fn into_aggregate(self) -> Result<DailyAggregate> {
    Ok(DailyAggregate {
      account_id:   decode_uuid(&self.account_id)?,
      date:         decode_date(&self.date)?,
      view_count:   decode_count(self.view_count),
      last_updated: decode_dt(&self.last_updated)?,
    })
  }
}

/// Raw values read directly from the `global_aggregate` row.
pub struct RawGlobal {
  pub total_profile_views: i64,
  pub total_contact_saves: i64,
  pub last_updated:        String,
}

impl RawGlobal {
  pub fn into_aggregate(self) -> Result<GlobalAggregate> {
    Ok(GlobalAggregate {
      total_profile_views: decode_count(self.total_profile_views),
      total_contact_saves: decode_count(self.total_contact_saves),
      last_updated:        decode_dt(&self.last_updated)?,
    })
  }
}

/// Escape `text` for a `LIKE ... ESCAPE '\'` substring match.
pub fn like_pattern(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 2);
  out.push('%');
  for c in text.to_lowercase().chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}
