//! Analytics engine: a point-in-time report over every account and the
//! most recent view events.
//!
//! The report is computed fresh on each call and never written back. A
//! failed account scan fails the report; a failed aggregate or event read
//! only degrades the fields that depend on it.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Datelike as _, Months, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
  Error, Result,
  account::{Account, AccountProfile},
  event::{Event, EventKind, GlobalAggregate},
  store::ProfileStore,
};

/// Bucket for accounts without a company.
pub const INDEPENDENT: &str = "Independent";
/// Display name for events whose account is not in the scanned set.
pub const UNKNOWN_ACCOUNT: &str = "Unknown";

const RECENT_WINDOW_DAYS: i64 = 30;
const TOP_COMPANIES: usize = 5;
const RECENT_REGISTRATIONS: usize = 10;
const TOP_VIEWED: usize = 10;
const RECENT_VIEWS: usize = 20;
const MONTHS: u32 = 6;

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyCount {
  pub company: String,
  pub count:   usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyStat {
  /// `YYYY-MM`.
  pub month: String,
  /// e.g. `Mar 2026`.
  pub label: String,
  pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewedCard {
  pub account_id:   Uuid,
  pub display_name: Option<String>,
  pub url_slug:     Option<String>,
  pub total_views:  u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentView {
  pub event_id:     Uuid,
  pub account_id:   Uuid,
  pub display_name: String,
  pub slug:         Option<String>,
  pub occurred_at:  DateTime<Utc>,
  pub user_agent:   Option<String>,
  pub referer:      Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
  pub generated_at:          DateTime<Utc>,
  pub total_users:           usize,
  pub active_users:          usize,
  pub recent_users:          usize,
  pub previous_period_users: usize,
  /// Percentage change of `recent_users` over `previous_period_users`,
  /// rendered like `"50%"`.
  pub growth_rate:           String,
  pub top_companies:         Vec<CompanyCount>,
  pub recent_registrations:  Vec<AccountProfile>,
  /// Trailing calendar months, oldest first, including the current one.
  pub monthly_stats:         Vec<MonthlyStat>,
  pub total_profile_views:   u64,
  pub total_contact_saves:   u64,
  pub top_viewed_cards:      Vec<ViewedCard>,
  pub recent_views:          Vec<RecentView>,
}

// ─── Pure computation ────────────────────────────────────────────────────────

/// Format the growth of `recent` over `previous` as a whole percentage.
///
/// Halves round up towards positive infinity, so -0.5% is "0%" and 0.5% is
/// "1%". Computed in integers to keep exact halves exact.
pub fn growth_rate(recent: usize, previous: usize) -> String {
  if previous == 0 {
    return if recent > 0 { "100%" } else { "0%" }.to_owned();
  }
  let delta = (recent as i64 - previous as i64) * 100;
  let previous = previous as i64;
  let pct = (2 * delta + previous).div_euclid(2 * previous);
  format!("{pct}%")
}

/// Count accounts per company, most common first.
///
/// Ties keep the order in which companies are first seen in `accounts`.
pub fn top_companies(accounts: &[Account], limit: usize) -> Vec<CompanyCount> {
  let mut counts: Vec<CompanyCount> = Vec::new();
  let mut index: HashMap<String, usize> = HashMap::new();

  for account in accounts {
    let company = account
      .company
      .as_deref()
      .map(str::trim)
      .filter(|c| !c.is_empty())
      .unwrap_or(INDEPENDENT);

    match index.get(company) {
      Some(&i) => counts[i].count += 1,
      None => {
        index.insert(company.to_owned(), counts.len());
        counts.push(CompanyCount { company: company.to_owned(), count: 1 });
      }
    }
  }

  // Stable: equal counts keep first-seen order.
  counts.sort_by(|a, b| b.count.cmp(&a.count));
  counts.truncate(limit);
  counts
}

fn month_start(at: DateTime<Utc>) -> NaiveDate {
  NaiveDate::from_ymd_opt(at.year(), at.month(), 1)
    .unwrap_or_else(|| at.date_naive())
}

/// Registrations per calendar month for the `months` months ending with the
/// month of `as_of`, oldest first.
pub fn monthly_stats(
  accounts: &[Account],
  as_of: DateTime<Utc>,
  months: u32,
) -> Vec<MonthlyStat> {
  let current = month_start(as_of);

  (0..months)
    .rev()
    .filter_map(|back| {
      let start = current.checked_sub_months(Months::new(back))?;
      let end = start.checked_add_months(Months::new(1))?;
      let count = accounts
        .iter()
        .filter(|a| {
          let d = a.created_at.date_naive();
          d >= start && d < end
        })
        .count();
      Some(MonthlyStat {
        month: start.format("%Y-%m").to_string(),
        label: start.format("%b %Y").to_string(),
        count,
      })
    })
    .collect()
}

/// Assemble a report from already-loaded inputs.
///
/// `accounts` is the full collection in scan order (newest first). When
/// `global` is `None` the totals are summed from the accounts.
pub fn build_report(
  accounts: &[Account],
  global: Option<&GlobalAggregate>,
  recent_events: &[Event],
  as_of: DateTime<Utc>,
) -> Report {
  let window = TimeDelta::days(RECENT_WINDOW_DAYS);
  let recent_start = as_of - window;
  let previous_start = recent_start - window;

  let recent_users = accounts
    .iter()
    .filter(|a| a.created_at > recent_start && a.created_at <= as_of)
    .count();
  let previous_period_users = accounts
    .iter()
    .filter(|a| a.created_at > previous_start && a.created_at <= recent_start)
    .count();

  let mut newest: Vec<&Account> = accounts.iter().collect();
  newest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
  let recent_registrations = newest
    .into_iter()
    .take(RECENT_REGISTRATIONS)
    .map(AccountProfile::from)
    .collect();

  let mut viewed: Vec<&Account> =
    accounts.iter().filter(|a| a.total_views > 0).collect();
  viewed.sort_by(|a, b| b.total_views.cmp(&a.total_views));
  let top_viewed_cards = viewed
    .into_iter()
    .take(TOP_VIEWED)
    .map(|a| ViewedCard {
      account_id:   a.account_id,
      display_name: a.display_name.clone(),
      url_slug:     a.url_slug.clone(),
      total_views:  a.total_views,
    })
    .collect();

  let (total_profile_views, total_contact_saves) = match global {
    Some(g) => (g.total_profile_views, g.total_contact_saves),
    None => (
      accounts.iter().map(|a| a.total_views).sum(),
      accounts.iter().map(|a| a.total_contact_saves).sum(),
    ),
  };

  let by_id: HashMap<Uuid, &Account> =
    accounts.iter().map(|a| (a.account_id, a)).collect();
  let mut events: Vec<&Event> = recent_events.iter().collect();
  events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
  let recent_views = events
    .into_iter()
    .take(RECENT_VIEWS)
    .map(|e| RecentView {
      event_id:     e.event_id,
      account_id:   e.account_id,
      display_name: by_id
        .get(&e.account_id)
        .and_then(|a| a.display_name())
        .unwrap_or(UNKNOWN_ACCOUNT)
        .to_owned(),
      slug:         e.slug.clone(),
      occurred_at:  e.occurred_at,
      user_agent:   e.request.user_agent.clone(),
      referer:      e.request.referer.clone(),
    })
    .collect();

  Report {
    generated_at: as_of,
    total_users: accounts.len(),
    active_users: accounts.iter().filter(|a| a.is_complete()).count(),
    recent_users,
    previous_period_users,
    growth_rate: growth_rate(recent_users, previous_period_users),
    top_companies: top_companies(accounts, TOP_COMPANIES),
    recent_registrations,
    monthly_stats: monthly_stats(accounts, as_of, MONTHS),
    total_profile_views,
    total_contact_saves,
    top_viewed_cards,
    recent_views,
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct AnalyticsEngine<S> {
  store: Arc<S>,
}

impl<S> Clone for AnalyticsEngine<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: ProfileStore> AnalyticsEngine<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  pub async fn compute_report(&self) -> Result<Report> {
    self.compute_report_at(Utc::now()).await
  }

  pub async fn compute_report_at(&self, as_of: DateTime<Utc>) -> Result<Report> {
    let accounts = self.store.list_accounts().await.map_err(Error::store)?;

    let global = match self.store.get_global_aggregate().await {
      Ok(global) => global,
      Err(e) => {
        warn!(error = %e, "global aggregate unavailable; summing accounts");
        None
      }
    };

    let events = match self.store.recent_events(EventKind::View, RECENT_VIEWS).await {
      Ok(events) => events,
      Err(e) => {
        warn!(error = %e, "recent views unavailable; reporting none");
        Vec::new()
      }
    };

    Ok(build_report(&accounts, global.as_ref(), &events, as_of))
  }
}
