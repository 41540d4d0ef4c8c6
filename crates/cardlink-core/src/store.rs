//! The `ProfileStore` trait and the batched-write types it commits.
//!
//! The trait is implemented by storage backends (e.g.
//! `cardlink-store-sqlite`). The components in this crate and the HTTP layer
//! depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  account::{Account, AccountQuery, NewAccount},
  event::{Counter, DailyAggregate, Event, EventKind, GlobalAggregate},
  mapping::{IdentityLink, IdentityMapping, LinkOutcome, SlugMapping},
};

// ─── Atomic batches ──────────────────────────────────────────────────────────

/// A single write inside a [`WriteBatch`].
///
/// Increments are applied by the store at write time (`n = n + by`), never
/// as read-then-write, so concurrent batches commute.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  IncrementAccount {
    account_id:        Uuid,
    counter:           Counter,
    by:                u64,
    /// Also set `last_viewed_at` to the batch timestamp.
    touch_last_viewed: bool,
  },
  /// Upsert-merge into the global aggregate.
  IncrementGlobal { counter: Counter, by: u64 },
  /// Upsert-merge into the `(account_id, date)` daily view aggregate.
  IncrementDaily {
    account_id: Uuid,
    date:       NaiveDate,
    by:         u64,
  },
  AppendEvent(Event),
}

/// A set of writes committed as one all-or-nothing unit.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
  pub at:        DateTime<Utc>,
  pub mutations: Vec<Mutation>,
}

impl WriteBatch {
  pub fn new(at: DateTime<Utc>) -> Self { Self { at, mutations: Vec::new() } }

  pub fn push(mut self, mutation: Mutation) -> Self {
    self.mutations.push(mutation);
    self
  }

  pub fn is_empty(&self) -> bool { self.mutations.is_empty() }
}

/// Result of [`ProfileStore::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
  Committed,
  /// An account increment targeted a missing account; nothing was written.
  MissingAccount(Uuid),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the document store backing cardlink.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ProfileStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Accounts ──────────────────────────────────────────────────────────

  /// Create and persist a new account with zeroed counters.
  fn create_account(
    &self,
    input: NewAccount,
  ) -> impl Future<Output = Result<Account, Self::Error>> + Send + '_;

  /// Retrieve an account by id. Returns `None` if not found.
  fn get_account(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + '_;

  /// Every account, newest `created_at` first. Equal timestamps list the
  /// later insertion first.
  fn list_accounts(
    &self,
  ) -> impl Future<Output = Result<Vec<Account>, Self::Error>> + Send + '_;

  /// Substring-filtered, paginated account listing, newest first.
  fn search_accounts<'a>(
    &'a self,
    query: &'a AccountQuery,
  ) -> impl Future<Output = Result<Vec<Account>, Self::Error>> + Send + 'a;

  /// Write `url_slug` and `public_url`. Returns `false` if the account does
  /// not exist.
  fn set_account_slug(
    &self,
    id: Uuid,
    slug: String,
    public_url: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Record a successful login. Returns `false` if the account does not
  /// exist.
  fn touch_login(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Slug mappings ─────────────────────────────────────────────────────

  /// Create or overwrite the mapping keyed by `mapping.slug`.
  fn put_slug_mapping(
    &self,
    mapping: SlugMapping,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_slug_mapping<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<Option<SlugMapping>, Self::Error>> + Send + 'a;

  /// Mark a mapping inactive. Returns `false` if no mapping exists.
  fn deactivate_slug<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Identity mappings ─────────────────────────────────────────────────

  /// Create the identity mapping if absent and bind the identity to the
  /// account if it holds none, as one conditional unit. Nothing is written
  /// unless the outcome is [`LinkOutcome::Linked`].
  fn link_identity(
    &self,
    link: IdentityLink,
  ) -> impl Future<Output = Result<LinkOutcome, Self::Error>> + Send + '_;

  fn get_identity_mapping<'a>(
    &'a self,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<IdentityMapping>, Self::Error>> + Send + 'a;

  /// The account whose `google_uid` equals `external_id`, if any.
  fn find_account_by_external_id<'a>(
    &'a self,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  // ── Engagement ────────────────────────────────────────────────────────

  /// Apply every mutation in `batch` atomically.
  fn commit(
    &self,
    batch: WriteBatch,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;

  fn get_global_aggregate(
    &self,
  ) -> impl Future<Output = Result<Option<GlobalAggregate>, Self::Error>> + Send + '_;

  fn get_daily_aggregate(
    &self,
    account_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<DailyAggregate>, Self::Error>> + Send + '_;

  /// The `limit` most recent events of `kind`, newest first.
  fn recent_events(
    &self,
    kind: EventKind,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  fn count_events(
    &self,
    account_id: Uuid,
    kind: EventKind,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
