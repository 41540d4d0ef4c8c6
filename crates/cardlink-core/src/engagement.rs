//! Engagement tracker. Records views and contact saves.
//!
//! Each event is committed as one atomic batch: the account counter, the
//! global aggregate, the daily aggregate (views only) and the appended
//! event. Increments are applied by the store at write time, so concurrent
//! batches for the same account commute and every counter equals the number
//! of its events without any locking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{Counter, Event, EventKind, RequestMeta},
  store::{CommitOutcome, Mutation, ProfileStore, WriteBatch},
};

// ─── Batches ─────────────────────────────────────────────────────────────────

/// The batch that records one view of `account_id` at `at`.
pub fn view_batch(
  account_id: Uuid,
  slug: Option<String>,
  metadata: Option<serde_json::Value>,
  request: RequestMeta,
  at: DateTime<Utc>,
) -> WriteBatch {
  WriteBatch::new(at)
    .push(Mutation::IncrementAccount {
      account_id,
      counter: Counter::Views,
      by: 1,
      touch_last_viewed: true,
    })
    .push(Mutation::IncrementGlobal { counter: Counter::Views, by: 1 })
    .push(Mutation::IncrementDaily {
      account_id,
      date: at.date_naive(),
      by: 1,
    })
    .push(Mutation::AppendEvent(Event {
      event_id: Uuid::new_v4(),
      kind: EventKind::View,
      account_id,
      occurred_at: at,
      slug,
      request,
      metadata,
    }))
}

/// The batch that records one contact save of `account_id` at `at`. No
/// daily bucket is kept for saves.
pub fn contact_save_batch(
  account_id: Uuid,
  metadata: Option<serde_json::Value>,
  request: RequestMeta,
  at: DateTime<Utc>,
) -> WriteBatch {
  WriteBatch::new(at)
    .push(Mutation::IncrementAccount {
      account_id,
      counter: Counter::ContactSaves,
      by: 1,
      touch_last_viewed: false,
    })
    .push(Mutation::IncrementGlobal { counter: Counter::ContactSaves, by: 1 })
    .push(Mutation::AppendEvent(Event {
      event_id: Uuid::new_v4(),
      kind: EventKind::ContactSave,
      account_id,
      occurred_at: at,
      slug: None,
      request,
      metadata,
    }))
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

pub struct EngagementTracker<S> {
  store: Arc<S>,
}

impl<S> Clone for EngagementTracker<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: ProfileStore> EngagementTracker<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  pub async fn record_view(
    &self,
    account_id: Uuid,
    slug: Option<String>,
    metadata: Option<serde_json::Value>,
    request: RequestMeta,
  ) -> Result<()> {
    let batch = view_batch(account_id, slug, metadata, request, Utc::now());
    self.commit(account_id, batch).await
  }

  pub async fn record_contact_save(
    &self,
    account_id: Uuid,
    metadata: Option<serde_json::Value>,
    request: RequestMeta,
  ) -> Result<()> {
    let batch = contact_save_batch(account_id, metadata, request, Utc::now());
    self.commit(account_id, batch).await
  }

  /// [`Self::record_view`] for callers whose own response must not depend on
  /// tracking: failures are logged and dropped.
  pub async fn record_view_best_effort(
    &self,
    account_id: Uuid,
    slug: Option<String>,
    request: RequestMeta,
  ) {
    if let Err(e) = self.record_view(account_id, slug, None, request).await {
      warn!(%account_id, error = %e, "view tracking failed");
    }
  }

  async fn commit(&self, account_id: Uuid, batch: WriteBatch) -> Result<()> {
    let writes = batch.mutations.len();
    match self
      .store
      .commit(batch)
      .await
      .map_err(|e| Error::Tracking(Box::new(e)))?
    {
      CommitOutcome::Committed => {
        debug!(%account_id, writes, "committed engagement batch");
        Ok(())
      }
      CommitOutcome::MissingAccount(id) => Err(Error::AccountNotFound(id)),
    }
  }
}
