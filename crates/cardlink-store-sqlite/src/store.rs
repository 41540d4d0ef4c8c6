//! [`SqliteStore`], the SQLite implementation of [`ProfileStore`].

use std::path::Path;

use cardlink_core::{
  account::{Account, AccountQuery, NewAccount},
  event::{DailyAggregate, Event, EventKind, GlobalAggregate},
  mapping::{IdentityLink, IdentityMapping, LinkOutcome, SlugMapping},
  store::{CommitOutcome, ProfileStore, WriteBatch},
};
use chrono::{DateTime, NaiveDate, SubsecRound as _, Utc};
use rusqlite::{
  ErrorCode, OptionalExtension as _, TransactionBehavior,
  functions::FunctionFlags,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    ACCOUNT_COLUMNS, EVENT_COLUMNS, RawAccount, RawDaily, RawEvent, RawGlobal,
    RawIdentityMapping, RawMutation, RawSlugMapping, encode_date, encode_dt,
    encode_kind, encode_mutation, encode_uuid, like_pattern, now,
  },
  schema::SCHEMA,
};

const DEFAULT_SEARCH_LIMIT: usize = 100;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A cardlink document store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        register_functions(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch at most one account matching `where_clause` (which binds `?1`).
  async fn account_where(
    &self,
    where_clause: &'static str,
    param: String,
  ) -> Result<Option<Account>> {
    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {where_clause}"),
              rusqlite::params![param],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  /// Run raw SQL against the database, bypassing the store's invariants.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Register `casefold(text)`, a Unicode lower-casing that matches
/// [`like_pattern`]. SQLite's built-in `lower()` only folds ASCII.
fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    "casefold",
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
  )
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
  )
}

// ─── ProfileStore impl ───────────────────────────────────────────────────────

impl ProfileStore for SqliteStore {
  type Error = crate::Error;

  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn create_account(&self, input: NewAccount) -> Result<Account> {
    let created_at = input
      .created_at
      .map(|t| t.trunc_subsecs(6))
      .unwrap_or_else(now);

    let account = Account {
      account_id: Uuid::new_v4(),
      display_name: input.display_name,
      email: input.email,
      phone: input.phone,
      company: input.company,
      job_title: input.job_title,
      url_slug: None,
      public_url: None,
      google_uid: None,
      google_email: None,
      total_views: 0,
      total_contact_saves: 0,
      created_at,
      updated_at: created_at,
      last_viewed_at: None,
      last_login_at: None,
    };

    let id_str       = encode_uuid(account.account_id);
    let at_str       = encode_dt(created_at);
    let display_name = account.display_name.clone();
    let email        = account.email.clone();
    let phone        = account.phone.clone();
    let company      = account.company.clone();
    let job_title    = account.job_title.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO accounts (
             account_id, display_name, email, phone, company, job_title,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          rusqlite::params![
            id_str,
            display_name,
            email,
            phone,
            company,
            job_title,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(account)
  }

  async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
    self.account_where("account_id = ?1", encode_uuid(id)).await
  }

  async fn list_accounts(&self) -> Result<Vec<Account>> {
    let raws: Vec<RawAccount> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACCOUNT_COLUMNS} FROM accounts
           ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map([], RawAccount::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAccount::into_account).collect()
  }

  async fn search_accounts(&self, query: &AccountQuery) -> Result<Vec<Account>> {
    let pattern    = query.text.as_deref().map(like_pattern);
    let limit_val  = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT) as i64;
    let offset_val = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawAccount> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACCOUNT_COLUMNS} FROM accounts
           WHERE ?1 IS NULL
              OR casefold(display_name) LIKE ?1 ESCAPE '\\'
              OR casefold(company)      LIKE ?1 ESCAPE '\\'
              OR casefold(url_slug)     LIKE ?1 ESCAPE '\\'
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![pattern, limit_val, offset_val],
            RawAccount::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAccount::into_account).collect()
  }

  async fn set_account_slug(
    &self,
    id:         Uuid,
    slug:       String,
    public_url: String,
  ) -> Result<bool> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE accounts SET url_slug = ?1, public_url = ?2, updated_at = ?3
           WHERE account_id = ?4",
          rusqlite::params![slug, public_url, at_str, id_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn touch_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE accounts SET last_login_at = ?1, updated_at = ?1
           WHERE account_id = ?2",
          rusqlite::params![at_str, id_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  // ── Slug mappings ─────────────────────────────────────────────────────────

  async fn put_slug_mapping(&self, mapping: SlugMapping) -> Result<()> {
    let account_str = encode_uuid(mapping.account_id);
    let at_str      = encode_dt(mapping.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO slug_mappings (slug, account_id, display_name, is_active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(slug) DO UPDATE SET
             account_id   = excluded.account_id,
             display_name = excluded.display_name,
             is_active    = excluded.is_active,
             created_at   = excluded.created_at",
          rusqlite::params![
            mapping.slug,
            account_str,
            mapping.display_name,
            mapping.is_active,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_slug_mapping(&self, slug: &str) -> Result<Option<SlugMapping>> {
    let slug = slug.to_owned();

    let raw: Option<RawSlugMapping> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT slug, account_id, display_name, is_active, created_at
               FROM slug_mappings WHERE slug = ?1",
              rusqlite::params![slug],
              |row| {
                Ok(RawSlugMapping {
                  slug:         row.get(0)?,
                  account_id:   row.get(1)?,
                  display_name: row.get(2)?,
                  is_active:    row.get(3)?,
                  created_at:   row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSlugMapping::into_mapping).transpose()
  }

  async fn deactivate_slug(&self, slug: &str) -> Result<bool> {
    let slug = slug.to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE slug_mappings SET is_active = 0 WHERE slug = ?1",
          rusqlite::params![slug],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  // ── Identity mappings ─────────────────────────────────────────────────────

  async fn link_identity(&self, link: IdentityLink) -> Result<LinkOutcome> {
    let account_str = encode_uuid(link.account_id);
    let at_str      = encode_dt(link.linked_at);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let holder: Option<Option<String>> = tx
          .query_row(
            "SELECT google_uid FROM accounts WHERE account_id = ?1",
            rusqlite::params![account_str],
            |row| row.get(0),
          )
          .optional()?;
        match holder {
          None => return Ok(LinkOutcome::AccountNotFound),
          Some(Some(_)) => return Ok(LinkOutcome::AccountAlreadyLinked),
          Some(None) => {}
        }

        // Create-if-absent: the primary key is the precondition.
        let inserted = tx.execute(
          "INSERT INTO identity_mappings (external_id, account_id, email, linked_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(external_id) DO NOTHING",
          rusqlite::params![link.external_id, account_str, link.email, at_str],
        )?;
        if inserted == 0 {
          return Ok(LinkOutcome::IdentityTaken);
        }

        let bound = match tx.execute(
          "UPDATE accounts SET google_uid = ?1, google_email = ?2, updated_at = ?3
           WHERE account_id = ?4 AND google_uid IS NULL",
          rusqlite::params![link.external_id, link.email, at_str, account_str],
        ) {
          Ok(n) => n,
          Err(e) if is_constraint_violation(&e) => {
            return Ok(LinkOutcome::IdentityTaken);
          }
          Err(e) => return Err(e.into()),
        };
        if bound == 0 {
          return Ok(LinkOutcome::AccountAlreadyLinked);
        }

        tx.commit()?;
        Ok(LinkOutcome::Linked)
      })
      .await?;

    Ok(outcome)
  }

  async fn get_identity_mapping(
    &self,
    external_id: &str,
  ) -> Result<Option<IdentityMapping>> {
    let external_id = external_id.to_owned();

    let raw: Option<RawIdentityMapping> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT external_id, account_id, email, linked_at
               FROM identity_mappings WHERE external_id = ?1",
              rusqlite::params![external_id],
              |row| {
                Ok(RawIdentityMapping {
                  external_id: row.get(0)?,
                  account_id:  row.get(1)?,
                  email:       row.get(2)?,
                  linked_at:   row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIdentityMapping::into_mapping).transpose()
  }

  async fn find_account_by_external_id(
    &self,
    external_id: &str,
  ) -> Result<Option<Account>> {
    self
      .account_where("google_uid = ?1", external_id.to_owned())
      .await
  }

  // ── Engagement ────────────────────────────────────────────────────────────

  async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome> {
    let at_str = encode_dt(batch.at);
    let writes = batch
      .mutations
      .into_iter()
      .map(encode_mutation)
      .collect::<Result<Vec<_>>>()?;
    let count = writes.len();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        for write in writes {
          match write {
            RawMutation::IncrementAccount {
              account_id,
              column,
              by,
              touch_last_viewed,
            } => {
              let id_str = encode_uuid(account_id);
              let changed = if touch_last_viewed {
                tx.execute(
                  &format!(
                    "UPDATE accounts SET {column} = {column} + ?1, last_viewed_at = ?2
                     WHERE account_id = ?3"
                  ),
                  rusqlite::params![by, at_str, id_str],
                )?
              } else {
                tx.execute(
                  &format!(
                    "UPDATE accounts SET {column} = {column} + ?1 WHERE account_id = ?2"
                  ),
                  rusqlite::params![by, id_str],
                )?
              };
              if changed == 0 {
                // Dropping `tx` rolls back everything applied so far.
                return Ok(CommitOutcome::MissingAccount(account_id));
              }
            }
            RawMutation::IncrementGlobal { views, saves } => {
              tx.execute(
                "INSERT INTO global_aggregate
                   (id, total_profile_views, total_contact_saves, last_updated)
                 VALUES (1, ?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                   total_profile_views = total_profile_views + excluded.total_profile_views,
                   total_contact_saves = total_contact_saves + excluded.total_contact_saves,
                   last_updated        = excluded.last_updated",
                rusqlite::params![views, saves, at_str],
              )?;
            }
            RawMutation::IncrementDaily { account_id, date, by } => {
              tx.execute(
                "INSERT INTO daily_aggregates (account_id, date, view_count, last_updated)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(account_id, date) DO UPDATE SET
                   view_count   = view_count + excluded.view_count,
                   last_updated = excluded.last_updated",
                rusqlite::params![account_id, date, by, at_str],
              )?;
            }
            RawMutation::AppendEvent(e) => {
              tx.execute(
                &format!(
                  "INSERT INTO events ({EVENT_COLUMNS})
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                rusqlite::params![
                  e.event_id,
                  e.kind,
                  e.account_id,
                  e.occurred_at,
                  e.slug,
                  e.user_agent,
                  e.referer,
                  e.client_address,
                  e.metadata_json,
                ],
              )?;
            }
          }
        }

        tx.commit()?;
        Ok(CommitOutcome::Committed)
      })
      .await?;

    debug!(writes = count, ?outcome, "batch applied");
    Ok(outcome)
  }

  async fn get_global_aggregate(&self) -> Result<Option<GlobalAggregate>> {
    let raw: Option<RawGlobal> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT total_profile_views, total_contact_saves, last_updated
               FROM global_aggregate WHERE id = 1",
              [],
              |row| {
                Ok(RawGlobal {
                  total_profile_views: row.get(0)?,
                  total_contact_saves: row.get(1)?,
                  last_updated:        row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawGlobal::into_aggregate).transpose()
  }

  async fn get_daily_aggregate(
    &self,
    account_id: Uuid,
    date:       NaiveDate,
  ) -> Result<Option<DailyAggregate>> {
    let id_str   = encode_uuid(account_id);
    let date_str = encode_date(date);

    let raw: Option<RawDaily> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT account_id, date, view_count, last_updated
               FROM daily_aggregates WHERE account_id = ?1 AND date = ?2",
              rusqlite::params![id_str, date_str],
              |row| {
                Ok(RawDaily {
                  account_id:   row.get(0)?,
                  date:         row.get(1)?,
                  view_count:   row.get(2)?,
                  last_updated: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDaily::into_aggregate).transpose()
  }

  async fn recent_events(&self, kind: EventKind, limit: usize) -> Result<Vec<Event>> {
    let kind_str  = encode_kind(kind);
    let limit_val = limit as i64;

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM events
           WHERE kind = ?1
           ORDER BY occurred_at DESC, rowid DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str, limit_val], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn count_events(&self, account_id: Uuid, kind: EventKind) -> Result<u64> {
    let id_str   = encode_uuid(account_id);
    let kind_str = encode_kind(kind);

    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM events WHERE account_id = ?1 AND kind = ?2",
          rusqlite::params![id_str, kind_str],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(u64::try_from(n).unwrap_or(0))
  }
}
