//! Handler for `GET /accounts`.
//!
//! Query params map directly to [`AccountQuery`] fields. Filtering is an
//! exact, case-insensitive substring match.

use axum::{
  Json,
  extract::{Query, State},
};
use cardlink_core::{
  Error,
  account::{AccountProfile, AccountQuery},
  identity::IdentityVerifier,
  store::ProfileStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  /// Substring over display name, company and slug.
  pub q:      Option<String>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// `GET /accounts[?q=...][&limit=...][&offset=...]`
pub async fn list<S, V>(
  State(state): State<AppState<S, V>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AccountProfile>>, ApiError>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  let query = AccountQuery {
    text:   params.q.filter(|q| !q.trim().is_empty()),
    limit:  params.limit.map(|l| l.min(MAX_LIMIT)),
    offset: params.offset,
  };

  let accounts = state
    .store
    .search_accounts(&query)
    .await
    .map_err(Error::store)?;
  Ok(Json(accounts.iter().map(AccountProfile::from).collect()))
}
