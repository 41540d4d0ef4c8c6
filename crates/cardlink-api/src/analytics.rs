//! Handler for `GET /analytics`.

use axum::{Json, extract::State};
use cardlink_core::{
  analytics::Report, identity::IdentityVerifier, store::ProfileStore,
};

use crate::{AppState, error::ApiError};

/// `GET /analytics`
pub async fn report<S, V>(
  State(state): State<AppState<S, V>>,
) -> Result<Json<Report>, ApiError>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  Ok(Json(state.analytics.compute_report().await?))
}
