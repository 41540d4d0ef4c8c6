//! Handlers for `/slug` endpoints.
//!
//! | Method   | Path           | Notes |
//! |----------|----------------|-------|
//! | `POST`   | `/slug`        | Body: `{"account_id":"<uuid>"}` |
//! | `GET`    | `/slug/{slug}` | Public profile; records a view in the background |
//! | `DELETE` | `/slug/{slug}` | Owner's bearer token; 204, 403 for other accounts, 404 if unmapped |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use cardlink_core::{
  account::AccountProfile, identity::IdentityVerifier, slug::SlugRegistration,
  store::ProfileStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  extract::{Body, ClientRequest, Session},
};

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub account_id: Uuid,
}

/// `POST /slug`
pub async fn register<S, V>(
  State(state): State<AppState<S, V>>,
  Body(body): Body<RegisterBody>,
) -> Result<Json<SlugRegistration>, ApiError>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  Ok(Json(state.slugs.register(body.account_id).await?))
}

/// `GET /slug/{slug}`
///
/// The view is recorded on a detached task; the response never waits for
/// it and never reflects its outcome.
pub async fn resolve<S, V>(
  State(state): State<AppState<S, V>>,
  Path(slug): Path<String>,
  ClientRequest(request): ClientRequest,
) -> Result<Json<AccountProfile>, ApiError>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  let account = state.slugs.resolve(&slug).await?;

  let tracker = state.engagement.clone();
  let account_id = account.account_id;
  tokio::spawn(async move {
    tracker
      .record_view_best_effort(account_id, Some(slug), request)
      .await;
  });

  Ok(Json(account.profile()))
}

/// `DELETE /slug/{slug}`
pub async fn deactivate<S, V>(
  State(state): State<AppState<S, V>>,
  Session(claims): Session,
  Path(slug): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  state.slugs.deactivate(&slug, claims.account_id).await?;
  Ok(StatusCode::NO_CONTENT)
}
