//! Handlers for `/events` endpoints.
//!
//! Unlike `GET /slug/{slug}`, these calls wait for the tracking batch and
//! report its failure.

use axum::{Json, extract::State};
use cardlink_core::{identity::IdentityVerifier, store::ProfileStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  extract::{Body, ClientRequest},
};

#[derive(Debug, Deserialize)]
pub struct ViewBody {
  pub account_id: Uuid,
  pub slug:       Option<String>,
  pub metadata:   Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ContactSaveBody {
  pub account_id: Uuid,
  pub metadata:   Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct Tracked {
  pub tracked: bool,
}

/// `POST /events/view`
pub async fn view<S, V>(
  State(state): State<AppState<S, V>>,
  ClientRequest(request): ClientRequest,
  Body(body): Body<ViewBody>,
) -> Result<Json<Tracked>, ApiError>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  let slug = body.slug.filter(|s| !s.trim().is_empty());
  state
    .engagement
    .record_view(body.account_id, slug, body.metadata, request)
    .await?;
  Ok(Json(Tracked { tracked: true }))
}

/// `POST /events/contact-save`
pub async fn contact_save<S, V>(
  State(state): State<AppState<S, V>>,
  ClientRequest(request): ClientRequest,
  Body(body): Body<ContactSaveBody>,
) -> Result<Json<Tracked>, ApiError>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  state
    .engagement
    .record_contact_save(body.account_id, body.metadata, request)
    .await?;
  Ok(Json(Tracked { tracked: true }))
}
