//! Handlers for `/identity` endpoints.
//!
//! | Method | Path               | Notes |
//! |--------|--------------------|-------|
//! | `POST` | `/identity/link`   | Body: [`LinkRequest`] |
//! | `POST` | `/identity/login`  | Body: `{"proof":"..."}` |
//! | `GET`  | `/identity/verify` | `Authorization: Bearer <token>` |

use axum::{Json, extract::State};
use cardlink_core::{
  identity::{IdentityVerifier, LinkRequest, LinkResult, LoginResult},
  store::ProfileStore,
  token::SessionClaims,
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  error::{ApiError, require},
  extract::{Body, Session},
};

/// `POST /identity/link`
pub async fn link<S, V>(
  State(state): State<AppState<S, V>>,
  Body(req): Body<LinkRequest>,
) -> Result<Json<LinkResult>, ApiError>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  require("slug", &req.slug)?;
  require("external_id", &req.external_id)?;
  require("email", &req.email)?;
  require("proof", &req.proof)?;

  Ok(Json(state.identity.link(req).await?))
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub proof: String,
}

/// `POST /identity/login`
pub async fn login<S, V>(
  State(state): State<AppState<S, V>>,
  Body(body): Body<LoginBody>,
) -> Result<Json<LoginResult>, ApiError>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  require("proof", &body.proof)?;
  Ok(Json(state.identity.login(&body.proof).await?))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
  pub valid:  bool,
  pub claims: SessionClaims,
}

/// `GET /identity/verify`
pub async fn verify(Session(claims): Session) -> Json<VerifyResponse> {
  Json(VerifyResponse { valid: true, claims })
}
