//! Request extractors: JSON bodies, request metadata and bearer sessions.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
  extract::{ConnectInfo, FromRequest, FromRequestParts},
  http::{HeaderMap, header, request::Parts},
};
use cardlink_core::{
  event::RequestMeta, identity::IdentityVerifier, store::ProfileStore,
  token::SessionClaims,
};

use crate::{AppState, error::ApiError};

/// A JSON body whose rejections are reported as `400` [`ApiError`]s.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Body<T>(pub T);

// ─── Request metadata ────────────────────────────────────────────────────────

/// The [`RequestMeta`] of the current request.
pub struct ClientRequest(pub RequestMeta);

/// The first `X-Forwarded-For` hop, else the socket peer.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
  headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|hop| !hop.is_empty())
    .map(str::to_owned)
    .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned)
}

impl<St> FromRequestParts<St> for ClientRequest
where
  St: Send + Sync,
{
  type Rejection = Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &St,
  ) -> Result<Self, Self::Rejection> {
    let peer = parts
      .extensions
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| *addr);

    Ok(ClientRequest(RequestMeta {
      user_agent:     header_string(&parts.headers, header::USER_AGENT),
      referer:        header_string(&parts.headers, header::REFERER),
      client_address: client_address(&parts.headers, peer),
    }))
  }
}

// ─── Bearer session ──────────────────────────────────────────────────────────

/// Present in a handler means the request carried a valid session token.
pub struct Session(pub SessionClaims);

impl<S, V> FromRequestParts<AppState<S, V>> for Session
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, V>,
  ) -> Result<Self, Self::Rejection> {
    let token = parts
      .headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.strip_prefix("Bearer "))
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    Ok(Session(state.identity.verify_token(token)?))
  }
}
