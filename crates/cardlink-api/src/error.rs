//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use cardlink_core::ErrorKind;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error(transparent)]
  Core(#[from] cardlink_core::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::Core(e) => match e.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Auth => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Tracking | ErrorKind::Store => {
          StatusCode::INTERNAL_SERVER_ERROR
        }
      },
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }

    let message = match &self {
      ApiError::Core(e) => e.to_string(),
      other => other.to_string(),
    };
    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Bearer realm=\"cardlink\""),
      );
    }
    res
  }
}

/// Fail with 400 if a required string field is blank.
pub fn require(field: &str, value: &str) -> Result<(), ApiError> {
  if value.trim().is_empty() {
    return Err(ApiError::BadRequest(format!("missing {field}")));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  #[test]
  fn core_kinds_map_to_statuses() {
    let cases = [
      (cardlink_core::Error::Validation("x".into()), StatusCode::BAD_REQUEST),
      (cardlink_core::Error::TokenExpired, StatusCode::UNAUTHORIZED),
      (cardlink_core::Error::LinkSuperseded(Uuid::nil()), StatusCode::FORBIDDEN),
      (cardlink_core::Error::SlugTaken("s".into()), StatusCode::CONFLICT),
      (cardlink_core::Error::SlugNotFound("s".into()), StatusCode::NOT_FOUND),
      (
        cardlink_core::Error::store(std::io::Error::other("disk")),
        StatusCode::INTERNAL_SERVER_ERROR,
      ),
    ];
    for (err, status) in cases {
      assert_eq!(ApiError::from(err).status(), status);
    }
  }

  #[test]
  fn blank_fields_are_rejected() {
    assert!(require("proof", "  ").is_err());
    assert!(require("proof", "abc").is_ok());
  }
}
