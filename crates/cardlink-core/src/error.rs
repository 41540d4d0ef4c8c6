//! Error types for `cardlink-core`.

use thiserror::Error;
use uuid::Uuid;

/// Boxed error produced by a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("invalid identity proof: {0}")]
  InvalidProof(String),

  #[error("invalid session token: {0}")]
  InvalidToken(String),

  #[error("session token expired")]
  TokenExpired,

  #[error("account not found: {0}")]
  AccountNotFound(Uuid),

  #[error("slug not found: {0}")]
  SlugNotFound(String),

  #[error("identity not registered: {0}")]
  IdentityNotRegistered(String),

  #[error("slug {given:?} does not match the slug registered for account {account_id}")]
  SlugMismatch { account_id: Uuid, given: String },

  #[error("slug {slug:?} does not belong to account {account_id}")]
  NotSlugOwner { account_id: Uuid, slug: String },

  #[error("identity link for account {0} has been superseded")]
  LinkSuperseded(Uuid),

  #[error("account {0} is already linked to an identity; log in instead")]
  AlreadyLinked(Uuid),

  #[error("identity {0} is already linked to another account")]
  IdentityTaken(String),

  #[error("slug {0} is registered to another account")]
  SlugTaken(String),

  #[error("tracking failed: {0}")]
  Tracking(#[source] BoxError),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// The coarse category of an [`Error`]; the HTTP layer maps these onto
/// status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Validation,
  Auth,
  Forbidden,
  Conflict,
  NotFound,
  Tracking,
  Store,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::InvalidProof(_) | Self::InvalidToken(_) | Self::TokenExpired => {
        ErrorKind::Auth
      }
      Self::SlugMismatch { .. }
      | Self::NotSlugOwner { .. }
      | Self::LinkSuperseded(_) => ErrorKind::Forbidden,
      Self::AlreadyLinked(_) | Self::IdentityTaken(_) | Self::SlugTaken(_) => {
        ErrorKind::Conflict
      }
      Self::AccountNotFound(_)
      | Self::SlugNotFound(_)
      | Self::IdentityNotRegistered(_) => ErrorKind::NotFound,
      Self::Tracking(_) => ErrorKind::Tracking,
      Self::Store(_) | Self::Serialization(_) => ErrorKind::Store,
    }
  }

  /// Wrap a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
