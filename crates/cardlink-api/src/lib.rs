//! JSON HTTP API for cardlink.
//!
//! Exposes an axum [`Router`] backed by any [`ProfileStore`] and
//! [`IdentityVerifier`]. TLS and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = cardlink_api::api_router(AppState::new(store, verifier, tokens, base_url));
//! ```

pub mod accounts;
pub mod analytics;
pub mod error;
pub mod events;
pub mod extract;
pub mod identity;
pub mod slug;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use cardlink_core::{
  analytics::AnalyticsEngine, engagement::EngagementTracker,
  identity::{IdentityLinker, IdentityVerifier}, slug::SlugRegistry,
  store::ProfileStore, token::SessionTokens,
};

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers. Built once at startup.
pub struct AppState<S, V> {
  pub store:      Arc<S>,
  pub slugs:      SlugRegistry<S>,
  pub identity:   IdentityLinker<S, V>,
  pub engagement: EngagementTracker<S>,
  pub analytics:  AnalyticsEngine<S>,
}

impl<S, V> Clone for AppState<S, V> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      slugs:      self.slugs.clone(),
      identity:   self.identity.clone(),
      engagement: self.engagement.clone(),
      analytics:  self.analytics.clone(),
    }
  }
}

impl<S, V> AppState<S, V>
where
  S: ProfileStore,
  V: IdentityVerifier,
{
  pub fn new(
    store: Arc<S>,
    verifier: Arc<V>,
    tokens: SessionTokens,
    public_base_url: impl Into<String>,
  ) -> Self {
    Self {
      slugs: SlugRegistry::new(Arc::clone(&store), public_base_url),
      identity: IdentityLinker::new(Arc::clone(&store), verifier, tokens),
      engagement: EngagementTracker::new(Arc::clone(&store)),
      analytics: AnalyticsEngine::new(Arc::clone(&store)),
      store,
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, V>(state: AppState<S, V>) -> Router<()>
where
  S: ProfileStore + 'static,
  V: IdentityVerifier + 'static,
{
  Router::new()
    // Slugs
    .route("/slug", post(slug::register::<S, V>))
    .route(
      "/slug/{slug}",
      get(slug::resolve::<S, V>).delete(slug::deactivate::<S, V>),
    )
    // Identity
    .route("/identity/link", post(identity::link::<S, V>))
    .route("/identity/login", post(identity::login::<S, V>))
    .route("/identity/verify", get(identity::verify))
    // Engagement
    .route("/events/view", post(events::view::<S, V>))
    .route("/events/contact-save", post(events::contact_save::<S, V>))
    // Reporting
    .route("/analytics", get(analytics::report::<S, V>))
    .route("/accounts", get(accounts::list::<S, V>))
    .with_state(state)
}
