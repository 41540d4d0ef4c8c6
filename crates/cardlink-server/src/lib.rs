//! HTTP server assembly for cardlink.
//!
//! Turns a [`ServerConfig`] and an opened [`SqliteStore`] into the shared
//! [`AppState`] and wraps the API router in the tracing and timeout layers.

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, http::StatusCode};
use cardlink_api::AppState;
use cardlink_core::{
  Error, Result,
  identity::SignedAssertionVerifier,
  token::{SessionTokens, Signer},
};
use cardlink_store_sqlite::SqliteStore;
use chrono::TimeDelta;
use serde::Deserialize;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CARDLINK_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  /// Prefix of every public card URL, e.g. `https://cards.example.com`.
  pub base_url:             String,
  pub store_path:           PathBuf,
  /// Hex-encoded session-token key, at least 32 bytes.
  pub token_secret:         String,
  /// Hex-encoded key shared with the identity gateway.
  pub identity_secret:      String,
  #[serde(default = "default_token_ttl_days")]
  pub token_ttl_days:       i64,
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_token_ttl_days() -> i64 { 7 }
fn default_request_timeout_secs() -> u64 { 10 }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

// ─── Application state ───────────────────────────────────────────────────────

pub type ServerState = AppState<SqliteStore, SignedAssertionVerifier>;

/// Build the shared state once at startup.
pub fn build_state(config: &ServerConfig, store: SqliteStore) -> Result<ServerState> {
  if config.token_ttl_days <= 0 {
    return Err(Error::Validation("token_ttl_days must be positive".into()));
  }

  let tokens = SessionTokens::new(Signer::from_hex(&config.token_secret)?)
    .with_ttl(TimeDelta::days(config.token_ttl_days));
  let verifier =
    SignedAssertionVerifier::new(Signer::from_hex(&config.identity_secret)?);

  Ok(AppState::new(
    Arc::new(store),
    Arc::new(verifier),
    tokens,
    config.base_url.clone(),
  ))
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// The API router with request tracing and a per-request timeout (`408`).
pub fn router(state: ServerState, request_timeout: Duration) -> Router {
  cardlink_api::api_router(state)
    .layer(TimeoutLayer::with_status_code(
      StatusCode::REQUEST_TIMEOUT,
      request_timeout,
    ))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, header},
  };
  use cardlink_core::{
    ErrorKind,
    account::NewAccount,
    event::EventKind,
    store::ProfileStore as _,
  };
  use chrono::Utc;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  const TOKEN_KEY: [u8; 32] = [9; 32];
  const IDENTITY_KEY: [u8; 32] = [7; 32];

  fn config() -> ServerConfig {
    ServerConfig {
      host:                 "127.0.0.1".to_string(),
      port:                 8080,
      base_url:             "https://cards.example.com".to_string(),
      store_path:           PathBuf::from(":memory:"),
      token_secret:         hex::encode(TOKEN_KEY),
      identity_secret:      hex::encode(IDENTITY_KEY),
      token_ttl_days:       7,
      request_timeout_secs: 10,
    }
  }

  async fn make_state() -> ServerState {
    let store = SqliteStore::open_in_memory().await.unwrap();
    build_state(&config(), store).unwrap()
  }

  /// The gateway side of the identity handshake.
  fn proof(external_id: &str) -> String {
    SignedAssertionVerifier::new(Signer::new(IDENTITY_KEY.to_vec()).unwrap())
      .mint(external_id, Some("jane@gmail.example"), Utc::now())
      .unwrap()
  }

  async fn seed(state: &ServerState, name: &str, company: Option<&str>) -> Uuid {
    state
      .store
      .create_account(NewAccount {
        email: Some(format!("{}@example.com", name.to_lowercase())),
        phone: Some("+1 555 0100".into()),
        company: company.map(str::to_owned),
        ..NewAccount::named(name)
      })
      .await
      .unwrap()
      .account_id
  }

  async fn oneshot_raw(
    state:   ServerState,
    method:  &str,
    uri:     &str,
    headers: Vec<(header::HeaderName, &str)>,
    body:    Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };

    let resp = router(state, Duration::from_secs(10))
      .oneshot(req)
      .await
      .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  async fn register(state: &ServerState, account_id: Uuid) -> String {
    let (status, body) = oneshot_raw(
      state.clone(),
      "POST",
      "/slug",
      vec![],
      Some(json!({ "account_id": account_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["slug"].as_str().unwrap().to_owned()
  }

  async fn link(
    state:       &ServerState,
    account_id:  Uuid,
    slug:        &str,
    external_id: &str,
  ) -> (StatusCode, Value) {
    oneshot_raw(
      state.clone(),
      "POST",
      "/identity/link",
      vec![],
      Some(json!({
        "account_id":  account_id,
        "slug":        slug,
        "external_id": external_id,
        "email":       "jane@gmail.example",
        "proof":       proof(external_id),
      })),
    )
    .await
  }

  // ── Configuration ───────────────────────────────────────────────────────────

  #[test]
  fn config_defaults_apply() {
    let toml = r#"
      base_url        = "https://cards.example.com"
      store_path      = "~/.local/share/cardlink/cardlink.db"
      token_secret    = "00"
      identity_secret = "00"
    "#;
    let cfg: ServerConfig = config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();

    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert_eq!(cfg.token_ttl_days, 7);
    assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
  }

  #[tokio::test]
  async fn short_secrets_are_refused() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let cfg = ServerConfig { token_secret: "abcd".into(), ..config() };
    let err = build_state(&cfg, store).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
  }

  // ── Slugs ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn register_and_resolve_slug() {
    let state = make_state().await;
    let id = seed(&state, "Jane Doe", None).await;

    let (status, body) = oneshot_raw(
      state.clone(),
      "POST",
      "/slug",
      vec![],
      Some(json!({ "account_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let slug = body["slug"].as_str().unwrap();
    assert!(slug.starts_with("jane-doe-"));
    assert_eq!(
      body["public_url"].as_str().unwrap(),
      format!("https://cards.example.com/{slug}")
    );

    let (status, body) = oneshot_raw(
      state.clone(),
      "GET",
      &format!("/slug/{slug}"),
      vec![(header::USER_AGENT, "test-agent")],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "Jane Doe");
    assert_eq!(body["account_id"], json!(id));
  }

  #[tokio::test]
  async fn resolving_a_slug_records_a_view_in_the_background() {
    let state = make_state().await;
    let id = seed(&state, "Jane Doe", None).await;
    let slug = register(&state, id).await;

    let (status, _) = oneshot_raw(
      state.clone(),
      "GET",
      &format!("/slug/{slug}"),
      vec![(header::REFERER, "https://example.org/")],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut views = 0;
    for _ in 0..100 {
      views = state.store.get_account(id).await.unwrap().unwrap().total_views;
      if views == 1 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(views, 1);

    let events = state.store.recent_events(EventKind::View, 1).await.unwrap();
    assert_eq!(events[0].slug.as_deref(), Some(slug.as_str()));
    assert_eq!(events[0].request.referer.as_deref(), Some("https://example.org/"));
  }

  #[tokio::test]
  async fn register_slug_errors() {
    let state = make_state().await;

    let (status, body) =
      oneshot_raw(state.clone(), "POST", "/slug", vec![], Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = oneshot_raw(
      state.clone(),
      "POST",
      "/slug",
      vec![],
      Some(json!({ "account_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let nameless = state
      .store
      .create_account(NewAccount::default())
      .await
      .unwrap()
      .account_id;
    let (status, _) = oneshot_raw(
      state,
      "POST",
      "/slug",
      vec![],
      Some(json!({ "account_id": nameless })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  fn bearer(state: &ServerState, account_id: Uuid) -> String {
    let token = state
      .identity
      .issue_token(account_id, "jane@example.com")
      .unwrap();
    format!("Bearer {token}")
  }

  #[tokio::test]
  async fn deactivated_slug_stops_resolving() {
    let state = make_state().await;
    let id = seed(&state, "Jane Doe", None).await;
    let slug = register(&state, id).await;
    let uri = format!("/slug/{slug}");
    let owner = bearer(&state, id);

    let (status, _) = oneshot_raw(
      state.clone(),
      "DELETE",
      &uri,
      vec![(header::AUTHORIZATION, owner.as_str())],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = oneshot_raw(state.clone(), "GET", &uri, vec![], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = oneshot_raw(
      state,
      "DELETE",
      "/slug/nobody-000000",
      vec![(header::AUTHORIZATION, owner.as_str())],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn deactivation_requires_the_owners_token() {
    let state = make_state().await;
    let jane = seed(&state, "Jane Doe", None).await;
    let john = seed(&state, "John Roe", None).await;
    let slug = register(&state, jane).await;
    let uri = format!("/slug/{slug}");

    let (status, _) = oneshot_raw(state.clone(), "DELETE", &uri, vec![], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let other = bearer(&state, john);
    let (status, body) = oneshot_raw(
      state.clone(),
      "DELETE",
      &uri,
      vec![(header::AUTHORIZATION, other.as_str())],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    let (status, _) = oneshot_raw(state.clone(), "GET", &uri, vec![], None).await;
    assert_eq!(status, StatusCode::OK);

    let owner = bearer(&state, jane);
    let (status, _) = oneshot_raw(
      state,
      "DELETE",
      &uri,
      vec![(header::AUTHORIZATION, owner.as_str())],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
  }

  // ── Identity ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn link_login_and_verify() {
    let state = make_state().await;
    let id = seed(&state, "Jane Doe", None).await;
    let slug = register(&state, id).await;

    let (status, body) = link(&state, id, &slug, "g-1").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({ "account_id": id, "linked": true }));

    let (status, body) = oneshot_raw(
      state.clone(),
      "POST",
      "/identity/login",
      vec![],
      Some(json!({ "proof": proof("g-1") })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["account"]["account_id"], json!(id));
    let bearer = format!("Bearer {}", body["token"].as_str().unwrap());

    let (status, body) = oneshot_raw(
      state.clone(),
      "GET",
      "/identity/verify",
      vec![(header::AUTHORIZATION, bearer.as_str())],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["claims"]["account_id"], json!(id));
    assert_eq!(body["claims"]["role"], "user");
  }

  #[tokio::test]
  async fn verify_rejects_missing_and_forged_tokens() {
    let state = make_state().await;

    let (status, _) =
      oneshot_raw(state.clone(), "GET", "/identity/verify", vec![], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = SessionTokens::new(Signer::new(vec![1u8; 32]).unwrap())
      .issue(Uuid::new_v4(), "x@example.com")
      .unwrap();
    let bearer = format!("Bearer {forged}");
    let (status, body) = oneshot_raw(
      state,
      "GET",
      "/identity/verify",
      vec![(header::AUTHORIZATION, bearer.as_str())],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
  }

  #[tokio::test]
  async fn link_errors_map_to_statuses() {
    let state = make_state().await;
    let jane = seed(&state, "Jane Doe", None).await;
    let john = seed(&state, "John Roe", None).await;
    let jane_slug = register(&state, jane).await;
    let john_slug = register(&state, john).await;

    let (status, _) = link(&state, jane, &john_slug, "g-1").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = link(&state, jane, &jane_slug, "g-1").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = link(&state, jane, &jane_slug, "g-2").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = link(&state, john, &john_slug, "g-1").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = oneshot_raw(
      state.clone(),
      "POST",
      "/identity/link",
      vec![],
      Some(json!({
        "account_id":  john,
        "slug":        john_slug,
        "external_id": "g-3",
        "email":       "john@gmail.example",
        "proof":       "",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = oneshot_raw(
      state,
      "POST",
      "/identity/link",
      vec![],
      Some(json!({
        "account_id":  john,
        "slug":        john_slug,
        "external_id": "g-3",
        "email":       "john@gmail.example",
        "proof":       "forged.proof",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn login_errors_map_to_statuses() {
    let state = make_state().await;

    let (status, _) = oneshot_raw(
      state.clone(),
      "POST",
      "/identity/login",
      vec![],
      Some(json!({ "proof": proof("g-unknown") })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = oneshot_raw(
      state.clone(),
      "POST",
      "/identity/login",
      vec![],
      Some(json!({ "proof": "garbage" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
      oneshot_raw(state, "POST", "/identity/login", vec![], Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Engagement and reporting ────────────────────────────────────────────────

  #[tokio::test]
  async fn tracking_endpoints_capture_request_metadata() {
    let state = make_state().await;
    let id = seed(&state, "Jane Doe", None).await;

    let (status, body) = oneshot_raw(
      state.clone(),
      "POST",
      "/events/view",
      vec![
        (header::USER_AGENT, "Mozilla/5.0"),
        (header::HeaderName::from_static("x-forwarded-for"), "203.0.113.9, 10.0.0.1"),
      ],
      Some(json!({ "account_id": id, "slug": "jane", "metadata": { "via": "qr" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "tracked": true }));

    let (status, _) = oneshot_raw(
      state.clone(),
      "POST",
      "/events/contact-save",
      vec![],
      Some(json!({ "account_id": id, "metadata": { "format": "vcf" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let view = &state.store.recent_events(EventKind::View, 1).await.unwrap()[0];
    assert_eq!(view.request.user_agent.as_deref(), Some("Mozilla/5.0"));
    assert_eq!(view.request.client_address.as_deref(), Some("203.0.113.9"));
    assert_eq!(view.metadata, Some(json!({ "via": "qr" })));

    let account = state.store.get_account(id).await.unwrap().unwrap();
    assert_eq!(account.total_views, 1);
    assert_eq!(account.total_contact_saves, 1);
  }

  #[tokio::test]
  async fn tracking_errors_map_to_statuses() {
    let state = make_state().await;

    let (status, _) = oneshot_raw(
      state.clone(),
      "POST",
      "/events/view",
      vec![],
      Some(json!({ "slug": "jane" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = oneshot_raw(
      state,
      "POST",
      "/events/contact-save",
      vec![],
      Some(json!({ "account_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn analytics_report() {
    let state = make_state().await;
    let jane = seed(&state, "Jane", Some("Acme")).await;
    seed(&state, "John", Some("Acme")).await;
    seed(&state, "Ann", None).await;

    oneshot_raw(
      state.clone(),
      "POST",
      "/events/view",
      vec![],
      Some(json!({ "account_id": jane })),
    )
    .await;

    let (status, body) = oneshot_raw(state, "GET", "/analytics", vec![], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_users"], 3);
    assert_eq!(body["active_users"], 3);
    assert_eq!(body["growth_rate"], "100%");
    assert_eq!(body["total_profile_views"], 1);
    assert_eq!(body["top_companies"][0], json!({ "company": "Acme", "count": 2 }));
    assert_eq!(body["top_viewed_cards"][0]["account_id"], json!(jane));
    assert_eq!(body["recent_views"][0]["display_name"], "Jane");
    assert_eq!(body["monthly_stats"].as_array().unwrap().len(), 6);
  }

  #[tokio::test]
  async fn accounts_listing_filters_by_substring() {
    let state = make_state().await;
    seed(&state, "Jane", Some("Acme")).await;
    seed(&state, "John", Some("Globex")).await;

    let (status, body) =
      oneshot_raw(state.clone(), "GET", "/accounts?q=acm", vec![], None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body
      .as_array()
      .unwrap()
      .iter()
      .map(|a| a["display_name"].as_str().unwrap().to_owned())
      .collect();
    assert_eq!(names, ["Jane"]);

    let (_, body) =
      oneshot_raw(state, "GET", "/accounts?limit=1", vec![], None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
  }
}
