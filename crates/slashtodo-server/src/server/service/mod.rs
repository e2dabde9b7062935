//! HTTP surface of the todo service.
//!
//! ## Structure
//!
//! - [`handler`] - slash command and interactive action webhooks.
//! - [`admin`] - scoped dump and purge endpoints.

pub mod admin;
pub mod handler;

use crate::server::config::{ServerConfig, StoreConfig};
use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use slashtodo::{
    AdminTokens, IntegrationTokens, TodoRepository, format::CLOSE_ACTION_PATH,
    store::{Backend, MemoryBackend},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared by every request.
#[derive(Clone, Debug)]
pub struct AppState {
    pub repository: TodoRepository,
    pub tokens: IntegrationTokens,
    pub admin_tokens: AdminTokens,
    pub base_url: String,
}

impl AppState {
    pub fn new(config: &ServerConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            repository: TodoRepository::new(backend).with_max_attempts(config.max_attempts),
            tokens: config.tokens.clone(),
            admin_tokens: config.admin_tokens.clone(),
            base_url: config.base_url.clone(),
        }
    }
}

/// Opens the configured store.
pub async fn open_backend(store: &StoreConfig) -> anyhow::Result<Arc<dyn Backend>> {
    match store {
        StoreConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        #[cfg(feature = "redis")]
        StoreConfig::Redis { url } => {
            let backend = slashtodo::store::RedisBackend::connect(url).await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "redis"))]
        StoreConfig::Redis { .. } => {
            anyhow::bail!("STORE=redis requires building with the `redis` feature")
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/slashTodo", post(handler::slash_todo))
        .route(CLOSE_ACTION_PATH, post(handler::todo_close))
        .route("/readAll", get(admin::read_all))
        .route("/cleanAll", post(admin::clean_all).delete(admin::clean_all))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Invalid request or missing token").into_response()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header::CONTENT_TYPE};
    use http_body_util::BodyExt;
    use slashtodo::{KeyMint, RandSource, TimeSource};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tower::ServiceExt;

    pub const TOKEN: &str = "slash-token";
    pub const BASE_URL: &str = "https://hooks.example";

    struct FixedTime;

    impl TimeSource<u128> for FixedTime {
        fn current_millis(&self) -> u128 {
            1_714_557_600_000
        }
    }

    struct CountingRand(AtomicU64);

    impl RandSource<u128> for CountingRand {
        fn rand(&self) -> u128 {
            self.0.fetch_add(1, Ordering::Relaxed) as u128
        }
    }

    pub fn state(admin_tokens: &str) -> AppState {
        AppState {
            repository: TodoRepository::new(Arc::new(MemoryBackend::new()))
                .with_mint(KeyMint::new(FixedTime, CountingRand(AtomicU64::new(0)))),
            tokens: TOKEN.parse().unwrap(),
            admin_tokens: admin_tokens.parse().unwrap(),
            base_url: BASE_URL.to_owned(),
        }
    }

    /// Form-encodes the handful of characters slash command text uses.
    pub fn form(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(name, value)| {
                let value = value
                    .replace('%', "%25")
                    .replace('&', "%26")
                    .replace('|', "%7C")
                    .replace('+', "%2B")
                    .replace(' ', "+");
                format!("{name}={value}")
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    pub async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub async fn slash(state: &AppState, token: &str, user: &str, text: &str) -> (StatusCode, Vec<u8>) {
        let body = form(&[
            ("token", token),
            ("team_id", "T1"),
            ("channel_id", "C1"),
            ("user_id", user),
            ("user_name", &format!("{user}-name")),
            ("command", "/todo"),
            ("text", text),
        ]);
        let request = Request::post("/slashTodo")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        send(state, request).await
    }

    pub fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }
}
