//! JSON-over-HTTP surface under `/api/v1`.

mod admissions;
mod error;
mod events;
mod health;
mod library;
mod rooms;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::engine::Engine;
use crate::model::{Ms, Span};
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

/// All routes, with per-route request metrics.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health::health))
        .merge(rooms::routes())
        .merge(events::routes())
        .merge(admissions::routes())
        .merge(library::routes());

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

/// `router` plus tracing, request timeout and the in-flight limit.
pub fn app(state: AppState, config: &Config) -> Router {
    router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(ConcurrencyLimitLayer::new(config.max_in_flight))
            .layer(TimeoutLayer::new(config.request_timeout)),
    )
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".into());
    let method = req.method().to_string();
    let response = next.run(req).await;
    observability::record_request(
        &method,
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

// ── Time conversion at the boundary ──────────────────────────────

pub(crate) fn to_ms(at: DateTime<Utc>) -> Ms {
    at.timestamp_millis()
}

pub(crate) fn from_ms(ms: Ms) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// `[start, end)` from two RFC 3339 instants.
pub(crate) fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Span, ApiError> {
    Span::checked(to_ms(start), to_ms(end))
        .ok_or_else(|| ApiError::validation("start_time must be before end_time"))
}

/// Requester key for numeric user and student ids.
pub(crate) fn user_key(id: u64) -> String {
    id.to_string()
}

pub(crate) fn parse_user_key(key: &str) -> Option<u64> {
    key.parse().ok()
}

/// Empty and whitespace-only strings count as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
