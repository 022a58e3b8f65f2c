use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::{ServerSettings, Settings};
use crate::server::handlers::{health, ingest, query, upload};
use crate::state::AppState;

/// Creates the application router.
///
/// Every endpoint is reachable both at the root and under `/api`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings);
    let body_limit = state.settings.ingestion.max_upload_bytes;

    Router::new()
        .merge(endpoints())
        .nest("/api", endpoints())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn endpoints() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health::health))
        .route("/health", get(health::health))
        .route("/query", post(query::query))
        .route("/embed/user", post(ingest::embed_user))
        .route("/upload", post(upload::upload_and_query))
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let mut origins = allowed_origins(&settings.server.cors_allowed_origins);
    if origins.is_empty() {
        tracing::warn!("No usable CORS origins configured; using local defaults");
        origins = allowed_origins(&ServerSettings::default().cors_allowed_origins);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn allowed_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect()
}
