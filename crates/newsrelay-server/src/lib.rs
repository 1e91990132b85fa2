//! The newsrelay server: a feed-to-event bridge with a page metadata
//! endpoint.

pub mod api_feeds;
pub mod api_metadata;
pub mod background;
pub mod bridge;
pub mod config;
pub mod feed_cache;
pub mod feeds;
pub mod host;
pub mod http;
pub mod locator;
pub mod metadata;
pub mod metadata_cache;
pub mod synth;
pub mod watermark;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use bridge::Bridge;
use metadata_cache::MetadataCache;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across all request handlers.
pub struct AppState {
    /// The bridge service, shared with the background tasks.
    pub bridge: Arc<Bridge>,
    /// Cache in front of the metadata endpoint.
    pub metadata_cache: MetadataCache,
    /// Client for metadata fetches.
    pub http: reqwest::Client,
    /// First path segment of the metadata endpoint, without slashes.
    pub og_prefix: String,
}

/// Maximum request body size (64 KiB).
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let metadata_route = format!("/{}/{{*target}}", state.og_prefix.trim_matches('/'));

    Router::new()
        .route("/health", get(health))
        .route("/api/feeds", post(api_feeds::register_feed_handler))
        .route("/api/events", get(api_feeds::query_events_handler))
        .route(&metadata_route, get(api_metadata::metadata_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
