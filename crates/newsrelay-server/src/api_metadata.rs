//! Page metadata endpoint.
//!
//! `GET /<prefix>/<target-url>` returns the metadata of the target page as
//! JSON. Results are cached; see [`crate::metadata_cache`].

use crate::metadata::fetch_metadata;
use crate::AppState;
use axum::{
    extract::{Path, RawQuery},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;

pub async fn metadata_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(target): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let target = match query {
        Some(query) => format!("{target}?{query}"),
        None => target,
    };
    tracing::info!(target_url = %target, "metadata requested");

    if let Some(record) = state.metadata_cache.get(&target) {
        return Json(record).into_response();
    }

    match fetch_metadata(&state.http, &target).await {
        Ok(record) => {
            state.metadata_cache.insert(target, record.clone());
            Json(record).into_response()
        }
        Err(e) if e.is_not_found() => (StatusCode::NOT_FOUND, "Not Found").into_response(),
        Err(e) => {
            tracing::warn!(target_url = %target, error = %e, "could not fetch metadata");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("could not fetch metadata: {e}")
                })),
            )
                .into_response()
        }
    }
}
