//! Feed registration and event query endpoints.

use crate::bridge::RegisterError;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use newsrelay_types::{EntityMeta, Event, Filter, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Request body for `POST /api/feeds`.
#[derive(Debug, Deserialize)]
pub struct RegisterFeedRequest {
    /// Site or feed URL.
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nip05: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
}

impl RegisterFeedRequest {
    /// Profile fields, if the caller supplied any.
    fn meta(&self) -> Option<EntityMeta> {
        if self.name.is_none()
            && self.nip05.is_none()
            && self.picture.is_none()
            && self.banner.is_none()
        {
            return None;
        }
        Some(EntityMeta {
            name: self.name.clone().unwrap_or_default(),
            url: self.url.clone(),
            nip05: self.nip05.clone().unwrap_or_default(),
            picture: self.picture.clone().unwrap_or_default(),
            banner: self.banner.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterFeedResponse {
    pub pubkey: String,
    pub feed_url: String,
}

/// Query string for `GET /api/events`. List values are comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub kinds: Option<String>,
    #[serde(default)]
    pub since: Option<Timestamp>,
    #[serde(default)]
    pub until: Option<Timestamp>,
}

impl EventsQuery {
    fn into_filter(self) -> Result<Filter, ApiError> {
        let authors = split_list(self.authors.as_deref())
            .map(str::to_string)
            .collect();
        let kinds = self
            .kinds
            .as_deref()
            .map(|raw| {
                split_list(Some(raw))
                    .map(|k| {
                        k.parse::<u32>()
                            .map_err(|_| ApiError::BadRequest(format!("invalid kind: {k}")))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(Filter {
            authors,
            kinds,
            since: self.since,
            until: self.until,
            ..Filter::default()
        })
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("no feed found: {0}")]
    UnprocessableEntity(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<RegisterError> for ApiError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::Locate(_) => ApiError::UnprocessableEntity(e.to_string()),
            _ => ApiError::BadRequest(e.to_string()),
        }
    }
}

/// Handler for `POST /api/feeds`.
pub async fn register_feed_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<RegisterFeedRequest>,
) -> Result<(StatusCode, Json<RegisterFeedResponse>), ApiError> {
    let url = payload.url.trim();
    if url.is_empty() {
        return Err(ApiError::BadRequest("url is required".to_string()));
    }

    let registration = state
        .bridge
        .register(url, payload.meta())
        .await
        .map_err(|e| {
            tracing::warn!(url = %url, error = %e, "feed registration failed");
            ApiError::from(e)
        })?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterFeedResponse {
            pubkey: registration.pubkey,
            feed_url: registration.feed_url,
        }),
    ))
}

/// Handler for `GET /api/events`.
pub async fn query_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let filter = params.into_filter()?;
    Ok(Json(state.bridge.query(&filter).await))
}
