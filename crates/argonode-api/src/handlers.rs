//! HTTP handlers

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

use crate::cache::SubscriptionCache;

const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// Liveness greeting
pub async fn root() -> &'static str {
    "Hello world!"
}

/// Current subscription payload; empty until bootstrap publishes one
pub async fn subscription(State(cache): State<SubscriptionCache>) -> impl IntoResponse {
    let payload = cache.snapshot();
    debug!("Serving subscription ({} bytes)", payload.len());

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PLAIN_TEXT)],
        payload.as_str().to_owned(),
    )
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
