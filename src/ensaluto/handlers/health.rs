use crate::GIT_COMMIT_HASH;
use axum::{
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Json},
};
use serde_json::json;

#[utoipa::path(
    get,
    path= "/v1/health",
    responses (
        (status = 200, description = "Service name, version and build", body = String, content_type = "application/json"),
    ),
    tag= "health"
)]
pub async fn health() -> impl IntoResponse {
    let body = Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "build": GIT_COMMIT_HASH,
    }));

    let short_hash = if GIT_COMMIT_HASH.len() > 7 {
        &GIT_COMMIT_HASH[0..7]
    } else {
        GIT_COMMIT_HASH
    };

    let mut headers = HeaderMap::new();
    let app = format!(
        "{}:{}:{short_hash}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    if let Ok(value) = HeaderValue::from_str(&app) {
        headers.insert("X-App", value);
    }

    (headers, body)
}
