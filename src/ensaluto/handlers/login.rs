use crate::{
    auth::{LoginOutcome, LoginRequest, LoginResponse},
    ensaluto::{handlers::extract_client_ip, ServerAuthenticator},
};
use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct LoginPayload {
    username: String,
    password: String,
}

#[utoipa::path(
    post,
    path= "/v1/login",
    request_body = LoginPayload,
    responses (
        (status = 200, description = "Login successful", body = LoginResponse, content_type = "application/json"),
        (status = 400, description = "Missing or invalid payload"),
        (status = 401, description = "Unknown user or wrong password"),
    ),
    tag= "login"
)]
#[instrument(skip(authenticator, headers, payload))]
pub async fn login(
    authenticator: Extension<Arc<ServerAuthenticator>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Option<Json<LoginPayload>>,
) -> Response {
    let Some(Json(payload)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let origin = extract_client_ip(&headers).unwrap_or_else(|| addr.ip().to_string());

    let request = LoginRequest {
        username: payload.username,
        password: payload.password,
        origin,
    };

    match authenticator.authenticate(request).await {
        Ok(LoginOutcome::Success(response)) => {
            debug!("Login successful");

            (StatusCode::OK, Json(response)).into_response()
        }

        Ok(LoginOutcome::ValidationFailure { field, message }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "field": field, "message": message })),
        )
            .into_response(),

        Ok(LoginOutcome::AuthenticationFailure { code, .. }) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "message": "Invalid username or password",
                "code": code,
            })),
        )
            .into_response(),

        Err(e) => {
            error!("Login failed: {e:#}");

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Internal server error" })),
            )
                .into_response()
        }
    }
}
