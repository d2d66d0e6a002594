use crate::{
    auth::store::{CreateUserOutcome, UserStore},
    ensaluto::handlers::{valid_email, valid_password, valid_username},
    store::PgUserStore,
};
use axum::{extract::Extension, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct RegisterPayload {
    email: String,
    username: String,
    password: String,
}

#[utoipa::path(
    post,
    path= "/v1/register",
    request_body = RegisterPayload,
    responses (
        (status = 201, description = "User created"),
        (status = 400, description = "Missing or invalid payload"),
        (status = 409, description = "Username or email already taken"),
    ),
    tag= "register"
)]
#[instrument(skip(store, payload))]
pub async fn register(
    store: Extension<PgUserStore>,
    payload: Option<Json<RegisterPayload>>,
) -> (StatusCode, String) {
    let Some(Json(payload)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string());
    };

    if !valid_username(&payload.username) {
        return (StatusCode::BAD_REQUEST, "Invalid username".to_string());
    }

    if !valid_email(&payload.email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string());
    }

    if !valid_password(&payload.password) {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string());
    }

    match store
        .create(&payload.email, &payload.username, &payload.password)
        .await
    {
        Ok(CreateUserOutcome::Created(user)) => {
            debug!(username = %user.username, "User created");

            (StatusCode::CREATED, "User created".to_string())
        }

        Ok(CreateUserOutcome::Conflict) => {
            error!("User already exists");

            (StatusCode::CONFLICT, "User already exists".to_string())
        }

        Err(e) => {
            error!("Error creating user: {e:#}");

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error creating user".to_string(),
            )
        }
    }
}
