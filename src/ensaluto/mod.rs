//! HTTP surface: router, documented routes and the shared state handed to
//! the handlers via extensions.

use crate::{
    auth::{token::RandomTokenGenerator, Authenticator, LoginResponse},
    cli::globals::GlobalArgs,
    ensaluto::handlers::{
        health::__path_health, keys::__path_keys, login, login::__path_login, register,
        register::__path_register,
    },
    store::PgUserStore,
    vault,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod issuer;

pub use self::issuer::TransitIssuer;

/// The authentication use case wired to production collaborators.
pub type ServerAuthenticator = Authenticator<PgUserStore, RandomTokenGenerator, TransitIssuer>;

#[derive(OpenApi)]
#[openapi(
    paths(health, register, login, keys),
    components(schemas(login::LoginPayload, register::RegisterPayload, LoginResponse)),
    tags(
        (name = "ensaluto", description = "User authentication API")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs) -> Result<()> {
    // Renew vault token, gracefully shutdown if failed
    let (tx, mut rx) = mpsc::unbounded_channel();

    vault::renew::try_renew(globals, tx).await?;

    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = PgUserStore::new(pool);
    let issuer = TransitIssuer::new(globals).await?;
    let authenticator = Arc::new(Authenticator::new(
        store.clone(),
        RandomTokenGenerator,
        issuer.clone(),
    ));

    let app = Router::new()
        .route("/", get(|| async { "🔐" }))
        .route("/v1/login", post(handlers::login))
        .route("/v1/register", post(handlers::register))
        .route("/v1/keys", get(handlers::keys))
        .merge(SwaggerUi::new("/v1/docs").url("/v1/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(authenticator))
                .layer(Extension(store))
                .layer(Extension(issuer)),
        )
        .route("/v1/health", get(handlers::health).options(handlers::health));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        rx.recv().await;
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_documents_every_route() {
        let doc = openapi();
        let paths = &doc.paths.paths;
        for route in ["/v1/health", "/v1/login", "/v1/register", "/v1/keys"] {
            assert!(paths.contains_key(route), "missing {route}");
        }
    }
}
