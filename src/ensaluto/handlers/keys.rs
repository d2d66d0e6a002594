use crate::ensaluto::issuer::TransitIssuer;
use axum::{
    extract::Extension,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{error, instrument};

#[utoipa::path(
    get,
    path= "/v1/keys",
    responses (
        (status = 200, description = "Verification keys by version, base64 encoded", body = String, content_type = "application/json"),
    ),
    tag= "keys"
)]
#[instrument(skip(issuer))]
pub async fn keys(issuer: Extension<TransitIssuer>) -> Response {
    match issuer.key_snapshot().await {
        Ok(snapshot) => {
            // version ids match the `kid` carried in token footers
            let keys: BTreeMap<String, String> = snapshot
                .keys
                .iter()
                .map(|(version, key)| (format!("v{version}"), key.clone()))
                .collect();

            let mut headers = HeaderMap::new();
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=300"),
            );

            let body = json!({
                "latest": format!("v{}", snapshot.latest_version),
                "keys": keys,
            });

            (StatusCode::OK, headers, Json(body)).into_response()
        }

        Err(e) => {
            error!("Failed to render published keys: {e:#}");

            (StatusCode::INTERNAL_SERVER_ERROR, "{}".to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::globals::GlobalArgs;
    use anyhow::Result;
    use axum::body::to_bytes;
    use secrecy::SecretString;
    use serde_json::Value;
    use std::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    async fn test_issuer(server: &MockServer) -> Result<Extension<TransitIssuer>> {
        let mut globals = GlobalArgs::new(server.uri());
        globals.set_token(SecretString::from("vault-token".to_string()));
        Ok(Extension(TransitIssuer::new(&globals).await?))
    }

    #[tokio::test]
    async fn keys_lists_published_versions() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/transit/keys/ensaluto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "type": "ed25519",
                    "latest_version": 2,
                    "keys": {
                        "1": { "public_key": "a2V5LW9uZQ==" },
                        "2": { "public_key": "a2V5LXR3bw==" }
                    }
                }
            })))
            .mount(&server)
            .await;

        let issuer = test_issuer(&server).await?;
        let response = keys(issuer).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(HeaderValue::as_bytes),
            Some(b"public, max-age=300".as_slice())
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        assert_eq!(body["latest"], "v2");
        assert_eq!(body["keys"]["v1"], "a2V5LW9uZQ==");
        assert_eq!(body["keys"]["v2"], "a2V5LXR3bw==");
        Ok(())
    }
}
