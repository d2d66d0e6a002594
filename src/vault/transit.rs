use crate::vault;
use anyhow::{anyhow, Result};
use base64ct::{Base64, Encoding};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info_span, instrument, Instrument};

/// Ed25519 public keys published by the transit mount, keyed by key version.
#[derive(Debug, Clone)]
pub struct TransitKeySet {
    pub latest_version: u32,
    pub keys: BTreeMap<u32, String>,
}

/// A signature returned by `transit/sign`, split out of Vault's
/// `vault:v<version>:<base64>` wire format.
#[derive(Debug, Clone)]
pub struct VaultSignature {
    pub key_version: u32,
    pub signature_base64: String,
}

fn parse_signature(signature: &str) -> Result<VaultSignature> {
    let mut parts = signature.split(':');
    let prefix = parts
        .next()
        .ok_or_else(|| anyhow!("invalid vault signature"))?;
    let version_part = parts
        .next()
        .ok_or_else(|| anyhow!("invalid vault signature"))?;
    let sig_b64 = parts
        .next()
        .ok_or_else(|| anyhow!("invalid vault signature"))?;
    if parts.next().is_some() {
        return Err(anyhow!("invalid vault signature"));
    }
    if prefix != "vault" {
        return Err(anyhow!("invalid vault signature prefix"));
    }
    let version = version_part
        .strip_prefix('v')
        .ok_or_else(|| anyhow!("invalid vault signature version"))?;
    let key_version = version
        .parse::<u32>()
        .map_err(|_| anyhow!("invalid key version"))?;
    Ok(VaultSignature {
        key_version,
        signature_base64: sig_b64.to_string(),
    })
}

fn transit_path(mount: &str, suffix: &str) -> String {
    let mount = mount.trim_matches('/');
    format!("/v1/{mount}/{suffix}")
}

/// Fetch the Ed25519 public keys for `key_name` from the transit mount.
///
/// # Errors
/// Returns an error if the Vault request fails, the key is not an Ed25519
/// key, or the response carries no public keys.
#[instrument(skip(client, vault_token))]
pub async fn fetch_ed25519_keys(
    client: &Client,
    vault_url: &str,
    vault_token: &SecretString,
    transit_mount: &str,
    key_name: &str,
) -> Result<TransitKeySet> {
    let keys_url = vault::endpoint_url(
        vault_url,
        &transit_path(transit_mount, &format!("keys/{key_name}")),
    )?;

    let span = info_span!(
        "vault.transit_keys",
        http.method = "GET",
        url = %keys_url
    );
    let response = client
        .get(&keys_url)
        .header("X-Vault-Token", vault_token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let json_response: Value = response.json().await?;

        return Err(anyhow!(
            "{} - {}, {}",
            keys_url,
            status,
            vault::vault_error_message(&json_response)
        ));
    }

    let json_response: Value = response.json().await?;
    let data = json_response
        .get("data")
        .ok_or_else(|| anyhow!("Error parsing JSON response: no data found"))?;

    let key_type = data.get("type").and_then(Value::as_str).unwrap_or("");
    if key_type != "ed25519" {
        return Err(anyhow!("unexpected transit key type: {key_type}"));
    }

    let latest_version = data
        .get("latest_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no latest_version found"))?;
    let latest_version = u32::try_from(latest_version)
        .map_err(|_| anyhow!("invalid key version: {latest_version}"))?;

    let keys_obj = data
        .get("keys")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no keys found"))?;

    let mut keys = BTreeMap::new();
    for (version_str, entry) in keys_obj {
        let version = version_str
            .parse::<u32>()
            .map_err(|_| anyhow!("invalid transit key version: {version_str}"))?;
        if let Some(public_key) = entry.get("public_key").and_then(Value::as_str) {
            keys.insert(version, public_key.to_string());
        }
    }

    if keys.is_empty() {
        return Err(anyhow!("no public keys found in transit response"));
    }

    Ok(TransitKeySet {
        latest_version,
        keys,
    })
}

/// Sign `signing_input` with the named transit key at `key_version`.
///
/// # Errors
/// Returns an error if the Vault request fails or the returned signature does
/// not parse.
#[instrument(skip(client, vault_token, signing_input))]
pub async fn sign_ed25519(
    client: &Client,
    vault_url: &str,
    vault_token: &SecretString,
    transit_mount: &str,
    key_name: &str,
    key_version: u32,
    signing_input: &[u8],
) -> Result<VaultSignature> {
    let sign_url = vault::endpoint_url(
        vault_url,
        &transit_path(transit_mount, &format!("sign/{key_name}")),
    )?;
    let input_b64 = Base64::encode_string(signing_input);

    let payload = json!({
        "input": input_b64,
        "key_version": key_version,
    });

    let span = info_span!(
        "vault.transit_sign",
        http.method = "POST",
        url = %sign_url
    );
    let response = client
        .post(&sign_url)
        .header("X-Vault-Token", vault_token.expose_secret())
        .json(&payload)
        .send()
        .instrument(span)
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let json_response: Value = response.json().await?;

        return Err(anyhow!(
            "{} - {}, {}",
            sign_url,
            status,
            vault::vault_error_message(&json_response)
        ));
    }

    let json_response: Value = response.json().await?;
    let signature = json_response
        .get("data")
        .and_then(|v| v.get("signature"))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no signature found"))?;

    parse_signature(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    #[test]
    fn parse_signature_splits_version_and_payload() -> Result<()> {
        let signature = parse_signature("vault:v2:aGVsbG8=")?;
        assert_eq!(signature.key_version, 2);
        assert_eq!(signature.signature_base64, "aGVsbG8=");
        Ok(())
    }

    #[test]
    fn parse_signature_rejects_foreign_prefix() {
        assert!(parse_signature("hsm:v1:aGVsbG8=").is_err());
    }

    #[test]
    fn parse_signature_rejects_bad_version() {
        assert!(parse_signature("vault:1:aGVsbG8=").is_err());
        assert!(parse_signature("vault:vx:aGVsbG8=").is_err());
    }

    #[test]
    fn parse_signature_rejects_extra_parts() {
        assert!(parse_signature("vault:v1:aGVsbG8=:extra").is_err());
        assert!(parse_signature("vault:v1").is_err());
    }

    #[test]
    fn transit_path_trims_mount_slashes() {
        assert_eq!(transit_path("transit", "keys/ensaluto"), "/v1/transit/keys/ensaluto");
        assert_eq!(transit_path("/transit/", "sign/ensaluto"), "/v1/transit/sign/ensaluto");
    }

    #[tokio::test]
    async fn fetch_ed25519_keys_parses_keyset() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let token = SecretString::from("vault-token".to_string());

        Mock::given(method("GET"))
            .and(path("/v1/transit/keys/ensaluto"))
            .and(header("X-Vault-Token", "vault-token"))
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

        let client = Client::new();
        let keyset =
            fetch_ed25519_keys(&client, &server.uri(), &token, "transit", "ensaluto").await?;

        assert_eq!(keyset.latest_version, 2);
        assert_eq!(keyset.keys.len(), 2);
        assert_eq!(keyset.keys.get(&1).map(String::as_str), Some("a2V5LW9uZQ=="));
        assert_eq!(keyset.keys.get(&2).map(String::as_str), Some("a2V5LXR3bw=="));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_ed25519_keys_rejects_foreign_key_type() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let token = SecretString::from("vault-token".to_string());

        Mock::given(method("GET"))
            .and(path("/v1/transit/keys/ensaluto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "type": "rsa-2048",
                    "latest_version": 1,
                    "keys": { "1": { "public_key": "ignored" } }
                }
            })))
            .mount(&server)
            .await;

        let client = Client::new();
        let result =
            fetch_ed25519_keys(&client, &server.uri(), &token, "transit", "ensaluto").await;

        let err = result.err().ok_or_else(|| anyhow!("expected error"))?;
        assert!(err.to_string().contains("unexpected transit key type"));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_ed25519_keys_errors_on_empty_keyset() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let token = SecretString::from("vault-token".to_string());

        Mock::given(method("GET"))
            .and(path("/v1/transit/keys/ensaluto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "type": "ed25519",
                    "latest_version": 1,
                    "keys": {}
                }
            })))
            .mount(&server)
            .await;

        let client = Client::new();
        let result =
            fetch_ed25519_keys(&client, &server.uri(), &token, "transit", "ensaluto").await;

        let err = result.err().ok_or_else(|| anyhow!("expected error"))?;
        assert!(err.to_string().contains("no public keys"));
        Ok(())
    }

    #[tokio::test]
    async fn sign_ed25519_parses_vault_signature() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let token = SecretString::from("vault-token".to_string());
        let input_b64 = Base64::encode_string(b"signing-input");

        Mock::given(method("POST"))
            .and(path("/v1/transit/sign/ensaluto"))
            .and(header("X-Vault-Token", "vault-token"))
            .and(body_json(json!({ "input": input_b64, "key_version": 3 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "signature": "vault:v3:c2lnbmF0dXJl" }
            })))
            .mount(&server)
            .await;

        let client = Client::new();
        let signature = sign_ed25519(
            &client,
            &server.uri(),
            &token,
            "transit",
            "ensaluto",
            3,
            b"signing-input",
        )
        .await?;

        assert_eq!(signature.key_version, 3);
        assert_eq!(signature.signature_base64, "c2lnbmF0dXJl");
        Ok(())
    }

    #[tokio::test]
    async fn sign_ed25519_errors_on_failure_status() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let token = SecretString::from("vault-token".to_string());

        Mock::given(method("POST"))
            .and(path("/v1/transit/sign/ensaluto"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errors": ["permission denied"]
            })))
            .mount(&server)
            .await;

        let client = Client::new();
        let result =
            sign_ed25519(&client, &server.uri(), &token, "transit", "ensaluto", 1, b"x").await;

        let err = result.err().ok_or_else(|| anyhow!("expected error"))?;
        assert!(err.to_string().contains("permission denied"));
        Ok(())
    }
}
