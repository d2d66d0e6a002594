use crate::{
    auth::access::{self, AccessTokenIssuer, KeyFooter},
    cli::globals::GlobalArgs,
    vault, APP_USER_AGENT,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use ed25519_dalek::VerifyingKey;
use secrecy::SecretString;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

const KEY_CACHE_TTL_SECONDS: u64 = 300;
const TRANSIT_KEY_NAME: &str = "ensaluto";
const TRANSIT_MOUNT_DEFAULT: &str = "transit";

/// `TransitIssuer` signs access tokens through Vault transit, so the Ed25519
/// private key never enters the process. It caches the public keyset for
/// republishing at `/v1/keys` and for picking the key version to sign with.
#[derive(Debug, Clone)]
pub struct TransitIssuer {
    issuer: String,
    audience: String,
    key_name: String,
    transit_mount: String,
    vault_url: String,
    vault_token: SecretString,
    client: reqwest::Client,
    cache: Arc<RwLock<Option<CachedKeySet>>>,
}

#[derive(Debug, Clone)]
struct CachedKeySet {
    latest_version: u32,
    keys: BTreeMap<u32, String>,
    fetched_at: Instant,
}

impl CachedKeySet {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(KEY_CACHE_TTL_SECONDS)
    }
}

/// Public keyset snapshot: every key version Vault still publishes, standard
/// base64, plus which version new signatures use.
#[derive(Debug, Clone)]
pub struct KeySnapshot {
    pub latest_version: u32,
    pub keys: BTreeMap<u32, String>,
}

impl KeySnapshot {
    /// Decode the snapshot into verifying keys for offline verification.
    ///
    /// # Errors
    /// Returns an error if any published key is not a valid Ed25519 key.
    pub fn verifying_keys(&self) -> Result<BTreeMap<u32, VerifyingKey>> {
        self.keys
            .iter()
            .map(|(version, key)| Ok((*version, access::decode_verifying_key(key)?)))
            .collect()
    }
}

impl TransitIssuer {
    /// Initialize the issuer from Vault transit and environment defaults.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the initial
    /// keyset fetch fails.
    pub async fn new(globals: &GlobalArgs) -> Result<Self> {
        let issuer = std::env::var("ENSALUTO_TOKEN_ISS")
            .unwrap_or_else(|_| "https://ensaluto.dev".to_string());
        let audience =
            std::env::var("ENSALUTO_TOKEN_AUD").unwrap_or_else(|_| "ensaluto".to_string());
        let transit_mount = std::env::var("ENSALUTO_TRANSIT_MOUNT")
            .unwrap_or_else(|_| TRANSIT_MOUNT_DEFAULT.to_string());

        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()?;

        let issuer = Self {
            issuer,
            audience,
            key_name: TRANSIT_KEY_NAME.to_string(),
            transit_mount,
            vault_url: globals.vault_url.clone(),
            vault_token: globals.vault_token.clone(),
            client,
            cache: Arc::new(RwLock::new(None)),
        };

        issuer.refresh_keys().await?;

        Ok(issuer)
    }

    /// Return the cached keyset, refreshing it when stale. A failed refresh
    /// falls back to the stale cache so verification keeps working through a
    /// Vault outage; only a cold cache turns the failure into an error.
    ///
    /// # Errors
    /// Returns an error if the keyset cannot be refreshed and none is cached.
    pub async fn key_snapshot(&self) -> Result<KeySnapshot> {
        let cached = { self.cache.read().await.clone() };
        if let Some(cache) = cached.clone() {
            if cache.is_fresh() {
                return Ok(KeySnapshot {
                    latest_version: cache.latest_version,
                    keys: cache.keys,
                });
            }
        }

        match self.refresh_keys().await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                if let Some(cache) = cached {
                    warn!(
                        error = %err,
                        latest_version = cache.latest_version,
                        "using stale transit keyset"
                    );
                    Ok(KeySnapshot {
                        latest_version: cache.latest_version,
                        keys: cache.keys,
                    })
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn refresh_keys(&self) -> Result<KeySnapshot> {
        let transit = vault::transit::fetch_ed25519_keys(
            &self.client,
            &self.vault_url,
            &self.vault_token,
            &self.transit_mount,
            &self.key_name,
        )
        .await
        .context("failed to fetch transit keys")?;

        info!(
            latest_version = transit.latest_version,
            keys = transit.keys.len(),
            "transit keyset refreshed"
        );

        let mut state = self.cache.write().await;
        *state = Some(CachedKeySet {
            latest_version: transit.latest_version,
            keys: transit.keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(KeySnapshot {
            latest_version: transit.latest_version,
            keys: transit.keys,
        })
    }
}

#[async_trait]
impl AccessTokenIssuer for TransitIssuer {
    async fn issue(&self, user_id: Uuid, username: &str) -> Result<String> {
        let snapshot = self.key_snapshot().await?;
        let key_version = snapshot.latest_version;

        let claims = access::make_claims(
            &self.issuer,
            &self.audience,
            user_id,
            username,
            access::DEFAULT_TTL_SECONDS,
        )?;
        let footer = KeyFooter::for_version(key_version);
        let signing_input = access::encode_signing_input(&claims, &footer)?;

        let start = Instant::now();
        let signature = vault::transit::sign_ed25519(
            &self.client,
            &self.vault_url,
            &self.vault_token,
            &self.transit_mount,
            &self.key_name,
            key_version,
            signing_input.pre_auth.as_slice(),
        )
        .await
        .context("Vault transit sign failed")?;

        let latency_ms = start.elapsed().as_millis();
        info!(
            key_version = signature.key_version,
            latency_ms, "vault transit sign completed"
        );

        if signature.key_version != key_version {
            return Err(anyhow!(
                "vault returned key version {} but expected {key_version}",
                signature.key_version
            ));
        }

        let signature_bytes = Base64::decode_vec(&signature.signature_base64)
            .context("failed to decode vault signature")?;
        let signature_bytes: [u8; 64] = signature_bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("invalid vault signature length"))?;

        Ok(access::build_token(
            &signing_input.payload,
            &signing_input.footer,
            &signature_bytes,
        ))
    }
}
