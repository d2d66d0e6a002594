//! Access credentials are PASETO v4.public tokens: the payload carries the
//! user id and username, the footer names the signing key version, and the
//! Ed25519 signature covers the pre-authentication encoding of both. Signing
//! happens out of process (Vault transit); this module owns the token format
//! and offline verification.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const TOKEN_HEADER: &str = "v4.public.";

pub const DEFAULT_TTL_SECONDS: i64 = 300;
const MIN_TTL_SECONDS: i64 = 60;
const MAX_TTL_SECONDS: i64 = 900;

const SIGNATURE_LENGTH: usize = 64;
const PUBLIC_KEY_LENGTH: usize = 32;

/// Issues signed access credentials binding a user identity.
#[async_trait]
pub trait AccessTokenIssuer: Send + Sync {
    /// # Errors
    /// Returns an error if the signing key is unavailable or signing fails.
    async fn issue(&self, user_id: Uuid, username: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub uname: String,
    pub iat: String,
    pub exp: String,
    pub jti: String,
}

/// Token footer; `kid` is `v<transit key version>` so verifiers can pick the
/// matching public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFooter {
    pub kid: String,
}

impl KeyFooter {
    #[must_use]
    pub fn for_version(version: u32) -> Self {
        Self {
            kid: format!("v{version}"),
        }
    }

    /// # Errors
    /// Returns an error if the kid does not name a transit key version.
    pub fn version(&self) -> Result<u32> {
        self.kid
            .strip_prefix('v')
            .and_then(|version| version.parse().ok())
            .ok_or_else(|| anyhow!("unrecognized key id: {}", self.kid))
    }
}

/// Build the claim set for a user. The TTL is clamped to keep access tokens
/// strictly shorter-lived than rotation tokens.
///
/// # Errors
/// Returns an error if issuer or audience is empty.
pub fn make_claims(
    issuer: &str,
    audience: &str,
    user_id: Uuid,
    username: &str,
    ttl_seconds: i64,
) -> Result<AccessClaims> {
    if issuer.is_empty() || audience.is_empty() {
        return Err(anyhow!("access token issuer/audience must not be empty"));
    }

    let ttl = ttl_seconds.clamp(MIN_TTL_SECONDS, MAX_TTL_SECONDS);
    let now = Utc::now();
    let exp = now + Duration::seconds(ttl);

    Ok(AccessClaims {
        iss: issuer.to_string(),
        aud: audience.to_string(),
        sub: user_id.to_string(),
        uname: username.to_string(),
        iat: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        exp: exp.to_rfc3339_opts(SecondsFormat::Secs, true),
        jti: Uuid::new_v4().to_string(),
    })
}

#[derive(Debug)]
pub struct SigningInput {
    pub payload: Vec<u8>,
    pub footer: Vec<u8>,
    pub pre_auth: Vec<u8>,
}

/// Serialize claims and footer and compute the pre-authentication encoding
/// the signature must cover.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn encode_signing_input(claims: &AccessClaims, footer: &KeyFooter) -> Result<SigningInput> {
    let payload = serde_json::to_vec(claims).context("failed to serialize access claims")?;
    let footer = serde_json::to_vec(footer).context("failed to serialize token footer")?;
    let pre_auth = pae(&[TOKEN_HEADER.as_bytes(), &payload, &footer, b""]);

    Ok(SigningInput {
        payload,
        footer,
        pre_auth,
    })
}

/// Assemble `v4.public.<payload || signature><.footer>`.
#[must_use]
pub fn build_token(payload: &[u8], footer: &[u8], signature: &[u8; SIGNATURE_LENGTH]) -> String {
    let mut message = Vec::with_capacity(payload.len() + signature.len());
    message.extend_from_slice(payload);
    message.extend_from_slice(signature);

    let mut token = format!("{TOKEN_HEADER}{}", Base64UrlUnpadded::encode_string(&message));
    if !footer.is_empty() {
        token.push('.');
        token.push_str(&Base64UrlUnpadded::encode_string(footer));
    }

    token
}

/// Decode a transit public key (standard base64) into a verifying key.
///
/// # Errors
/// Returns an error if the key is not a valid Ed25519 public key.
pub fn decode_verifying_key(public_key_base64: &str) -> Result<VerifyingKey> {
    let bytes = Base64::decode_vec(public_key_base64).context("failed to decode public key")?;
    let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("invalid public key length"))?;

    VerifyingKey::from_bytes(&bytes).context("invalid Ed25519 public key")
}

/// Verify signature and expiration and return the claims.
///
/// # Errors
/// Returns an error on malformed tokens, unknown key versions, bad
/// signatures, or expired claims.
pub fn verify_token(token: &str, keys: &BTreeMap<u32, VerifyingKey>) -> Result<AccessClaims> {
    let rest = token
        .strip_prefix(TOKEN_HEADER)
        .ok_or_else(|| anyhow!("not a v4.public token"))?;

    let (body_base64, footer_base64) = match rest.split_once('.') {
        Some((body, footer)) => (body, Some(footer)),
        None => (rest, None),
    };

    let body = Base64UrlUnpadded::decode_vec(body_base64).context("invalid token encoding")?;
    if body.len() <= SIGNATURE_LENGTH {
        bail!("token too short");
    }
    let (payload, signature) = body.split_at(body.len() - SIGNATURE_LENGTH);
    let signature: [u8; SIGNATURE_LENGTH] = signature
        .try_into()
        .map_err(|_| anyhow!("invalid signature length"))?;

    let footer = match footer_base64 {
        Some(encoded) => Base64UrlUnpadded::decode_vec(encoded).context("invalid token footer")?,
        None => Vec::new(),
    };
    let key_footer: KeyFooter =
        serde_json::from_slice(&footer).context("missing key id in token footer")?;
    let version = key_footer.version()?;
    let key = keys
        .get(&version)
        .ok_or_else(|| anyhow!("unknown signing key version v{version}"))?;

    let pre_auth = pae(&[TOKEN_HEADER.as_bytes(), payload, &footer, b""]);
    key.verify_strict(&pre_auth, &Signature::from_bytes(&signature))
        .map_err(|_| anyhow!("invalid token signature"))?;

    let claims: AccessClaims = serde_json::from_slice(payload).context("invalid token claims")?;
    let exp = DateTime::parse_from_rfc3339(&claims.exp).context("invalid exp claim")?;
    if exp.with_timezone(&Utc) < Utc::now() {
        bail!("access token expired");
    }

    Ok(claims)
}

// Pre-authentication encoding per the PASETO spec: count and piece lengths
// are little-endian u64 with the high bit cleared.
fn pae(pieces: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&le64(pieces.len() as u64));
    for piece in pieces {
        out.extend_from_slice(&le64(piece.len() as u64));
        out.extend_from_slice(piece);
    }
    out
}

fn le64(n: u64) -> [u8; 8] {
    (n & 0x7fff_ffff_ffff_ffff).to_le_bytes()
}
