//! # Ensaluto (User Authentication)
//!
//! `ensaluto` authenticates users against a `PostgreSQL`-backed identity store
//! and, on success, issues a pair of tokens:
//!
//! - an **access token**: a short-lived `PASETO` `v4.public` credential signed
//!   with an Ed25519 key held in Vault's transit backend, carrying the user id
//!   and username so downstream services can verify requests offline, and
//! - a **rotation token**: a long-lived opaque token tagged with the network
//!   origin that requested it, appended to the user record on every login.
//!
//! Rotation tokens accumulate per login and per origin, so each device or
//! session holds its own; exchanging one for fresh access tokens never
//! requires the password again.
//!
//! ## Credential Storage
//!
//! Passwords are stored as Argon2id hashes and verified by the store. The
//! authentication core treats the hash as opaque; swapping the hashing scheme
//! touches only the Postgres store.
//!
//! ## Secrets
//!
//! The service never holds the signing key: payloads are signed through
//! `transit/sign/<key>` and the public keyset is republished at `/v1/keys`.
//! Database credentials are leased from Vault and renewed in the background;
//! an exhausted lease shuts the service down instead of limping along with
//! expired credentials.

pub mod auth;
pub mod cli;
pub mod ensaluto;
pub mod store;
pub mod vault;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
