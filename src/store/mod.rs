//! Postgres-backed identity store.
//!
//! Users live in `users`, rotation tokens in `rotation_tokens` keyed on the
//! token itself. Persisting a user inserts the tokens it carries with
//! `ON CONFLICT DO NOTHING`, so concurrent logins append without clobbering
//! each other. Passwords are Argon2id hashes in PHC string format.

use crate::auth::{
    store::{CreateUserOutcome, UserStore},
    user::{RotationToken, User},
};
use anyhow::{anyhow, Context, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use rand::rngs::OsRng;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// Parseable Argon2id hash that matches no password. Verified when a user row
/// is gone mid-flight so the miss still costs one hashing round.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$gZiV/M1gPc22ElAH/Jh1Hw$CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno";

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_name(&self, username: &str) -> Result<Option<User>> {
        let query = "SELECT id, email, username, password_hash FROM users WHERE username = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up user by username")?;

        match row {
            Some(row) => Ok(Some(load_user(&self.pool, &row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = "SELECT id, email, username, password_hash FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up user by id")?;

        match row {
            Some(row) => Ok(Some(load_user(&self.pool, &row).await?)),
            None => Ok(None),
        }
    }

    async fn check_password(&self, user: &User, password: &str) -> Result<bool> {
        let Some(stored) = password_hash_by_id(&self.pool, user.id).await? else {
            verify_password(DUMMY_HASH, password)?;
            return Ok(false);
        };
        verify_password(&stored, password)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin user update transaction")?;

        let query = "UPDATE users SET email = $2, username = $3, password_hash = $4 WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to update user")?;

        let query = r"
            INSERT INTO rotation_tokens (token, user_id, origin)
            VALUES ($1, $2, $3)
            ON CONFLICT (token) DO NOTHING
        ";
        for token in &user.rotation_tokens {
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(&token.token)
                .bind(user.id)
                .bind(&token.origin)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to persist rotation token")?;
        }

        tx.commit().await.context("commit user update transaction")
    }

    async fn create(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<CreateUserOutcome> {
        let password_hash = hash_password(password)?;

        let query = r"
            INSERT INTO users (email, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(username)
            .bind(&password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        let id: Uuid = match row {
            Ok(row) => row.get("id"),
            Err(err) => {
                if is_unique_violation(&err) {
                    return Ok(CreateUserOutcome::Conflict);
                }
                return Err(err).context("failed to insert user");
            }
        };

        Ok(CreateUserOutcome::Created(User {
            id,
            email: email.to_string(),
            username: username.to_string(),
            password_hash,
            rotation_tokens: Vec::new(),
        }))
    }

    async fn delete(&self, user: &User) -> Result<()> {
        let query = "DELETE FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user.id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete user")?;

        Ok(())
    }
}

async fn load_user(pool: &PgPool, row: &PgRow) -> Result<User> {
    let id: Uuid = row.get("id");
    let rotation_tokens = rotation_tokens_for(pool, id).await?;

    Ok(User {
        id,
        email: row.get("email"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        rotation_tokens,
    })
}

async fn rotation_tokens_for(pool: &PgPool, user_id: Uuid) -> Result<Vec<RotationToken>> {
    let query = "SELECT token, origin FROM rotation_tokens WHERE user_id = $1 ORDER BY created_at, token";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load rotation tokens")?;

    Ok(rows
        .iter()
        .map(|row| RotationToken::new(row.get("token"), row.get("origin")))
        .collect())
}

async fn password_hash_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<String>> {
    let query = "SELECT password_hash FROM users WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load password hash")?;

    Ok(row.map(|row| row.get("password_hash")))
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash password"))?
        .to_string();
    Ok(hash)
}

fn verify_password(stored_hash: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|_| anyhow!("stored password hash is not a valid PHC string"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
