use crate::auth::{
    access::AccessTokenIssuer, store::UserStore, token::TokenGenerator, user::RotationToken,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Machine-readable authentication failure codes. Callers decide whether to
/// surface the distinction; the human-readable wording stays generic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UserNotFound,
    InvalidPassword,
}

/// Credentials plus the network origin asking for them. Never persisted.
#[derive(Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub origin: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub rotation_token: String,
}

/// Outcome of an authentication attempt. Exactly one of success, validation
/// failure, or authentication failure; collaborator errors are not encoded
/// here, they propagate as errors.
#[derive(Debug)]
pub enum LoginOutcome {
    Success(LoginResponse),
    ValidationFailure {
        field: &'static str,
        message: &'static str,
    },
    AuthenticationFailure {
        code: ErrorCode,
        field: &'static str,
    },
}

impl LoginOutcome {
    #[must_use]
    pub const fn validation_failure(field: &'static str, message: &'static str) -> Self {
        Self::ValidationFailure { field, message }
    }

    #[must_use]
    pub const fn authentication_failure(code: ErrorCode, field: &'static str) -> Self {
        Self::AuthenticationFailure { code, field }
    }
}

/// The authentication use case: validate, look up, verify, mint and persist a
/// rotation token, then issue the access credential.
pub struct Authenticator<S, G, A> {
    store: S,
    tokens: G,
    access: A,
}

impl<S, G, A> Authenticator<S, G, A>
where
    S: UserStore,
    G: TokenGenerator,
    A: AccessTokenIssuer,
{
    pub const fn new(store: S, tokens: G, access: A) -> Self {
        Self {
            store,
            tokens,
            access,
        }
    }

    /// Authenticate a request. Steps run in strict order and fail fast:
    /// field validation happens before any store I/O, the rotation token is
    /// persisted before the access credential is signed, and a persistence
    /// failure aborts the whole flow.
    ///
    /// # Errors
    /// Store or signing failures surface unchanged; domain failures are
    /// values in [`LoginOutcome`].
    pub async fn authenticate(&self, request: LoginRequest) -> Result<LoginOutcome> {
        if request.username.is_empty() {
            return Ok(LoginOutcome::validation_failure(
                "username",
                "must not be empty",
            ));
        }

        if request.password.is_empty() {
            return Ok(LoginOutcome::validation_failure(
                "password",
                "must not be empty",
            ));
        }

        let Some(mut user) = self.store.find_by_name(&request.username).await? else {
            return Ok(LoginOutcome::authentication_failure(
                ErrorCode::UserNotFound,
                "username",
            ));
        };

        if !self.store.check_password(&user, &request.password).await? {
            return Ok(LoginOutcome::authentication_failure(
                ErrorCode::InvalidPassword,
                "password",
            ));
        }

        let rotation_token = self.tokens.generate()?;
        user.add_rotation_token(RotationToken::new(rotation_token.clone(), request.origin));
        self.store.update(&user).await?;

        let access_token = self.access.issue(user.id, &user.username).await?;

        Ok(LoginOutcome::Success(LoginResponse {
            access_token,
            rotation_token,
        }))
    }
}
