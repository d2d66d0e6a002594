//! Domain core: users, rotation tokens, the authentication use case, and the
//! access credential format. Everything here is storage and transport
//! agnostic; the seams are [`store::UserStore`], [`token::TokenGenerator`]
//! and [`access::AccessTokenIssuer`].

pub mod access;
pub mod login;
pub mod store;
pub mod token;
pub mod user;

pub use self::login::{Authenticator, ErrorCode, LoginOutcome, LoginRequest, LoginResponse};
