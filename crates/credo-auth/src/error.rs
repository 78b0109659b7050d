//! Authentication error types.

use credo_core::error::CredoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("signing key is not configured")]
    MissingSigningKey,

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl From<AuthError> for CredoError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired => CredoError::TokenExpired,
            AuthError::TokenInvalid(msg) => CredoError::InvalidToken(msg),
            AuthError::MissingSigningKey | AuthError::Crypto(_) => {
                CredoError::TokenIssuanceFailed(err.to_string())
            }
            AuthError::Hashing(msg) => CredoError::HashingFailed(msg),
        }
    }
}
