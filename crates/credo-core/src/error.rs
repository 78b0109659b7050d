//! Error types for the Credo system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredoError {
    #[error("username already exists")]
    UsernameExists,

    #[error("email already exists")]
    EmailExists,

    #[error("failed to save user: {reason}")]
    UserNotSaved { reason: String },

    #[error("password hashing failed: {0}")]
    HashingFailed(String),

    #[error("token issuance failed: {0}")]
    TokenIssuanceFailed(String),

    #[error("the store does not accept requests")]
    StoreClosed,

    #[error("store connection could not be established after {attempts} attempts")]
    ConnectionEstablishmentFailed { attempts: u32 },

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has expired")]
    TokenExpired,

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CredoResult<T> = Result<T, CredoError>;

/// Client-facing status class for a [`CredoError`].
///
/// The RPC boundary translates these into its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    AlreadyExists,
    InvalidArgument,
    Unauthenticated,
    NotFound,
    Unavailable,
    Internal,
}

impl CredoError {
    /// Total mapping from error kind to client-facing status.
    pub fn status(&self) -> ErrorStatus {
        match self {
            CredoError::UsernameExists | CredoError::EmailExists => ErrorStatus::AlreadyExists,
            CredoError::Validation { .. } => ErrorStatus::InvalidArgument,
            CredoError::InvalidToken(_) | CredoError::TokenExpired => ErrorStatus::Unauthenticated,
            CredoError::NotFound { .. } => ErrorStatus::NotFound,
            CredoError::StoreClosed | CredoError::ConnectionEstablishmentFailed { .. } => {
                ErrorStatus::Unavailable
            }
            CredoError::UserNotSaved { .. }
            | CredoError::HashingFailed(_)
            | CredoError::TokenIssuanceFailed(_)
            | CredoError::Database(_)
            | CredoError::Internal(_) => ErrorStatus::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_map_to_already_exists() {
        assert_eq!(CredoError::UsernameExists.status(), ErrorStatus::AlreadyExists);
        assert_eq!(CredoError::EmailExists.status(), ErrorStatus::AlreadyExists);
    }

    #[test]
    fn shutdown_is_unavailable() {
        assert_eq!(CredoError::StoreClosed.status(), ErrorStatus::Unavailable);
        assert_eq!(
            CredoError::ConnectionEstablishmentFailed { attempts: 3 }.status(),
            ErrorStatus::Unavailable
        );
    }

    #[test]
    fn infrastructure_falls_back_to_internal() {
        assert_eq!(
            CredoError::Database("boom".into()).status(),
            ErrorStatus::Internal
        );
        assert_eq!(
            CredoError::UserNotSaved {
                reason: "no rows".into()
            }
            .status(),
            ErrorStatus::Internal
        );
    }
}
