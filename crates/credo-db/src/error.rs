//! Database-specific error types and conversions.

use credo_core::error::CredoError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("the store does not accept requests")]
    StoreClosed,

    #[error("store connection could not be established after {attempts} attempts")]
    ConnectionEstablishmentFailed { attempts: u32 },
}

impl From<DbError> for CredoError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => CredoError::NotFound { entity, id },
            DbError::StoreClosed => CredoError::StoreClosed,
            DbError::ConnectionEstablishmentFailed { attempts } => {
                CredoError::ConnectionEstablishmentFailed { attempts }
            }
            other => CredoError::Database(other.to_string()),
        }
    }
}
