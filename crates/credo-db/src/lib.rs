//! Credo Database: SurrealDB store client, schema migrations and the
//! user repository.
//!
//! This crate provides:
//! - The admission-controlled store client ([`StoreClient`], [`StoreConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])
//! - The SurrealDB [`UserRepository`](credo_core::repository::UserRepository)
//!   implementation ([`repository::SurrealUserRepository`])

mod connection;
mod error;
mod schema;

pub mod repository;

pub use connection::{OperationGuard, StoreClient, StoreConfig, StoreCredentials};
pub use error::DbError;
pub use schema::{EMAIL_INDEX, USERNAME_INDEX, run_migrations};
