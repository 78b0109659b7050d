//! Credo Core: domain models, the error taxonomy and the traits the
//! storage and auth layers implement.

pub mod context;
pub mod error;
pub mod models;
pub mod repository;

pub use context::RequestContext;
pub use error::{CredoError, CredoResult, ErrorStatus};
