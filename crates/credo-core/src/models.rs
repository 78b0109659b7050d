//! Domain models for Credo.

pub mod registration;
pub mod user;
