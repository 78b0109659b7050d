//! Credo Auth: Argon2id password hashing, JWT issuance/verification,
//! verification-email delivery and the registration pipeline.

pub mod config;
pub mod error;
pub mod notify;
pub mod password;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use notify::{NotificationOutcome, NotificationPool, NotifyConfig};
pub use password::Argon2Hasher;
pub use service::RegistrationService;
pub use token::{TokenClaims, TokenIssuer, VerifiedIdentity};
