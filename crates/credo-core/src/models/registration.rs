//! Registration request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Successful registration result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterOutput {
    pub user_id: Uuid,
    /// Signed JWT access token.
    pub access_token: String,
    /// Signed JWT refresh token (also persisted on the user row).
    pub refresh_token: String,
}
