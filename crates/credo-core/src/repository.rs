//! Repository and collaborator trait definitions.
//!
//! All storage operations are async and take the caller's
//! [`RequestContext`] so request ids reach every log line.

use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::CredoResult;
use crate::models::user::{NewUser, User};

pub trait UserRepository: Send + Sync {
    /// `Ok(())` when no user holds `username`, otherwise
    /// [`CredoError::UsernameExists`](crate::error::CredoError::UsernameExists).
    ///
    /// Advisory only: a concurrent insert can still win the race, and
    /// [`save_user`](Self::save_user) is the authoritative check.
    fn check_username_available(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> impl Future<Output = CredoResult<()>> + Send;

    /// Email counterpart of
    /// [`check_username_available`](Self::check_username_available).
    fn check_email_available(
        &self,
        ctx: &RequestContext,
        email: &str,
    ) -> impl Future<Output = CredoResult<()>> + Send;

    fn save_user(
        &self,
        ctx: &RequestContext,
        user: NewUser,
    ) -> impl Future<Output = CredoResult<()>> + Send;

    /// Overwrite the stored refresh token for `id`.
    fn set_refresh_token(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        refresh_token: &str,
    ) -> impl Future<Output = CredoResult<()>> + Send;

    fn get_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> impl Future<Output = CredoResult<User>> + Send;

    fn get_by_username(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> impl Future<Output = CredoResult<User>> + Send;
}

/// Turns a plaintext password into a storable hash.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> CredoResult<String>;
}

/// Delivers the email-verification message for a new account.
pub trait VerificationSender: Send + Sync + 'static {
    fn send_verification(&self, email: &str) -> impl Future<Output = CredoResult<()>> + Send;
}
