//! Registration service: the end-to-end account creation pipeline.

use std::sync::Arc;
use std::time::Duration;

use credo_core::context::RequestContext;
use credo_core::error::{CredoError, CredoResult};
use credo_core::models::registration::{RegisterInput, RegisterOutput};
use credo_core::models::user::NewUser;
use credo_core::repository::{CredentialHasher, UserRepository};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::notify::{NotificationPool, VerificationJob};
use crate::token::TokenIssuer;

/// Registration service.
///
/// Generic over repository and hasher implementations so that the auth
/// layer has no dependency on the database crate.
pub struct RegistrationService<U: UserRepository, H: CredentialHasher> {
    user_repo: U,
    hasher: H,
    issuer: Arc<TokenIssuer>,
    notifications: Arc<NotificationPool>,
    config: AuthConfig,
}

impl<U: UserRepository, H: CredentialHasher> RegistrationService<U, H> {
    pub fn new(
        user_repo: U,
        hasher: H,
        issuer: Arc<TokenIssuer>,
        notifications: Arc<NotificationPool>,
        config: AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            hasher,
            issuer,
            notifications,
            config,
        }
    }

    /// Register a new account and issue its first token pair.
    ///
    /// Steps run strictly in order and the first failure aborts the rest.
    /// The username/email pre-checks are advisory; the unique indexes hit
    /// by `save_user` decide concurrent races. If storing the refresh
    /// token fails, the already saved user row is left in place and the
    /// storage error is returned.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        input: RegisterInput,
    ) -> CredoResult<RegisterOutput> {
        debug!(
            request_id = %ctx,
            username = %input.username,
            email = %input.email,
            "Starting user registration"
        );

        validate(&input)?;

        // 1-2. Advisory uniqueness checks.
        if let Err(e) = self
            .user_repo
            .check_username_available(ctx, &input.username)
            .await
        {
            warn!(request_id = %ctx, username = %input.username, error = %e, "Username unavailable");
            return Err(e);
        }

        if let Err(e) = self
            .user_repo
            .check_email_available(ctx, &input.email)
            .await
        {
            warn!(request_id = %ctx, email = %input.email, error = %e, "Email unavailable");
            return Err(e);
        }

        // 3. Hash password.
        let password_hash = self.hasher.hash(&input.password).map_err(|e| {
            error!(request_id = %ctx, error = %e, "Failed to hash password");
            match e {
                CredoError::HashingFailed(_) => e,
                other => CredoError::HashingFailed(other.to_string()),
            }
        })?;

        // 4. Fresh identifiers.
        let user_id = Uuid::new_v4();
        let access_jit = Uuid::new_v4().to_string();
        let refresh_jit = Uuid::new_v4().to_string();
        let subject = user_id.to_string();

        // 5. Persist the user row (authoritative uniqueness check).
        self.user_repo
            .save_user(
                ctx,
                NewUser {
                    id: user_id,
                    username: input.username.clone(),
                    email: input.email.clone(),
                    password_hash,
                },
            )
            .await
            .inspect_err(|e| error!(request_id = %ctx, error = %e, "Failed to save user"))?;
        debug!(request_id = %ctx, user_id = %user_id, "User saved to database");

        // 6-7. Issue tokens.
        let access_token = self
            .issuer
            .issue(
                &subject,
                &access_jit,
                &input.username,
                false,
                Duration::from_secs(self.config.access_token_lifetime_secs),
            )
            .map_err(|e| {
                error!(request_id = %ctx, error = %e, "Failed to create access token");
                CredoError::TokenIssuanceFailed(format!("access token: {e}"))
            })?;
        debug!(request_id = %ctx, "Access token generated");

        let refresh_token = self
            .issuer
            .issue(
                &subject,
                &refresh_jit,
                &input.username,
                false,
                Duration::from_secs(self.config.refresh_token_lifetime_secs),
            )
            .map_err(|e| {
                error!(request_id = %ctx, error = %e, "Failed to create refresh token");
                CredoError::TokenIssuanceFailed(format!("refresh token: {e}"))
            })?;
        debug!(request_id = %ctx, "Refresh token generated");

        // 8. Persist the refresh token. No rollback of step 5 on failure.
        self.user_repo
            .set_refresh_token(ctx, user_id, &refresh_token)
            .await
            .inspect_err(|e| {
                error!(
                    request_id = %ctx,
                    user_id = %user_id,
                    error = %e,
                    "Failed to save refresh token; user row left without one"
                )
            })?;
        debug!(request_id = %ctx, "Refresh token saved to database");

        // 9. Verification email, fire-and-forget.
        let job = VerificationJob {
            ctx: ctx.clone(),
            user_id,
            email: input.email,
        };
        if let Err(e) = self.notifications.submit(job) {
            error!(
                request_id = %ctx,
                user_id = %user_id,
                error = %e,
                "Failed to queue verification email"
            );
        }

        info!(request_id = %ctx, user_id = %user_id, "User registered successfully");

        Ok(RegisterOutput {
            user_id,
            access_token,
            refresh_token,
        })
    }
}

fn validate(input: &RegisterInput) -> CredoResult<()> {
    let missing = [
        ("username", &input.username),
        ("email", &input.email),
        ("password", &input.password),
    ]
    .into_iter()
    .find(|(_, value)| value.is_empty());

    match missing {
        Some((field, _)) => Err(CredoError::Validation {
            message: format!("{field} is required"),
        }),
        None => Ok(()),
    }
}
