//! SurrealDB implementation of [`UserRepository`].
//!
//! Every method brackets its store access with an [`OperationGuard`]
//! (via [`StoreClient::begin_operation`]), so calls made after shutdown
//! has begun fail with [`CredoError::StoreClosed`].
//!
//! [`OperationGuard`]: crate::OperationGuard

use std::fmt::Display;

use chrono::{DateTime, Utc};
use credo_core::context::RequestContext;
use credo_core::error::{CredoError, CredoResult};
use credo_core::models::user::{NewUser, User};
use credo_core::repository::UserRepository;
use surrealdb::Connection;
use surrealdb_types::SurrealValue;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connection::StoreClient;
use crate::error::DbError;
use crate::schema::{EMAIL_INDEX, USERNAME_INDEX};

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    username: String,
    email: String,
    password_hash: String,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    username: String,
    email: String,
    password_hash: String,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Projection used by the availability checks.
#[derive(Debug, SurrealValue)]
struct IdRow {
    record_id: String,
}

impl UserRow {
    fn into_user(self, id: Uuid) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            refresh_token: self.refresh_token,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> CredoResult<User> {
        let id = Uuid::parse_str(&self.record_id).map_err(|e| {
            CredoError::Database(format!("invalid user record id {}: {e}", self.record_id))
        })?;
        Ok(User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            refresh_token: self.refresh_token,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Which unique field, if any, a failed insert collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Violation {
    Username,
    Email,
}

/// Attribute a storage error to one of the user unique indexes.
///
/// Only the backtick-quoted name following `index` is inspected; the
/// rest of the message echoes the conflicting value and is ignored.
fn unique_violation(message: &str) -> Option<Violation> {
    let (_, rest) = message.split_once("index `")?;
    let (index, _) = rest.split_once('`')?;
    match index {
        USERNAME_INDEX => Some(Violation::Username),
        EMAIL_INDEX => Some(Violation::Email),
        _ => None,
    }
}

fn query_failed(op: &str, err: impl Display) -> CredoError {
    CredoError::Database(format!("{op}: query execution failed: {err}"))
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    store: StoreClient<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(store: StoreClient<C>) -> Self {
        Self { store }
    }

    /// Look up the record id of the user whose `field` equals `value`.
    async fn find_id(&self, op: &str, field: &str, value: &str) -> CredoResult<Option<String>> {
        let guard = self.store.begin_operation()?;

        let query = format!(
            "SELECT meta::id(id) AS record_id FROM user \
             WHERE {field} = $value LIMIT 1"
        );
        let mut result = guard
            .client()
            .query(&query)
            .bind(("value", value.to_string()))
            .await
            .map_err(|e| query_failed(op, e))?;

        let rows: Vec<IdRow> = result.take(0).map_err(|e| query_failed(op, e))?;
        Ok(rows.into_iter().next().map(|row| row.record_id))
    }

    /// Map an insert failure to a domain error, preferring the unique
    /// index the storage layer reports.
    fn translate_insert_error(&self, ctx: &RequestContext, err: surrealdb::Error) -> CredoError {
        let message = err.to_string();
        match unique_violation(&message) {
            Some(Violation::Username) => {
                warn!(request_id = %ctx, error = %message, "Username already exists");
                CredoError::UsernameExists
            }
            Some(Violation::Email) => {
                warn!(request_id = %ctx, error = %message, "Email already exists");
                CredoError::EmailExists
            }
            None => {
                error!(request_id = %ctx, error = %message, "Failed to insert user");
                CredoError::UserNotSaved { reason: message }
            }
        }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn check_username_available(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> CredoResult<()> {
        const OP: &str = "check_username_available";

        match self.find_id(OP, "username", username).await {
            Ok(None) => {
                debug!(request_id = %ctx, "Username is unique");
                Ok(())
            }
            Ok(Some(_)) => {
                warn!(request_id = %ctx, username, "Username already exists");
                Err(CredoError::UsernameExists)
            }
            Err(e) => {
                error!(request_id = %ctx, error = %e, "Username lookup failed");
                Err(e)
            }
        }
    }

    async fn check_email_available(&self, ctx: &RequestContext, email: &str) -> CredoResult<()> {
        const OP: &str = "check_email_available";

        match self.find_id(OP, "email", email).await {
            Ok(None) => {
                debug!(request_id = %ctx, "Email is unique");
                Ok(())
            }
            Ok(Some(_)) => {
                warn!(request_id = %ctx, email, "Email already exists");
                Err(CredoError::EmailExists)
            }
            Err(e) => {
                error!(request_id = %ctx, error = %e, "Email lookup failed");
                Err(e)
            }
        }
    }

    async fn save_user(&self, ctx: &RequestContext, user: NewUser) -> CredoResult<()> {
        let guard = self.store.begin_operation()?;
        let id_str = user.id.to_string();

        let result = guard
            .client()
            .query(
                "CREATE type::record('user', $id) SET \
                 username = $username, email = $email, \
                 password_hash = $password_hash, \
                 refresh_token = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("username", user.username))
            .bind(("email", user.email))
            .bind(("password_hash", user.password_hash))
            .await
            .map_err(|e| self.translate_insert_error(ctx, e))?;

        let mut result = result
            .check()
            .map_err(|e| self.translate_insert_error(ctx, e))?;

        let rows: Vec<UserRow> = result
            .take(0)
            .map_err(|e| self.translate_insert_error(ctx, e))?;

        if rows.is_empty() {
            warn!(request_id = %ctx, user_id = %id_str, "No rows created, user not saved");
            return Err(CredoError::UserNotSaved {
                reason: "no rows created".into(),
            });
        }

        info!(request_id = %ctx, user_id = %id_str, "User successfully saved");
        Ok(())
    }

    async fn set_refresh_token(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        refresh_token: &str,
    ) -> CredoResult<()> {
        const OP: &str = "set_refresh_token";

        let guard = self.store.begin_operation()?;
        let id_str = id.to_string();

        let result = guard
            .client()
            .query(
                "UPDATE type::record('user', $id) SET \
                 refresh_token = $refresh_token, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("refresh_token", refresh_token.to_string()))
            .await
            .map_err(|e| query_failed(OP, e))?;

        let mut result = result.check().map_err(|e| query_failed(OP, e))?;
        let rows: Vec<UserRow> = result.take(0).map_err(|e| query_failed(OP, e))?;

        if rows.is_empty() {
            warn!(request_id = %ctx, user_id = %id_str, "Refresh token not stored, no such user");
            return Err(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            }
            .into());
        }

        debug!(request_id = %ctx, user_id = %id_str, "Refresh token stored");
        Ok(())
    }

    async fn get_by_id(&self, _ctx: &RequestContext, id: Uuid) -> CredoResult<User> {
        const OP: &str = "get_by_id";

        let guard = self.store.begin_operation()?;
        let id_str = id.to_string();

        let mut result = guard
            .client()
            .query("SELECT * FROM type::record('user', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(|e| query_failed(OP, e))?;

        let rows: Vec<UserRow> = result.take(0).map_err(|e| query_failed(OP, e))?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id))
    }

    async fn get_by_username(&self, _ctx: &RequestContext, username: &str) -> CredoResult<User> {
        const OP: &str = "get_by_username";

        let guard = self.store.begin_operation()?;

        let mut result = guard
            .client()
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user \
                 WHERE username = $username",
            )
            .bind(("username", username.to_string()))
            .await
            .map_err(|e| query_failed(OP, e))?;

        let rows: Vec<UserRowWithId> = result.take(0).map_err(|e| query_failed(OP, e))?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: format!("username={username}"),
        })?;

        row.try_into_user()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_index_violation_is_attributed() {
        let msg = "Database index `idx_user_username` already contains 'alice', \
                   with record `user:abc`";
        assert_eq!(unique_violation(msg), Some(Violation::Username));
    }

    #[test]
    fn email_index_violation_is_attributed() {
        let msg = "Database index `idx_user_email` already contains 'a@x.com', \
                   with record `user:abc`";
        assert_eq!(unique_violation(msg), Some(Violation::Email));
    }

    #[test]
    fn index_name_in_conflicting_value_is_ignored() {
        let msg = "Database index `idx_user_email` already contains \
                   'idx_user_username@x.com', with record `user:abc`";
        assert_eq!(unique_violation(msg), Some(Violation::Email));
    }

    #[test]
    fn unrelated_errors_are_not_attributed() {
        assert_eq!(unique_violation("Found NONE for field `email`"), None);
    }
}
