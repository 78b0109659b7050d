//! HS256 JWT issuance and verification for access and refresh tokens.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Claims embedded in every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, the user ID (UUID string).
    pub uuid: String,
    /// Unique token ID (UUID string), fresh per issued token.
    pub jit: String,
    pub username: String,
    /// Whether the user's email has been verified.
    #[serde(rename = "isVerifiedEmail")]
    pub is_verified_email: bool,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

/// Identity recovered from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub username: String,
    pub is_verified_email: bool,
}

/// Signs and verifies tokens with a process-wide symmetric key.
///
/// Built once at startup from [`AuthConfig`]; the key is never rotated
/// within the lifetime of an issuer.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    /// Fails with [`AuthError::MissingSigningKey`] if no secret is
    /// configured.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.secret_key.is_empty() {
            return Err(AuthError::MissingSigningKey);
        }
        let secret = config.secret_key.as_bytes();
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// Issue a signed token valid for `ttl` from now.
    pub fn issue(
        &self,
        subject_id: &str,
        jit: &str,
        username: &str,
        is_verified_email: bool,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| AuthError::Crypto(format!("token lifetime out of range: {ttl:?}")))?;

        let claims = TokenClaims {
            uuid: subject_id.to_string(),
            jit: jit.to_string(),
            username: username.to_string(),
            is_verified_email,
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
    }

    /// Verify the signature and expiry of `token` and return its full
    /// claim set.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid(e.to_string()),
            })?;

        // A token is dead at its expiry second, not one second after.
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Verify `token` and return the identity it carries.
    pub fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        self.decode(token).map(|claims| VerifiedIdentity {
            username: claims.username,
            is_verified_email: claims.is_verified_email,
        })
    }
}
