//! User tokens
//!
//! Callers authenticate with an HS256 JWT whose `sub` is a user id. The core
//! both issues (for the `--issue-token` CLI flag) and verifies these tokens.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CoreError;
use crate::models::user::User;
use crate::storage::collection::Collection;

/// User token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTokenClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,
}

impl UserTokenClaims {
    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.exp < Utc::now().timestamp()
    }
}

/// Issues and verifies user tokens
pub struct JwtAuthority {
    secret: SecretString,
    ttl_secs: i64,
}

impl JwtAuthority {
    pub fn new(secret: impl Into<String>, ttl_secs: u64) -> Self {
        Self::with_secret(SecretString::from(secret.into()), ttl_secs)
    }

    pub fn with_secret(secret: SecretString, ttl_secs: u64) -> Self {
        Self {
            secret,
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Sign a token for a user
    pub fn issue(&self, user_id: &str) -> Result<String, CoreError> {
        let iat = Utc::now().timestamp();
        let claims = UserTokenClaims {
            sub: user_id.to_string(),
            iat,
            exp: iat.saturating_add(self.ttl_secs),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|e| CoreError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Check the signature and expiry of a token
    pub fn verify(&self, token: &str) -> Result<UserTokenClaims, CoreError> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<UserTokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &validation,
        )
        .map_err(|e| CoreError::Unauthorized(format!("invalid token: {}", e)))?;
        Ok(token_data.claims)
    }

    /// Resolve a token to an enabled user
    pub async fn authenticate(
        &self,
        token: &str,
        users: &dyn Collection<User>,
    ) -> Result<User, CoreError> {
        let claims = self.verify(token)?;
        let user = users
            .get(&claims.sub)
            .await?
            .ok_or_else(|| CoreError::Unauthorized(format!("unknown user {}", claims.sub)))?;
        if !user.enabled {
            return Err(CoreError::Unauthorized(format!(
                "user {} is disabled",
                user.id
            )));
        }
        debug!("Authenticated user {}", user.id);
        Ok(user)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Result<&str, CoreError> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| CoreError::Unauthorized("expected a bearer token".to_string()))
}
