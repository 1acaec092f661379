//! JWT token handling.
//!
//! Access/refresh pairs signed with HS256. The secret must be a strong
//! random value from the environment; short secrets are rejected at startup.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::model::{AUTH_TOKEN_INVALID, VALIDATION_INVALID_INPUT};
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Payload stored in a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub kind: TokenKind,
    /// Issued at (Unix timestamp, seconds).
    pub iat: u64,
    /// Expiration time (Unix timestamp, seconds).
    pub exp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    secret: String,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl JwtKeys {
    pub fn new(secret: String, access_ttl_secs: u64, refresh_ttl_secs: u64) -> AppResult<Self> {
        if secret.len() < 32 {
            return Err(AppError::new(
                VALIDATION_INVALID_INPUT,
                "JWT secret must be at least 32 characters.",
            ));
        }
        Ok(Self {
            secret,
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }

    fn now_secs() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn issue(&self, user_id: &str, email: &str, kind: TokenKind, ttl: u64) -> AppResult<String> {
        let now = Self::now_secs();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            kind,
            iat: now,
            exp: now + ttl,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| {
            AppError::new(AUTH_TOKEN_INVALID, "Failed to sign token.")
                .with_context("error", e.to_string())
        })
    }

    /// Issue a fresh access/refresh pair for an authenticated user.
    pub fn issue_pair(&self, user_id: &str, email: &str) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue(user_id, email, TokenKind::Access, self.access_ttl_secs)?,
            refresh: self.issue(user_id, email, TokenKind::Refresh, self.refresh_ttl_secs)?,
        })
    }

    /// Validate a token's signature, expiry and kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> AppResult<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            AppError::new(AUTH_TOKEN_INVALID, "Invalid or expired token.")
                .with_context("error", e.to_string())
        })?;

        if data.claims.kind != expected {
            return Err(AppError::new(AUTH_TOKEN_INVALID, "Wrong token kind."));
        }
        Ok(data.claims)
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
