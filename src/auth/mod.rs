//! Authentication and authorization.
//!
//! - JWT access/refresh token pairs (HS256)
//! - Argon2id password hashing
//! - Role capability table consulted before every mutation

pub mod capabilities;
pub mod jwt;
pub mod password;

use sqlx::{Row, SqlitePool};

use crate::model::{Role, AUTH_FORBIDDEN, AUTH_UNAUTHENTICATED, HOUSEHOLD_REQUIRED};
use crate::{AppError, AppResult};

pub use capabilities::{required_role, Action};
pub use jwt::{extract_bearer, Claims, JwtKeys, TokenKind, TokenPair};
pub use password::{hash_password, verify_password};

/// The authenticated identity a request acts as. Re-read from the store on
/// every request so role and household changes take effect immediately.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub household_id: Option<String>,
}

impl AuthUser {
    /// Capability check; must run before any side effect of a mutation.
    pub fn require(&self, action: Action) -> AppResult<()> {
        if self.role.allows(action) {
            Ok(())
        } else {
            Err(AppError::new(AUTH_FORBIDDEN, "Not allowed.")
                .with_context("action", action.to_string())
                .with_context("role", self.role.to_string()))
        }
    }

    /// The household every query must be scoped to. Derived from the
    /// identity, never from request input.
    pub fn household(&self) -> AppResult<&str> {
        self.household_id.as_deref().ok_or_else(|| {
            AppError::new(HOUSEHOLD_REQUIRED, "User is not associated with a household.")
        })
    }
}

/// Load the acting user for a validated token subject.
pub async fn load_auth_user(pool: &SqlitePool, user_id: &str) -> AppResult<AuthUser> {
    let row = sqlx::query(
        "SELECT id, username, email, role, household_id FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)?
    .ok_or_else(|| AppError::new(AUTH_UNAUTHENTICATED, "Unknown user."))?;

    let role: String = row.try_get("role").map_err(AppError::from)?;
    Ok(AuthUser {
        id: row.try_get("id").map_err(AppError::from)?,
        username: row.try_get("username").map_err(AppError::from)?,
        email: row.try_get("email").map_err(AppError::from)?,
        role: Role::parse(&role)?,
        household_id: row
            .try_get::<Option<String>, _>("household_id")
            .map_err(AppError::from)?,
    })
}
