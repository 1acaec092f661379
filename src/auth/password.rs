//! Password hashing and verification using Argon2id.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::model::AUTH_HASH_ERROR;
use crate::{AppError, AppResult};

/// Hash a password; returns the PHC-formatted string that embeds the salt
/// and parameters.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            AppError::new(AUTH_HASH_ERROR, "Failed to hash password.")
                .with_context("error", e.to_string())
        })
}

/// Verify a password against a stored PHC hash.
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        AppError::new(AUTH_HASH_ERROR, "Stored password hash is malformed.")
            .with_context("error", e.to_string())
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
