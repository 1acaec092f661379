use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

pub const AUTH_UNAUTHENTICATED: &str = "AUTH/UNAUTHENTICATED";
pub const AUTH_FORBIDDEN: &str = "AUTH/FORBIDDEN";
pub const AUTH_INVALID_CREDENTIALS: &str = "AUTH/INVALID_CREDENTIALS";
pub const AUTH_TOKEN_INVALID: &str = "AUTH/TOKEN_INVALID";
pub const AUTH_HASH_ERROR: &str = "AUTH/HASH_ERROR";

pub const HOUSEHOLD_REQUIRED: &str = "HOUSEHOLD/REQUIRED";

pub const VALIDATION_INVALID_INPUT: &str = "VALIDATION/INVALID_INPUT";
pub const VALIDATION_HOUSEHOLD_MISMATCH: &str = "VALIDATION/HOUSEHOLD_MISMATCH";
pub const VALIDATION_DATE_ORDER: &str = "VALIDATION/DATE_ORDER";

pub const TASK_NOT_FOUND: &str = "TASK/NOT_FOUND";
pub const CATEGORY_NOT_FOUND: &str = "CATEGORY/NOT_FOUND";
pub const MEMBER_NOT_FOUND: &str = "MEMBER/NOT_FOUND";
pub const PET_NOT_FOUND: &str = "PET/NOT_FOUND";
pub const USER_NOT_FOUND: &str = "USER/NOT_FOUND";

pub const INVITE_NOT_FOUND: &str = "INVITE/NOT_FOUND";
pub const INVITE_EXPIRED: &str = "INVITE/EXPIRED";
pub const INVITE_EMAIL_MISMATCH: &str = "INVITE/EMAIL_MISMATCH";

pub const REWARDS_INSUFFICIENT_BALANCE: &str = "REWARDS/INSUFFICIENT_BALANCE";

pub const ACCOUNT_EMAIL_TAKEN: &str = "ACCOUNT/EMAIL_TAKEN";
pub const ACCOUNT_USERNAME_TAKEN: &str = "ACCOUNT/USERNAME_TAKEN";
pub const ACCOUNT_PASSWORD_TOO_SHORT: &str = "ACCOUNT/PASSWORD_TOO_SHORT";
pub const ACCOUNT_BAD_OLD_PASSWORD: &str = "ACCOUNT/BAD_OLD_PASSWORD";

pub const GOOGLE_TOKEN_INVALID: &str = "GOOGLE/TOKEN_INVALID";
pub const GOOGLE_EMAIL_MISSING: &str = "GOOGLE/EMAIL_MISSING";
pub const GOOGLE_EMAIL_UNVERIFIED: &str = "GOOGLE/EMAIL_UNVERIFIED";

/// Permission tier of a user. Ordering matters: a capability granted to a
/// lower tier is available to every higher tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Role {
    Child = 0,
    Adult = 1,
    Admin = 2,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Child => "child",
            Role::Adult => "adult",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> AppResult<Role> {
        match value {
            "child" => Ok(Role::Child),
            "adult" => Ok(Role::Adult),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::new(VALIDATION_INVALID_INPUT, "Invalid role.")
                .with_context("role", other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Med,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Med => "med",
            Priority::High => "high",
        }
    }

    pub fn parse(value: &str) -> AppResult<Priority> {
        match value {
            "low" => Ok(Priority::Low),
            "med" => Ok(Priority::Med),
            "high" => Ok(Priority::High),
            other => Err(AppError::new(VALIDATION_INVALID_INPUT, "Invalid priority.")
                .with_context("priority", other.to_string())),
        }
    }
}

/// Deserialize helper for PATCH payloads: a field that is present but null
/// decodes as `Some(None)`, while an absent field stays `None`.
pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email validation pattern to compile")
});

/// Lowercase and validate an email address.
pub fn normalize_email(value: &str) -> AppResult<String> {
    let email = value.trim().to_lowercase();
    if email.is_empty() || !EMAIL_PATTERN.is_match(&email) {
        return Err(
            AppError::new(VALIDATION_INVALID_INPUT, "A valid email address is required.")
                .with_context("email", value.to_string()),
        );
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_tiers() {
        assert!(Role::Admin > Role::Adult);
        assert!(Role::Adult > Role::Child);
    }

    #[test]
    fn role_round_trips_through_storage_form() {
        for role in [Role::Child, Role::Adult, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()).unwrap(), role);
        }
        assert!(Role::parse("owner").is_err());
    }

    #[test]
    fn priority_parses_storage_form() {
        assert_eq!(Priority::parse("med").unwrap(), Priority::Med);
        assert!(Priority::parse("urgent").is_err());
    }

    #[test]
    fn emails_are_normalized_case_insensitively() {
        assert_eq!(normalize_email(" X@E.com ").unwrap(), "x@e.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("").is_err());
    }
}
