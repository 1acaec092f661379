//! Accounts: registration, login, token refresh, profile, password change
//! and Google sign-in.
//!
//! Registration provisions a household and makes the new user its admin in
//! the same transaction. Login failures never distinguish "no such user"
//! from "wrong password".

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::auth::{hash_password, verify_password, AuthUser, JwtKeys, TokenKind, TokenPair};
use crate::google::GoogleVerifier;
use crate::id::new_uuid_v7;
use crate::model::{
    normalize_email, Role, ACCOUNT_BAD_OLD_PASSWORD, ACCOUNT_EMAIL_TAKEN,
    ACCOUNT_PASSWORD_TOO_SHORT, ACCOUNT_USERNAME_TAKEN, AUTH_INVALID_CREDENTIALS,
    GOOGLE_EMAIL_MISSING, GOOGLE_EMAIL_UNVERIFIED, USER_NOT_FOUND, VALIDATION_INVALID_INPUT,
};
use crate::state::ApiState;
use crate::time::now_ms;
use crate::{household, members, AppError, AppResult};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct HouseholdInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub points_balance: i64,
    pub household: Option<HouseholdInfo>,
}

impl TryFrom<&SqliteRow> for UserProfile {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let role: String = row.try_get("role").map_err(AppError::from)?;
        let household_id: Option<String> =
            row.try_get("household_id").map_err(AppError::from)?;
        let household_name: Option<String> =
            row.try_get("household_name").map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            username: row.try_get("username").map_err(AppError::from)?,
            email: row.try_get("email").map_err(AppError::from)?,
            first_name: row.try_get("first_name").map_err(AppError::from)?,
            last_name: row.try_get("last_name").map_err(AppError::from)?,
            role: Role::parse(&role)?,
            points_balance: row.try_get("points_balance").map_err(AppError::from)?,
            household: match (household_id, household_name) {
                (Some(id), Some(name)) => Some(HouseholdInfo { id, name }),
                _ => None,
            },
        })
    }
}

const PROFILE_SELECT: &str = "SELECT u.id, u.username, u.email, u.first_name, u.last_name, \
     u.role, u.points_balance, u.household_id, h.name AS household_name \
     FROM users u LEFT JOIN household h ON h.id = u.household_id";

pub async fn profile(pool: &SqlitePool, user_id: &str) -> AppResult<UserProfile> {
    let sql = format!("{PROFILE_SELECT} WHERE u.id = ?");
    let row = sqlx::query(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)?;
    row.as_ref()
        .map(UserProfile::try_from)
        .transpose()?
        .ok_or_else(|| {
            AppError::new(USER_NOT_FOUND, "User not found.")
                .with_context("id", user_id.to_string())
        })
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::new(
            ACCOUNT_PASSWORD_TOO_SHORT,
            "Password must be at least 8 characters.",
        ));
    }
    Ok(())
}

fn validate_username(username: &str) -> AppResult<&str> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::new(
            VALIDATION_INVALID_INPUT,
            "Username cannot be empty.",
        ));
    }
    Ok(username)
}

async fn email_taken(pool: &SqlitePool, email: &str, exclude: Option<&str>) -> AppResult<bool> {
    let taken: Option<String> =
        sqlx::query_scalar("SELECT id FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .fetch_optional(pool)
            .await
            .map_err(AppError::from)?;
    Ok(matches!(taken, Some(id) if Some(id.as_str()) != exclude))
}

async fn username_taken(
    pool: &SqlitePool,
    username: &str,
    exclude: Option<&str>,
) -> AppResult<bool> {
    let taken: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)?;
    Ok(matches!(taken, Some(id) if Some(id.as_str()) != exclude))
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

pub async fn register(
    pool: &SqlitePool,
    jwt: &JwtKeys,
    input: RegisterInput,
) -> AppResult<AuthResponse> {
    let username = validate_username(&input.username)?.to_string();
    let email = normalize_email(&input.email)?;
    validate_password(&input.password)?;

    if email_taken(pool, &email, None).await? {
        return Err(AppError::new(
            ACCOUNT_EMAIL_TAKEN,
            "An account with this email already exists.",
        ));
    }
    if username_taken(pool, &username, None).await? {
        return Err(AppError::new(
            ACCOUNT_USERNAME_TAKEN,
            "This username is already taken.",
        ));
    }

    let password_hash = hash_password(&input.password)?;
    let user_id = new_uuid_v7();
    let now = now_ms();

    let mut tx = pool.begin().await.map_err(AppError::from)?;

    let household_id = household::provision(&mut tx, &format!("{username}'s Household")).await?;

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, first_name, last_name, \
         household_id, role, auth_provider, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 'admin', 'password', ?, ?)",
    )
    .bind(&user_id)
    .bind(&username)
    .bind(&email)
    .bind(&password_hash)
    .bind(input.first_name.trim())
    .bind(input.last_name.trim())
    .bind(&household_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(AppError::from)?;

    let display = format!("{} {}", input.first_name.trim(), input.last_name.trim());
    let display = display.trim();
    let name = if display.is_empty() { &username } else { display };
    members::link_or_create_for_user(&mut tx, &household_id, &user_id, name).await?;

    tx.commit().await.map_err(AppError::from)?;

    tracing::info!(
        target = "hearthside",
        event = "user_registered",
        user_id = %user_id,
        household_id = %household_id
    );

    Ok(AuthResponse {
        user: profile(pool, &user_id).await?,
        tokens: jwt.issue_pair(&user_id, &email)?,
    })
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    /// Username or email address.
    pub identifier: String,
    pub password: String,
}

pub async fn login(
    pool: &SqlitePool,
    jwt: &JwtKeys,
    input: LoginInput,
) -> AppResult<AuthResponse> {
    let identifier = input.identifier.trim();
    let row = sqlx::query(
        "SELECT id, email, password_hash FROM users \
         WHERE username = ? OR email = ? COLLATE NOCASE",
    )
    .bind(identifier)
    .bind(identifier.to_lowercase())
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)?;

    let invalid = || AppError::new(AUTH_INVALID_CREDENTIALS, "Invalid username or password.");

    let row = row.ok_or_else(invalid)?;
    let user_id: String = row.try_get("id").map_err(AppError::from)?;
    let email: String = row.try_get("email").map_err(AppError::from)?;
    let password_hash: Option<String> = row.try_get("password_hash").map_err(AppError::from)?;

    // Accounts created through Google have no local password.
    let hash = password_hash.ok_or_else(invalid)?;
    if !verify_password(&input.password, &hash)? {
        return Err(invalid());
    }

    Ok(AuthResponse {
        user: profile(pool, &user_id).await?,
        tokens: jwt.issue_pair(&user_id, &email)?,
    })
}

#[derive(Debug, Deserialize)]
pub struct RefreshInput {
    pub refresh: String,
}

pub async fn refresh(
    pool: &SqlitePool,
    jwt: &JwtKeys,
    input: RefreshInput,
) -> AppResult<TokenPair> {
    let claims = jwt.verify(&input.refresh, TokenKind::Refresh)?;
    // The subject must still exist; deleted accounts cannot mint new tokens.
    let user = profile(pool, &claims.sub).await?;
    jwt.issue_pair(&user.id, &user.email)
}

#[derive(Debug, Default, Deserialize)]
pub struct MePatch {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

pub async fn update_me(
    pool: &SqlitePool,
    actor: &AuthUser,
    patch: MePatch,
) -> AppResult<UserProfile> {
    let current = profile(pool, &actor.id).await?;

    let username = match &patch.username {
        Some(u) => {
            let u = validate_username(u)?;
            if username_taken(pool, u, Some(&actor.id)).await? {
                return Err(AppError::new(
                    ACCOUNT_USERNAME_TAKEN,
                    "This username is already taken.",
                ));
            }
            u.to_string()
        }
        None => current.username,
    };
    let email = match &patch.email {
        Some(e) => {
            let e = normalize_email(e)?;
            if email_taken(pool, &e, Some(&actor.id)).await? {
                return Err(AppError::new(
                    ACCOUNT_EMAIL_TAKEN,
                    "An account with this email already exists.",
                ));
            }
            e
        }
        None => current.email,
    };
    let first_name = patch
        .first_name
        .map(|v| v.trim().to_string())
        .unwrap_or(current.first_name);
    let last_name = patch
        .last_name
        .map(|v| v.trim().to_string())
        .unwrap_or(current.last_name);

    sqlx::query(
        "UPDATE users SET username = ?, email = ?, first_name = ?, last_name = ?, \
         updated_at = ? WHERE id = ?",
    )
    .bind(&username)
    .bind(&email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(now_ms())
    .bind(&actor.id)
    .execute(pool)
    .await
    .map_err(AppError::from)?;

    profile(pool, &actor.id).await
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
}

pub async fn change_password(
    pool: &SqlitePool,
    actor: &AuthUser,
    input: ChangePasswordInput,
) -> AppResult<()> {
    validate_password(&input.new_password)?;

    let stored: Option<Option<String>> =
        sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
            .bind(&actor.id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::from)?;

    let hash = stored
        .flatten()
        .ok_or_else(|| AppError::new(ACCOUNT_BAD_OLD_PASSWORD, "Current password is incorrect."))?;
    if !verify_password(&input.old_password, &hash)? {
        return Err(AppError::new(
            ACCOUNT_BAD_OLD_PASSWORD,
            "Current password is incorrect.",
        ));
    }

    let new_hash = hash_password(&input.new_password)?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&new_hash)
        .bind(now_ms())
        .bind(&actor.id)
        .execute(pool)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

pub async fn google_auth(
    pool: &SqlitePool,
    jwt: &JwtKeys,
    verifier: &dyn GoogleVerifier,
    id_token: &str,
) -> AppResult<AuthResponse> {
    let identity = verifier.verify(id_token).await?;
    if identity.email.trim().is_empty() {
        return Err(AppError::new(
            GOOGLE_EMAIL_MISSING,
            "Google token carries no email address.",
        ));
    }
    if !identity.email_verified {
        return Err(AppError::new(
            GOOGLE_EMAIL_UNVERIFIED,
            "Google email address is not verified.",
        ));
    }
    let email = normalize_email(&identity.email)?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM users WHERE email = ? COLLATE NOCASE")
            .bind(&email)
            .fetch_optional(pool)
            .await
            .map_err(AppError::from)?;

    let user_id = match existing {
        Some(user_id) => {
            backfill_names(pool, &user_id, &identity.given_name, &identity.family_name).await?;
            user_id
        }
        None => {
            let username = unique_username_from_email(pool, &email).await?;
            let user_id = new_uuid_v7();
            let now = now_ms();

            let mut tx = pool.begin().await.map_err(AppError::from)?;
            let household_id =
                household::provision(&mut tx, &format!("{username}'s Household")).await?;
            sqlx::query(
                "INSERT INTO users (id, username, email, password_hash, first_name, last_name, \
                 household_id, role, auth_provider, created_at, updated_at) \
                 VALUES (?, ?, ?, NULL, ?, ?, ?, 'admin', 'google', ?, ?)",
            )
            .bind(&user_id)
            .bind(&username)
            .bind(&email)
            .bind(&identity.given_name)
            .bind(&identity.family_name)
            .bind(&household_id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

            let name = if identity.full_name.trim().is_empty() {
                username.clone()
            } else {
                identity.full_name.trim().to_string()
            };
            members::link_or_create_for_user(&mut tx, &household_id, &user_id, &name).await?;
            tx.commit().await.map_err(AppError::from)?;

            tracing::info!(
                target = "hearthside",
                event = "google_user_created",
                user_id = %user_id,
                household_id = %household_id
            );
            user_id
        }
    };

    Ok(AuthResponse {
        user: profile(pool, &user_id).await?,
        tokens: jwt.issue_pair(&user_id, &email)?,
    })
}

/// Fill in empty name fields from the Google profile; never overwrites a
/// name the user set themselves.
async fn backfill_names(
    pool: &SqlitePool,
    user_id: &str,
    given_name: &str,
    family_name: &str,
) -> AppResult<()> {
    if given_name.is_empty() && family_name.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "UPDATE users SET \
         first_name = CASE WHEN first_name = '' THEN ? ELSE first_name END, \
         last_name = CASE WHEN last_name = '' THEN ? ELSE last_name END, \
         updated_at = ? WHERE id = ?",
    )
    .bind(given_name)
    .bind(family_name)
    .bind(now_ms())
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

/// Derive a username from the email local part, suffixing a counter until
/// it is free.
async fn unique_username_from_email(pool: &SqlitePool, email: &str) -> AppResult<String> {
    let base: String = email
        .split('@')
        .next()
        .unwrap_or("user")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect();
    let base = if base.is_empty() { "user".to_string() } else { base };

    let mut candidate = base.clone();
    let mut counter = 1u32;
    while username_taken(pool, &candidate, None).await? {
        candidate = format!("{base}{counter}");
        counter += 1;
    }
    Ok(candidate)
}

// --- HTTP handlers ---

pub async fn register_handler(
    State(state): State<ApiState>,
    Json(input): Json<RegisterInput>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = register(&state.pool, &state.jwt, input).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login_handler(
    State(state): State<ApiState>,
    Json(input): Json<LoginInput>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(login(&state.pool, &state.jwt, input).await?))
}

pub async fn refresh_handler(
    State(state): State<ApiState>,
    Json(input): Json<RefreshInput>,
) -> AppResult<Json<TokenPair>> {
    Ok(Json(refresh(&state.pool, &state.jwt, input).await?))
}

#[derive(Debug, Deserialize)]
pub struct GoogleAuthInput {
    pub id_token: String,
}

pub async fn google_handler(
    State(state): State<ApiState>,
    Json(input): Json<GoogleAuthInput>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(
        google_auth(&state.pool, &state.jwt, state.google.as_ref(), &input.id_token).await?,
    ))
}

pub async fn me_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(profile(&state.pool, &actor.id).await?))
}

pub async fn me_patch_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Json(patch): Json<MePatch>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(update_me(&state.pool, &actor, patch).await?))
}

pub async fn change_password_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Json(input): Json<ChangePasswordInput>,
) -> AppResult<Json<serde_json::Value>> {
    change_password(&state.pool, &actor, input).await?;
    Ok(Json(serde_json::json!({ "detail": "Password changed." })))
}
