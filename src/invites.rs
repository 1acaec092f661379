//! Household invitations.
//!
//! An admin creates an invite bound to an email address and a role. The
//! token is single use: acceptance stamps `accepted_at` and later lookups
//! treat the row as gone. The accepting account's email must match the
//! invited address (case-insensitively); anyone else holding the link is
//! refused.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::auth::{Action, AuthUser};
use crate::id::{new_token, new_uuid_v7};
use crate::mail::Mailer;
use crate::model::{
    normalize_email, Role, INVITE_EMAIL_MISMATCH, INVITE_EXPIRED, INVITE_NOT_FOUND,
};
use crate::state::ApiState;
use crate::time::now_ms;
use crate::{members, AppError, AppResult};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Deserialize)]
pub struct InviteInput {
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct InviteCreated {
    pub detail: String,
    pub invite_link: String,
    pub email: String,
    pub role: Role,
    pub email_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InviteAccepted {
    pub detail: String,
    pub household_id: String,
    pub role: Role,
}

pub async fn create_invite(
    pool: &SqlitePool,
    mailer: &dyn Mailer,
    base_url: &str,
    ttl_days: i64,
    actor: &AuthUser,
    input: InviteInput,
) -> AppResult<InviteCreated> {
    actor.require(Action::InviteUsers)?;
    let household_id = actor.household()?.to_string();
    let email = normalize_email(&input.email)?;
    let role = input.role.unwrap_or(Role::Adult);

    let id = new_uuid_v7();
    let token = new_token();
    let now = now_ms();
    let expires_at = now + ttl_days * DAY_MS;

    sqlx::query(
        "INSERT INTO household_invites (id, household_id, email, role, token, created_at, expires_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&household_id)
    .bind(&email)
    .bind(role.as_str())
    .bind(&token)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(AppError::from)?;

    let invite_link = format!("{}/invite/accept?token={}", base_url.trim_end_matches('/'), token);
    let body = format!(
        "You have been invited to join a household on Hearthside.\n\n\
         Open this link to accept: {invite_link}\n\n\
         The invitation expires in {ttl_days} days."
    );

    // Delivery failure does not void the invite; the caller gets the link
    // back and can share it out of band.
    let (email_sent, email_error) = match mailer.send(&email, "Household invitation", &body).await
    {
        Ok(()) => (true, None),
        Err(e) => {
            tracing::warn!(
                target = "hearthside",
                event = "invite_mail_failed",
                invite_id = %id,
                error = %e
            );
            (false, Some(e.to_string()))
        }
    };

    tracing::info!(
        target = "hearthside",
        event = "invite_created",
        invite_id = %id,
        household_id = %household_id,
        role = %role
    );

    Ok(InviteCreated {
        detail: "Invitation created.".to_string(),
        invite_link,
        email,
        role,
        email_sent,
        email_error,
    })
}

pub async fn accept_invite(
    pool: &SqlitePool,
    actor: &AuthUser,
    token: &str,
) -> AppResult<InviteAccepted> {
    let now = now_ms();
    let mut tx = pool.begin().await.map_err(AppError::from)?;

    let row = sqlx::query(
        "SELECT id, household_id, email, role, expires_at FROM household_invites \
         WHERE token = ? AND accepted_at IS NULL",
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await
    .map_err(AppError::from)?
    .ok_or_else(|| AppError::new(INVITE_NOT_FOUND, "Invitation not found."))?;

    let invite_id: String = row.try_get("id").map_err(AppError::from)?;
    let household_id: String = row.try_get("household_id").map_err(AppError::from)?;
    let invite_email: String = row.try_get("email").map_err(AppError::from)?;
    let role_raw: String = row.try_get("role").map_err(AppError::from)?;
    let expires_at: i64 = row.try_get("expires_at").map_err(AppError::from)?;
    let role = Role::parse(&role_raw)?;

    if now > expires_at {
        return Err(AppError::new(INVITE_EXPIRED, "This invitation has expired."));
    }
    if !invite_email.eq_ignore_ascii_case(&actor.email) {
        return Err(AppError::new(
            INVITE_EMAIL_MISMATCH,
            "This invitation was issued for a different email address.",
        ));
    }

    sqlx::query("UPDATE users SET household_id = ?, role = ?, updated_at = ? WHERE id = ?")
        .bind(&household_id)
        .bind(role.as_str())
        .bind(now)
        .bind(&actor.id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

    let display_name: Option<(String, String)> = sqlx::query(
        "SELECT first_name, last_name FROM users WHERE id = ?",
    )
    .bind(&actor.id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(AppError::from)?
    .map(|r| {
        Ok::<_, AppError>((
            r.try_get::<String, _>("first_name").map_err(AppError::from)?,
            r.try_get::<String, _>("last_name").map_err(AppError::from)?,
        ))
    })
    .transpose()?;

    let name = match display_name {
        Some((first, last)) => {
            let full = format!("{first} {last}");
            let full = full.trim().to_string();
            if full.is_empty() {
                actor.username.clone()
            } else {
                full
            }
        }
        None => actor.username.clone(),
    };

    members::link_or_create_for_user(&mut tx, &household_id, &actor.id, &name).await?;

    sqlx::query("UPDATE household_invites SET accepted_at = ? WHERE id = ?")
        .bind(now)
        .bind(&invite_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

    tx.commit().await.map_err(AppError::from)?;

    tracing::info!(
        target = "hearthside",
        event = "invite_accepted",
        invite_id = %invite_id,
        household_id = %household_id,
        user_id = %actor.id
    );

    Ok(InviteAccepted {
        detail: "Invitation accepted.".to_string(),
        household_id,
        role,
    })
}

// --- HTTP handlers ---

pub async fn create_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Json(input): Json<InviteInput>,
) -> AppResult<(StatusCode, Json<InviteCreated>)> {
    let created = create_invite(
        &state.pool,
        state.mailer.as_ref(),
        &state.config.frontend_base_url,
        state.config.invite_ttl_days,
        &actor,
        input,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct AcceptInput {
    pub token: String,
}

pub async fn accept_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Json(input): Json<AcceptInput>,
) -> AppResult<Json<InviteAccepted>> {
    Ok(Json(accept_invite(&state.pool, &actor, &input.token).await?))
}
