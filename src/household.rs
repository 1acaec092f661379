//! Household provisioning and role administration.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::{Action, AuthUser};
use crate::id::new_uuid_v7;
use crate::model::{Role, USER_NOT_FOUND};
use crate::state::ApiState;
use crate::time::now_ms;
use crate::{AppError, AppResult};

/// Insert a household row inside an open transaction. Registration and the
/// first Google sign-in both provision one for the new account.
pub async fn provision(
    tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
    name: &str,
) -> AppResult<String> {
    let id = new_uuid_v7();
    let now = now_ms();
    sqlx::query("INSERT INTO household (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(AppError::from)?;
    Ok(id)
}

#[derive(Debug, Serialize)]
pub struct RoleChanged {
    pub user_id: String,
    pub role: Role,
}

/// Change another user's role. The target must belong to the actor's
/// household; anyone else is reported as not found rather than forbidden,
/// to avoid confirming the id exists.
pub async fn update_user_role(
    pool: &SqlitePool,
    actor: &AuthUser,
    user_id: &str,
    role: Role,
) -> AppResult<RoleChanged> {
    actor.require(Action::ManageRoles)?;
    let household_id = actor.household()?;

    let target_household: Option<Option<String>> =
        sqlx::query_scalar("SELECT household_id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::from)?;

    match target_household {
        Some(Some(h)) if h == household_id => {}
        _ => {
            return Err(AppError::new(USER_NOT_FOUND, "User not found.")
                .with_context("id", user_id.to_string()))
        }
    }

    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(now_ms())
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(AppError::from)?;

    tracing::info!(
        target = "hearthside",
        event = "role_changed",
        user_id = %user_id,
        role = %role,
        changed_by = %actor.id
    );

    Ok(RoleChanged {
        user_id: user_id.to_string(),
        role,
    })
}

// --- HTTP handlers ---

#[derive(Debug, Deserialize)]
pub struct RoleInput {
    pub role: Role,
}

pub async fn role_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<RoleInput>,
) -> AppResult<Json<RoleChanged>> {
    Ok(Json(
        update_user_role(&state.pool, &actor, &id, input.role).await?,
    ))
}
