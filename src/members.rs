//! Household members.
//!
//! A member is the assignable person record; it may be linked to a login
//! (`user_id`) or stand alone (a child without an account). Deleting a
//! linked user leaves the member row behind with the link cleared.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::auth::{Action, AuthUser};
use crate::id::new_uuid_v7;
use crate::model::{double_option, MEMBER_NOT_FOUND, VALIDATION_INVALID_INPUT};
use crate::state::ApiState;
use crate::time::now_ms;
use crate::{repo, AppError, AppResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Member {
    pub id: String,
    pub household_id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Member {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            household_id: row.try_get("household_id").map_err(AppError::from)?,
            user_id: row.try_get("user_id").map_err(AppError::from)?,
            name: row.try_get("name").map_err(AppError::from)?,
            avatar_url: row.try_get("avatar_url").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct MemberInput {
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MemberPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,
}

fn validate_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::new(
            VALIDATION_INVALID_INPUT,
            "Member name cannot be empty.",
        ));
    }
    Ok(name)
}

const MEMBER_COLUMNS: &str =
    "id, household_id, user_id, name, avatar_url, created_at, updated_at";

pub async fn list_members(pool: &SqlitePool, actor: &AuthUser) -> AppResult<Vec<Member>> {
    let household_id = actor.household()?;
    let sql =
        format!("SELECT {MEMBER_COLUMNS} FROM members WHERE household_id = ? ORDER BY name, id");
    let rows = sqlx::query(&sql)
        .bind(household_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)?;
    rows.iter().map(Member::try_from).collect()
}

pub async fn get_member(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<Member> {
    let household_id = actor.household()?;
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE household_id = ? AND id = ?");
    let row = sqlx::query(&sql)
        .bind(household_id)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)?;
    row.as_ref()
        .map(Member::try_from)
        .transpose()?
        .ok_or_else(|| {
            AppError::new(MEMBER_NOT_FOUND, "Member not found.")
                .with_context("id", id.to_string())
        })
}

pub async fn create_member(
    pool: &SqlitePool,
    actor: &AuthUser,
    input: MemberInput,
) -> AppResult<Member> {
    let household_id = actor.household()?.to_string();
    let name = validate_name(&input.name)?;
    let id = new_uuid_v7();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO members (id, household_id, name, avatar_url, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&household_id)
    .bind(name)
    .bind(&input.avatar_url)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    get_member(pool, actor, &id).await
}

pub async fn update_member(
    pool: &SqlitePool,
    actor: &AuthUser,
    id: &str,
    patch: MemberPatch,
) -> AppResult<Member> {
    let current = get_member(pool, actor, id).await?;
    let name = match &patch.name {
        Some(name) => validate_name(name)?.to_string(),
        None => current.name,
    };
    let avatar_url = patch.avatar_url.unwrap_or(current.avatar_url);
    sqlx::query(
        "UPDATE members SET name = ?, avatar_url = ?, updated_at = ? \
         WHERE household_id = ? AND id = ?",
    )
    .bind(&name)
    .bind(&avatar_url)
    .bind(now_ms())
    .bind(actor.household()?)
    .bind(id)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    get_member(pool, actor, id).await
}

pub async fn delete_member(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<()> {
    let household_id = actor.household()?;
    if repo::delete_scoped(pool, "members", household_id, id).await? {
        Ok(())
    } else {
        Err(AppError::new(MEMBER_NOT_FOUND, "Member not found.")
            .with_context("id", id.to_string()))
    }
}

/// Find the member row linked to a user, creating one when missing. Used
/// when an account joins a household.
pub async fn link_or_create_for_user(
    tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
    household_id: &str,
    user_id: &str,
    display_name: &str,
) -> AppResult<String> {
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM members WHERE household_id = ? AND user_id = ?",
    )
    .bind(household_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(AppError::from)?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let id = new_uuid_v7();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO members (id, household_id, user_id, name, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(household_id)
    .bind(user_id)
    .bind(display_name)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(AppError::from)?;
    Ok(id)
}

// --- HTTP handlers ---

pub async fn list_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
) -> AppResult<Json<Vec<Member>>> {
    Ok(Json(list_members(&state.pool, &actor).await?))
}

pub async fn create_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Json(input): Json<MemberInput>,
) -> AppResult<(StatusCode, Json<Member>)> {
    actor.require(Action::EditMembers)?;
    let member = create_member(&state.pool, &actor, input).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn get_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Member>> {
    Ok(Json(get_member(&state.pool, &actor, &id).await?))
}

pub async fn update_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<MemberPatch>,
) -> AppResult<Json<Member>> {
    actor.require(Action::EditMembers)?;
    Ok(Json(update_member(&state.pool, &actor, &id, patch).await?))
}

pub async fn delete_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    actor.require(Action::EditMembers)?;
    delete_member(&state.pool, &actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
