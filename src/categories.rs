//! Task categories. Plain household-scoped CRUD.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::auth::{Action, AuthUser};
use crate::id::new_uuid_v7;
use crate::model::{CATEGORY_NOT_FOUND, VALIDATION_INVALID_INPUT};
use crate::state::ApiState;
use crate::time::now_ms;
use crate::{repo, AppError, AppResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Category {
    pub id: String,
    pub household_id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Category {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            household_id: row.try_get("household_id").map_err(AppError::from)?,
            name: row.try_get("name").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    pub name: String,
}

fn validate_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::new(
            VALIDATION_INVALID_INPUT,
            "Category name cannot be empty.",
        ));
    }
    Ok(name)
}

pub async fn list_categories(pool: &SqlitePool, actor: &AuthUser) -> AppResult<Vec<Category>> {
    let household_id = actor.household()?;
    let rows = sqlx::query(
        "SELECT id, household_id, name, created_at, updated_at FROM categories \
         WHERE household_id = ? ORDER BY name, id",
    )
    .bind(household_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from)?;
    rows.iter().map(Category::try_from).collect()
}

pub async fn get_category(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<Category> {
    let household_id = actor.household()?;
    let row = sqlx::query(
        "SELECT id, household_id, name, created_at, updated_at FROM categories \
         WHERE household_id = ? AND id = ?",
    )
    .bind(household_id)
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)?;
    row.as_ref()
        .map(Category::try_from)
        .transpose()?
        .ok_or_else(|| {
            AppError::new(CATEGORY_NOT_FOUND, "Category not found.")
                .with_context("id", id.to_string())
        })
}

pub async fn create_category(
    pool: &SqlitePool,
    actor: &AuthUser,
    input: CategoryInput,
) -> AppResult<Category> {
    let household_id = actor.household()?.to_string();
    let name = validate_name(&input.name)?;
    let id = new_uuid_v7();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO categories (id, household_id, name, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&household_id)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    get_category(pool, actor, &id).await
}

pub async fn update_category(
    pool: &SqlitePool,
    actor: &AuthUser,
    id: &str,
    input: CategoryInput,
) -> AppResult<Category> {
    let household_id = actor.household()?;
    let name = validate_name(&input.name)?;
    let res = sqlx::query(
        "UPDATE categories SET name = ?, updated_at = ? WHERE household_id = ? AND id = ?",
    )
    .bind(name)
    .bind(now_ms())
    .bind(household_id)
    .bind(id)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    if res.rows_affected() == 0 {
        return Err(AppError::new(CATEGORY_NOT_FOUND, "Category not found.")
            .with_context("id", id.to_string()));
    }
    get_category(pool, actor, id).await
}

pub async fn delete_category(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<()> {
    let household_id = actor.household()?;
    if repo::delete_scoped(pool, "categories", household_id, id).await? {
        Ok(())
    } else {
        Err(AppError::new(CATEGORY_NOT_FOUND, "Category not found.")
            .with_context("id", id.to_string()))
    }
}

// --- HTTP handlers ---

pub async fn list_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(list_categories(&state.pool, &actor).await?))
}

pub async fn create_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Json(input): Json<CategoryInput>,
) -> AppResult<(StatusCode, Json<Category>)> {
    actor.require(Action::EditCategories)?;
    let category = create_category(&state.pool, &actor, input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Category>> {
    Ok(Json(get_category(&state.pool, &actor, &id).await?))
}

pub async fn update_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<CategoryInput>,
) -> AppResult<Json<Category>> {
    actor.require(Action::EditCategories)?;
    Ok(Json(update_category(&state.pool, &actor, &id, input).await?))
}

pub async fn delete_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    actor.require(Action::EditCategories)?;
    delete_category(&state.pool, &actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
