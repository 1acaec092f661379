//! Household pets. Assignable like members, but never linked to a login.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::auth::{Action, AuthUser};
use crate::id::new_uuid_v7;
use crate::model::{double_option, PET_NOT_FOUND, VALIDATION_INVALID_INPUT};
use crate::state::ApiState;
use crate::time::now_ms;
use crate::{repo, AppError, AppResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Pet {
    pub id: String,
    pub household_id: String,
    pub name: String,
    pub species: String,
    pub icon: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Pet {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            household_id: row.try_get("household_id").map_err(AppError::from)?,
            name: row.try_get("name").map_err(AppError::from)?,
            species: row.try_get("species").map_err(AppError::from)?,
            icon: row.try_get("icon").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PetInput {
    pub name: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PetPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub icon: Option<Option<String>>,
}

fn validate_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::new(
            VALIDATION_INVALID_INPUT,
            "Pet name cannot be empty.",
        ));
    }
    Ok(name)
}

const PET_COLUMNS: &str = "id, household_id, name, species, icon, created_at, updated_at";

pub async fn list_pets(pool: &SqlitePool, actor: &AuthUser) -> AppResult<Vec<Pet>> {
    let household_id = actor.household()?;
    let sql = format!("SELECT {PET_COLUMNS} FROM pets WHERE household_id = ? ORDER BY name, id");
    let rows = sqlx::query(&sql)
        .bind(household_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)?;
    rows.iter().map(Pet::try_from).collect()
}

pub async fn get_pet(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<Pet> {
    let household_id = actor.household()?;
    let sql = format!("SELECT {PET_COLUMNS} FROM pets WHERE household_id = ? AND id = ?");
    let row = sqlx::query(&sql)
        .bind(household_id)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)?;
    row.as_ref().map(Pet::try_from).transpose()?.ok_or_else(|| {
        AppError::new(PET_NOT_FOUND, "Pet not found.").with_context("id", id.to_string())
    })
}

pub async fn create_pet(pool: &SqlitePool, actor: &AuthUser, input: PetInput) -> AppResult<Pet> {
    let household_id = actor.household()?.to_string();
    let name = validate_name(&input.name)?;
    let species = input
        .species
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Dog");
    let id = new_uuid_v7();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO pets (id, household_id, name, species, icon, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&household_id)
    .bind(name)
    .bind(species)
    .bind(&input.icon)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    get_pet(pool, actor, &id).await
}

pub async fn update_pet(
    pool: &SqlitePool,
    actor: &AuthUser,
    id: &str,
    patch: PetPatch,
) -> AppResult<Pet> {
    let current = get_pet(pool, actor, id).await?;
    let name = match &patch.name {
        Some(name) => validate_name(name)?.to_string(),
        None => current.name,
    };
    let species = patch.species.unwrap_or(current.species);
    let icon = patch.icon.unwrap_or(current.icon);
    sqlx::query(
        "UPDATE pets SET name = ?, species = ?, icon = ?, updated_at = ? \
         WHERE household_id = ? AND id = ?",
    )
    .bind(&name)
    .bind(&species)
    .bind(&icon)
    .bind(now_ms())
    .bind(actor.household()?)
    .bind(id)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    get_pet(pool, actor, id).await
}

pub async fn delete_pet(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<()> {
    let household_id = actor.household()?;
    if repo::delete_scoped(pool, "pets", household_id, id).await? {
        Ok(())
    } else {
        Err(AppError::new(PET_NOT_FOUND, "Pet not found.").with_context("id", id.to_string()))
    }
}

// --- HTTP handlers ---

pub async fn list_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
) -> AppResult<Json<Vec<Pet>>> {
    Ok(Json(list_pets(&state.pool, &actor).await?))
}

pub async fn create_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Json(input): Json<PetInput>,
) -> AppResult<(StatusCode, Json<Pet>)> {
    actor.require(Action::EditPets)?;
    let pet = create_pet(&state.pool, &actor, input).await?;
    Ok((StatusCode::CREATED, Json(pet)))
}

pub async fn get_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Pet>> {
    Ok(Json(get_pet(&state.pool, &actor, &id).await?))
}

pub async fn update_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<PetPatch>,
) -> AppResult<Json<Pet>> {
    actor.require(Action::EditPets)?;
    Ok(Json(update_pet(&state.pool, &actor, &id, patch).await?))
}

pub async fn delete_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    actor.require(Action::EditPets)?;
    delete_pet(&state.pool, &actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
