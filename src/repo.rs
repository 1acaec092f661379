//! Household-scoped query helpers shared by the domain modules.

use sqlx::{Sqlite, SqlitePool};

use crate::model::{VALIDATION_HOUSEHOLD_MISMATCH, VALIDATION_INVALID_INPUT};
use crate::{AppError, AppResult};

const DOMAIN_TABLES: &[&str] = &["members", "pets", "categories", "tasks"];

fn ensure_table(table: &str) -> AppResult<()> {
    if DOMAIN_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(AppError::new(VALIDATION_INVALID_INPUT, "invalid table")
            .with_context("table", table.to_string()))
    }
}

pub async fn household_of<'e, E>(executor: E, table: &str, id: &str) -> AppResult<Option<String>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    ensure_table(table)?;
    let sql = format!("SELECT household_id FROM {table} WHERE id = ?");
    sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Defense in depth for foreign keys supplied in payloads: the referenced
/// row must exist and belong to the caller's household, even though scoped
/// list queries would never have surfaced another household's ids.
pub async fn ensure_household_ref<'e, E>(
    executor: E,
    table: &str,
    household_id: &str,
    id: &str,
    field: &str,
) -> AppResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    match household_of(executor, table, id).await? {
        Some(found) if found == household_id => Ok(()),
        Some(found) => Err(AppError::new(
            VALIDATION_HOUSEHOLD_MISMATCH,
            format!("{field} must belong to your household."),
        )
        .with_context("field", field.to_string())
        .with_context("expected", household_id.to_string())
        .with_context("actual", found)),
        None => Err(AppError::new(
            VALIDATION_INVALID_INPUT,
            format!("{field} does not exist."),
        )
        .with_context("field", field.to_string())
        .with_context("id", id.to_string())),
    }
}

/// Delete a household-scoped row; reports whether a row was removed.
pub async fn delete_scoped(
    pool: &SqlitePool,
    table: &str,
    household_id: &str,
    id: &str,
) -> AppResult<bool> {
    ensure_table(table)?;
    let sql = format!("DELETE FROM {table} WHERE household_id = ? AND id = ?");
    let res = sqlx::query(&sql)
        .bind(household_id)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::from)?;
    Ok(res.rows_affected() > 0)
}
