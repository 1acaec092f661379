//! Task CRUD and the completion state machine.
//!
//! A task is `pending` (completed = 0) or `done` (completed = 1). The edge
//! between the previous persisted value and the patched value drives the
//! points side effect: false→true credits the acting user by the fixed
//! award, true→false debits it. `completed_at` is stamped once, on the
//! first false→true edge, and is never cleared afterwards. The row update
//! and the points mutation share one transaction.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::auth::{Action, AuthUser};
use crate::id::new_uuid_v7;
use crate::model::{
    double_option, Priority, TASK_NOT_FOUND, VALIDATION_DATE_ORDER, VALIDATION_INVALID_INPUT,
};
use crate::state::ApiState;
use crate::time::{now_ms, start_of_week_ms};
use crate::{repo, AppError, AppResult};

const TASK_COLUMNS: &str = "id, household_id, title, description, category_id, \
     assignee_member_id, assignee_pet_id, start_at, due_date, priority, completed, \
     completed_at, calendar_id, calendar_event_id, calendar_sync_status, \
     calendar_sync_error, calendar_last_synced_at, created_at, updated_at";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub household_id: String,
    pub title: String,
    pub description: String,
    pub category_id: Option<String>,
    pub assignee_member_id: Option<String>,
    pub assignee_pet_id: Option<String>,
    pub start_at: Option<i64>,
    pub due_date: Option<i64>,
    pub priority: Priority,
    pub completed: bool,
    pub completed_at: Option<i64>,
    pub calendar_id: Option<String>,
    pub calendar_event_id: Option<String>,
    pub calendar_sync_status: Option<String>,
    pub calendar_sync_error: Option<String>,
    pub calendar_last_synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Task {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let priority: String = row.try_get("priority").map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            household_id: row.try_get("household_id").map_err(AppError::from)?,
            title: row.try_get("title").map_err(AppError::from)?,
            description: row.try_get("description").map_err(AppError::from)?,
            category_id: row.try_get("category_id").map_err(AppError::from)?,
            assignee_member_id: row
                .try_get("assignee_member_id")
                .map_err(AppError::from)?,
            assignee_pet_id: row.try_get("assignee_pet_id").map_err(AppError::from)?,
            start_at: row.try_get("start_at").map_err(AppError::from)?,
            due_date: row.try_get("due_date").map_err(AppError::from)?,
            priority: Priority::parse(&priority)?,
            completed: row
                .try_get::<i64, _>("completed")
                .map(|v| v != 0)
                .map_err(AppError::from)?,
            completed_at: row.try_get("completed_at").map_err(AppError::from)?,
            calendar_id: row.try_get("calendar_id").map_err(AppError::from)?,
            calendar_event_id: row.try_get("calendar_event_id").map_err(AppError::from)?,
            calendar_sync_status: row
                .try_get("calendar_sync_status")
                .map_err(AppError::from)?,
            calendar_sync_error: row
                .try_get("calendar_sync_error")
                .map_err(AppError::from)?,
            calendar_last_synced_at: row
                .try_get("calendar_last_synced_at")
                .map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub assignee_member_id: Option<String>,
    #[serde(default)]
    pub assignee_pet_id: Option<String>,
    #[serde(default)]
    pub start_at: Option<i64>,
    #[serde(default)]
    pub due_date: Option<i64>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub completed: bool,
}

/// Partial update. Nullable foreign keys and dates use the double-`Option`
/// encoding so "absent" and "set to null" stay distinguishable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_member_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_pet_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_at: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<i64>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub assignee_member: Option<String>,
    #[serde(default)]
    pub assignee_pet: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
}

fn parse_completed_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn validate_title(title: &str) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::new(
            VALIDATION_INVALID_INPUT,
            "Task title cannot be empty.",
        ));
    }
    Ok(())
}

fn validate_dates(start_at: Option<i64>, due_date: Option<i64>) -> AppResult<()> {
    if let (Some(start), Some(due)) = (start_at, due_date) {
        if start > due {
            return Err(AppError::new(
                VALIDATION_DATE_ORDER,
                "start_at must be before or equal to due_date.",
            )
            .with_context("start_at", start.to_string())
            .with_context("due_date", due.to_string()));
        }
    }
    Ok(())
}

async fn fetch_task(
    tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
    household_id: &str,
    id: &str,
) -> AppResult<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE household_id = ? AND id = ?");
    let row = sqlx::query(&sql)
        .bind(household_id)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::from)?;
    row.as_ref().map(Task::try_from).transpose()
}

pub async fn create_task(
    pool: &SqlitePool,
    actor: &AuthUser,
    input: TaskInput,
) -> AppResult<Task> {
    let household_id = actor.household()?.to_string();
    validate_title(&input.title)?;
    validate_dates(input.start_at, input.due_date)?;

    if let Some(category_id) = &input.category_id {
        repo::ensure_household_ref(pool, "categories", &household_id, category_id, "category")
            .await?;
    }
    if let Some(member_id) = &input.assignee_member_id {
        repo::ensure_household_ref(pool, "members", &household_id, member_id, "assignee_member")
            .await?;
    }
    if let Some(pet_id) = &input.assignee_pet_id {
        repo::ensure_household_ref(pool, "pets", &household_id, pet_id, "assignee_pet").await?;
    }

    let id = new_uuid_v7();
    let now = now_ms();
    let priority = input.priority.unwrap_or(Priority::Low);
    let completed_at = if input.completed { Some(now) } else { None };

    sqlx::query(
        "INSERT INTO tasks (id, household_id, title, description, category_id, \
         assignee_member_id, assignee_pet_id, start_at, due_date, priority, completed, \
         completed_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&household_id)
    .bind(input.title.trim())
    .bind(&input.description)
    .bind(&input.category_id)
    .bind(&input.assignee_member_id)
    .bind(&input.assignee_pet_id)
    .bind(input.start_at)
    .bind(input.due_date)
    .bind(priority.as_str())
    .bind(input.completed as i64)
    .bind(completed_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(AppError::from)?;

    get_task(pool, actor, &id).await
}

pub async fn list_tasks(
    pool: &SqlitePool,
    actor: &AuthUser,
    filter: &TaskFilter,
) -> AppResult<Vec<Task>> {
    let household_id = actor.household()?;

    enum Arg {
        Text(String),
        Int(i64),
    }

    let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE household_id = ?");
    let mut args: Vec<Arg> = vec![Arg::Text(household_id.to_string())];

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sql.push_str(" AND (title LIKE ? OR description LIKE ?)");
        let pattern = format!("%{search}%");
        args.push(Arg::Text(pattern.clone()));
        args.push(Arg::Text(pattern));
    }
    if let Some(category) = &filter.category {
        sql.push_str(" AND category_id = ?");
        args.push(Arg::Text(category.clone()));
    }
    if let Some(member) = &filter.assignee_member {
        sql.push_str(" AND assignee_member_id = ?");
        args.push(Arg::Text(member.clone()));
    }
    if let Some(pet) = &filter.assignee_pet {
        sql.push_str(" AND assignee_pet_id = ?");
        args.push(Arg::Text(pet.clone()));
    }
    if let Some(flag) = filter.completed.as_deref().and_then(parse_completed_flag) {
        sql.push_str(" AND completed = ?");
        args.push(Arg::Int(flag as i64));
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");

    let mut query = sqlx::query(&sql);
    for arg in &args {
        query = match arg {
            Arg::Text(t) => query.bind(t),
            Arg::Int(i) => query.bind(i),
        };
    }

    let rows = query.fetch_all(pool).await.map_err(AppError::from)?;
    rows.iter().map(Task::try_from).collect()
}

pub async fn get_task(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<Task> {
    let household_id = actor.household()?;
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE household_id = ? AND id = ?");
    let row = sqlx::query(&sql)
        .bind(household_id)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)?;
    row.as_ref()
        .map(Task::try_from)
        .transpose()?
        .ok_or_else(|| {
            AppError::new(TASK_NOT_FOUND, "Task not found.").with_context("id", id.to_string())
        })
}

/// Apply a partial update and evaluate the completion edge. The task save
/// and the points mutation commit together or not at all.
pub async fn update_task(
    pool: &SqlitePool,
    actor: &AuthUser,
    id: &str,
    patch: TaskPatch,
    award: i64,
) -> AppResult<Task> {
    let household_id = actor.household()?.to_string();

    let mut tx = pool.begin().await.map_err(AppError::from)?;

    let current = fetch_task(&mut tx, &household_id, id)
        .await?
        .ok_or_else(|| {
            AppError::new(TASK_NOT_FOUND, "Task not found.").with_context("id", id.to_string())
        })?;

    if let Some(title) = &patch.title {
        validate_title(title)?;
    }
    if let Some(Some(category_id)) = &patch.category_id {
        repo::ensure_household_ref(&mut *tx, "categories", &household_id, category_id, "category")
            .await?;
    }
    if let Some(Some(member_id)) = &patch.assignee_member_id {
        repo::ensure_household_ref(
            &mut *tx,
            "members",
            &household_id,
            member_id,
            "assignee_member",
        )
        .await?;
    }
    if let Some(Some(pet_id)) = &patch.assignee_pet_id {
        repo::ensure_household_ref(&mut *tx, "pets", &household_id, pet_id, "assignee_pet")
            .await?;
    }

    let title = patch.title.map(|t| t.trim().to_string()).unwrap_or(current.title);
    let description = patch.description.unwrap_or(current.description);
    let category_id = patch.category_id.unwrap_or(current.category_id);
    let assignee_member_id = patch
        .assignee_member_id
        .unwrap_or(current.assignee_member_id);
    let assignee_pet_id = patch.assignee_pet_id.unwrap_or(current.assignee_pet_id);
    let start_at = patch.start_at.unwrap_or(current.start_at);
    let due_date = patch.due_date.unwrap_or(current.due_date);
    let priority = patch.priority.unwrap_or(current.priority);
    let completed = patch.completed.unwrap_or(current.completed);

    validate_dates(start_at, due_date)?;

    let now = now_ms();
    let mut completed_at = current.completed_at;
    let mut points_delta = 0i64;
    if !current.completed && completed {
        if completed_at.is_none() {
            completed_at = Some(now);
        }
        points_delta = award;
    } else if current.completed && !completed {
        // completed_at deliberately keeps the first completion time.
        points_delta = -award;
    }

    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, category_id = ?, \
         assignee_member_id = ?, assignee_pet_id = ?, start_at = ?, due_date = ?, \
         priority = ?, completed = ?, completed_at = ?, updated_at = ? \
         WHERE household_id = ? AND id = ?",
    )
    .bind(&title)
    .bind(&description)
    .bind(&category_id)
    .bind(&assignee_member_id)
    .bind(&assignee_pet_id)
    .bind(start_at)
    .bind(due_date)
    .bind(priority.as_str())
    .bind(completed as i64)
    .bind(completed_at)
    .bind(now)
    .bind(&household_id)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(AppError::from)?;

    if points_delta != 0 {
        sqlx::query(
            "UPDATE users SET points_balance = points_balance + ?, updated_at = ? WHERE id = ?",
        )
        .bind(points_delta)
        .bind(now)
        .bind(&actor.id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;
        tracing::info!(
            target = "hearthside",
            event = "task_points",
            task_id = %id,
            user_id = %actor.id,
            delta = points_delta
        );
    }

    let updated = fetch_task(&mut tx, &household_id, id)
        .await?
        .ok_or_else(|| AppError::new(TASK_NOT_FOUND, "Task not found after update."))?;

    tx.commit().await.map_err(AppError::from)?;
    Ok(updated)
}

pub async fn delete_task(pool: &SqlitePool, actor: &AuthUser, id: &str) -> AppResult<()> {
    let household_id = actor.household()?;
    if repo::delete_scoped(pool, "tasks", household_id, id).await? {
        Ok(())
    } else {
        Err(AppError::new(TASK_NOT_FOUND, "Task not found.").with_context("id", id.to_string()))
    }
}

/// Tasks overlapping `[start, end)`. A task with a `start_at` occupies the
/// `[start_at, due_date]` window; otherwise it is instant at `due_date`.
pub async fn calendar_tasks(
    pool: &SqlitePool,
    actor: &AuthUser,
    start_ms: i64,
    end_ms: i64,
) -> AppResult<Vec<Task>> {
    let household_id = actor.household()?;
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE household_id = ? AND (\
           (start_at IS NOT NULL AND due_date IS NOT NULL AND start_at < ? AND due_date >= ?) \
           OR (start_at IS NULL AND due_date IS NOT NULL AND due_date >= ? AND due_date < ?)\
         ) ORDER BY due_date, id"
    );
    let rows = sqlx::query(&sql)
        .bind(household_id)
        .bind(end_ms)
        .bind(start_ms)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)?;
    rows.iter().map(Task::try_from).collect()
}

#[derive(Debug, Serialize)]
pub struct TaskRowAssignee {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub due_date: Option<i64>,
    pub priority: Priority,
    pub completed: bool,
    pub assignee: Option<TaskRowAssignee>,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub completed_this_week: i64,
    pub pending_rewards: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub stats: DashboardStats,
    pub overdue: Vec<TaskRow>,
    pub upcoming: Vec<TaskRow>,
}

fn task_row(row: &SqliteRow) -> AppResult<TaskRow> {
    let priority: String = row.try_get("priority").map_err(AppError::from)?;
    let member_id: Option<String> = row.try_get("assignee_member_id").map_err(AppError::from)?;
    let pet_id: Option<String> = row.try_get("assignee_pet_id").map_err(AppError::from)?;

    let assignee = if let Some(id) = member_id {
        Some(TaskRowAssignee {
            id,
            name: row
                .try_get::<Option<String>, _>("member_name")
                .map_err(AppError::from)?
                .unwrap_or_default(),
            kind: "member",
            avatar_url: row.try_get("member_avatar_url").map_err(AppError::from)?,
            icon: None,
        })
    } else if let Some(id) = pet_id {
        Some(TaskRowAssignee {
            id,
            name: row
                .try_get::<Option<String>, _>("pet_name")
                .map_err(AppError::from)?
                .unwrap_or_default(),
            kind: "pet",
            avatar_url: None,
            icon: row.try_get("pet_icon").map_err(AppError::from)?,
        })
    } else {
        None
    };

    Ok(TaskRow {
        id: row.try_get("id").map_err(AppError::from)?,
        title: row.try_get("title").map_err(AppError::from)?,
        due_date: row.try_get("due_date").map_err(AppError::from)?,
        priority: Priority::parse(&priority)?,
        completed: row
            .try_get::<i64, _>("completed")
            .map(|v| v != 0)
            .map_err(AppError::from)?,
        assignee,
    })
}

const TASK_ROW_SELECT: &str = "SELECT t.id, t.title, t.due_date, t.priority, t.completed, \
     t.assignee_member_id, t.assignee_pet_id, \
     m.name AS member_name, m.avatar_url AS member_avatar_url, \
     p.name AS pet_name, p.icon AS pet_icon \
     FROM tasks t \
     LEFT JOIN members m ON m.id = t.assignee_member_id \
     LEFT JOIN pets p ON p.id = t.assignee_pet_id";

pub async fn dashboard(pool: &SqlitePool, actor: &AuthUser) -> AppResult<DashboardResponse> {
    let household_id = actor.household()?;
    let now = now_ms();
    let week_start = start_of_week_ms(now);

    let completed_this_week: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tasks WHERE household_id = ? AND completed = 1 AND completed_at >= ?",
    )
    .bind(household_id)
    .bind(week_start)
    .fetch_one(pool)
    .await
    .map_err(AppError::from)?;

    let pending_rewards: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tasks WHERE household_id = ? AND completed = 1",
    )
    .bind(household_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from)?;

    let overdue_sql = format!(
        "{TASK_ROW_SELECT} WHERE t.household_id = ? AND t.completed = 0 \
         AND t.due_date IS NOT NULL AND t.due_date < ? ORDER BY t.due_date LIMIT 10"
    );
    let overdue_rows = sqlx::query(&overdue_sql)
        .bind(household_id)
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)?;

    let upcoming_sql = format!(
        "{TASK_ROW_SELECT} WHERE t.household_id = ? AND t.completed = 0 \
         AND t.due_date IS NOT NULL AND t.due_date >= ? ORDER BY t.due_date LIMIT 10"
    );
    let upcoming_rows = sqlx::query(&upcoming_sql)
        .bind(household_id)
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)?;

    Ok(DashboardResponse {
        stats: DashboardStats {
            completed_this_week,
            pending_rewards,
        },
        overdue: overdue_rows.iter().map(task_row).collect::<AppResult<_>>()?,
        upcoming: upcoming_rows
            .iter()
            .map(task_row)
            .collect::<AppResult<_>>()?,
    })
}

// --- HTTP handlers ---

pub async fn list_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Query(filter): Query<TaskFilter>,
) -> AppResult<Json<Vec<Task>>> {
    Ok(Json(list_tasks(&state.pool, &actor, &filter).await?))
}

pub async fn create_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Json(input): Json<TaskInput>,
) -> AppResult<(StatusCode, Json<Task>)> {
    actor.require(Action::EditTasks)?;
    let task = create_task(&state.pool, &actor, input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Task>> {
    Ok(Json(get_task(&state.pool, &actor, &id).await?))
}

pub async fn update_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> AppResult<Json<Task>> {
    actor.require(Action::EditTasks)?;
    let task = update_task(&state.pool, &actor, &id, patch, state.config.task_award).await?;
    Ok(Json(task))
}

pub async fn delete_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    actor.require(Action::EditTasks)?;
    delete_task(&state.pool, &actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CalendarRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

fn parse_day(value: Option<&str>, field: &str) -> AppResult<i64> {
    let raw = value.ok_or_else(|| {
        AppError::new(
            VALIDATION_INVALID_INPUT,
            "start and end query parameters are required (YYYY-MM-DD).",
        )
        .with_context("field", field.to_string())
    })?;
    let date = raw.parse::<NaiveDate>().map_err(|_| {
        AppError::new(
            VALIDATION_INVALID_INPUT,
            "Invalid date format. Use YYYY-MM-DD.",
        )
        .with_context("field", field.to_string())
        .with_context("value", raw.to_string())
    })?;
    Ok(date
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp_millis())
}

pub async fn calendar_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Query(range): Query<CalendarRange>,
) -> AppResult<Json<Vec<Task>>> {
    let start = parse_day(range.start.as_deref(), "start")?;
    let end = parse_day(range.end.as_deref(), "end")?;
    Ok(Json(calendar_tasks(&state.pool, &actor, start, end).await?))
}

pub async fn dashboard_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
) -> AppResult<Json<DashboardResponse>> {
    Ok(Json(dashboard(&state.pool, &actor).await?))
}
