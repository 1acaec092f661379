//! Reward points ledger.
//!
//! Completing tasks credits the acting user's balance (see `tasks`).
//! Redemption debits it and appends a ledger row; both happen in one
//! transaction, and the debit is conditional on a sufficient balance so
//! concurrent redemptions cannot drive it negative.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::auth::{Action, AuthUser};
use crate::db::run_in_tx;
use crate::id::new_uuid_v7;
use crate::model::{REWARDS_INSUFFICIENT_BALANCE, VALIDATION_INVALID_INPUT};
use crate::state::ApiState;
use crate::time::now_ms;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Redemption {
    pub id: String,
    pub household_id: String,
    pub user_id: String,
    pub points_redeemed: i64,
    pub note: String,
    pub created_at: i64,
}

impl TryFrom<&SqliteRow> for Redemption {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            household_id: row.try_get("household_id").map_err(AppError::from)?,
            user_id: row.try_get("user_id").map_err(AppError::from)?,
            points_redeemed: row.try_get("points_redeemed").map_err(AppError::from)?,
            note: row.try_get("note").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RedeemInput {
    pub points: i64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub detail: String,
    pub points_redeemed: i64,
    pub points_balance: i64,
    pub redemption: Redemption,
}

#[derive(Debug, Serialize)]
pub struct RewardsSummary {
    pub points_balance: i64,
    pub redemptions: Vec<Redemption>,
}

pub async fn redeem(
    pool: &SqlitePool,
    actor: &AuthUser,
    input: RedeemInput,
) -> AppResult<RedeemResponse> {
    actor.require(Action::RedeemRewards)?;
    let household_id = actor.household()?.to_string();

    if input.points <= 0 {
        return Err(AppError::new(
            VALIDATION_INVALID_INPUT,
            "points must be a positive integer.",
        )
        .with_context("points", input.points.to_string()));
    }

    let now = now_ms();
    let points = input.points;
    let note = input.note.unwrap_or_default();
    let user_id = actor.id.clone();

    let (redemption, points_balance) = run_in_tx(pool, |tx| {
        async move {
            let res = sqlx::query(
                "UPDATE users SET points_balance = points_balance - ?, updated_at = ? \
                 WHERE id = ? AND points_balance >= ?",
            )
            .bind(points)
            .bind(now)
            .bind(&user_id)
            .bind(points)
            .execute(&mut **tx)
            .await
            .map_err(AppError::from)?;

            if res.rows_affected() == 0 {
                return Err(AppError::new(
                    REWARDS_INSUFFICIENT_BALANCE,
                    "Not enough points for this redemption.",
                )
                .with_context("requested", points.to_string()));
            }

            let redemption = Redemption {
                id: new_uuid_v7(),
                household_id,
                user_id: user_id.clone(),
                points_redeemed: points,
                note,
                created_at: now,
            };

            sqlx::query(
                "INSERT INTO reward_redemptions \
                 (id, household_id, user_id, points_redeemed, note, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&redemption.id)
            .bind(&redemption.household_id)
            .bind(&redemption.user_id)
            .bind(redemption.points_redeemed)
            .bind(&redemption.note)
            .bind(redemption.created_at)
            .execute(&mut **tx)
            .await
            .map_err(AppError::from)?;

            let points_balance: i64 =
                sqlx::query_scalar("SELECT points_balance FROM users WHERE id = ?")
                    .bind(&user_id)
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(AppError::from)?;

            Ok((redemption, points_balance))
        }
        .boxed()
    })
    .await?;

    tracing::info!(
        target = "hearthside",
        event = "reward_redeemed",
        user_id = %actor.id,
        points = redemption.points_redeemed,
        balance = points_balance
    );

    Ok(RedeemResponse {
        detail: "Points redeemed.".to_string(),
        points_redeemed: redemption.points_redeemed,
        points_balance,
        redemption,
    })
}

pub async fn summary(pool: &SqlitePool, actor: &AuthUser) -> AppResult<RewardsSummary> {
    actor.household()?;
    let points_balance: i64 =
        sqlx::query_scalar("SELECT points_balance FROM users WHERE id = ?")
            .bind(&actor.id)
            .fetch_one(pool)
            .await
            .map_err(AppError::from)?;

    let rows = sqlx::query(
        "SELECT id, household_id, user_id, points_redeemed, note, created_at \
         FROM reward_redemptions WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT 20",
    )
    .bind(&actor.id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from)?;

    Ok(RewardsSummary {
        points_balance,
        redemptions: rows.iter().map(Redemption::try_from).collect::<AppResult<_>>()?,
    })
}

// --- HTTP handlers ---

pub async fn redeem_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
    Json(input): Json<RedeemInput>,
) -> AppResult<(StatusCode, Json<RedeemResponse>)> {
    let response = redeem(&state.pool, &actor, input).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn summary_handler(
    State(state): State<ApiState>,
    actor: AuthUser,
) -> AppResult<Json<RewardsSummary>> {
    Ok(Json(summary(&state.pool, &actor).await?))
}
