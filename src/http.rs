//! HTTP boundary: error-to-status mapping, the bearer-token extractor and
//! the API router.

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use crate::auth::{extract_bearer, load_auth_user, AuthUser, TokenKind};
use crate::model::{
    ACCOUNT_BAD_OLD_PASSWORD, ACCOUNT_EMAIL_TAKEN, ACCOUNT_PASSWORD_TOO_SHORT,
    ACCOUNT_USERNAME_TAKEN, AUTH_FORBIDDEN, AUTH_INVALID_CREDENTIALS, AUTH_TOKEN_INVALID,
    AUTH_UNAUTHENTICATED, GOOGLE_EMAIL_MISSING, GOOGLE_EMAIL_UNVERIFIED, GOOGLE_TOKEN_INVALID,
    HOUSEHOLD_REQUIRED, INVITE_EMAIL_MISMATCH, INVITE_EXPIRED, REWARDS_INSUFFICIENT_BALANCE,
};
use crate::state::ApiState;
use crate::{categories, household, invites, members, pets, rewards, tasks, users, AppError};

/// Map an error code to the HTTP status returned to clients.
pub fn status_for(code: &str) -> StatusCode {
    match code {
        AUTH_UNAUTHENTICATED | AUTH_INVALID_CREDENTIALS | AUTH_TOKEN_INVALID => {
            StatusCode::UNAUTHORIZED
        }
        AUTH_FORBIDDEN | INVITE_EMAIL_MISMATCH => StatusCode::FORBIDDEN,
        _ if code.ends_with("/NOT_FOUND") => StatusCode::NOT_FOUND,
        INVITE_EXPIRED
        | REWARDS_INSUFFICIENT_BALANCE
        | HOUSEHOLD_REQUIRED
        | ACCOUNT_EMAIL_TAKEN
        | ACCOUNT_USERNAME_TAKEN
        | ACCOUNT_PASSWORD_TOO_SHORT
        | ACCOUNT_BAD_OLD_PASSWORD
        | GOOGLE_TOKEN_INVALID
        | GOOGLE_EMAIL_MISSING
        | GOOGLE_EMAIL_UNVERIFIED => StatusCode::BAD_REQUEST,
        _ if code.starts_with("VALIDATION/") => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(
                target = "hearthside",
                event = "request_failed",
                code = %self.code,
                message = %self.message
            );
        }
        (status, Json(self)).into_response()
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        status_for(&self.code)
    }
}

#[axum::async_trait]
impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::new(AUTH_UNAUTHENTICATED, "Authentication credentials required.")
            })?;
        let token = extract_bearer(header).ok_or_else(|| {
            AppError::new(AUTH_UNAUTHENTICATED, "Authentication credentials required.")
        })?;
        let claims = state.jwt.verify(token, TokenKind::Access)?;
        load_auth_user(&state.pool, &claims.sub).await
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn router(state: ApiState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(users::register_handler))
        .route("/auth/login", post(users::login_handler))
        .route("/auth/google", post(users::google_handler))
        .route("/auth/refresh", post(users::refresh_handler))
        .route(
            "/me",
            get(users::me_handler).patch(users::me_patch_handler),
        )
        .route("/change-password", post(users::change_password_handler))
        .route("/dashboard", get(tasks::dashboard_handler))
        .route("/calendar/tasks", get(tasks::calendar_handler))
        .route(
            "/tasks",
            get(tasks::list_handler).post(tasks::create_handler),
        )
        .route(
            "/tasks/:id",
            get(tasks::get_handler)
                .patch(tasks::update_handler)
                .delete(tasks::delete_handler),
        )
        .route(
            "/categories",
            get(categories::list_handler).post(categories::create_handler),
        )
        .route(
            "/categories/:id",
            get(categories::get_handler)
                .patch(categories::update_handler)
                .delete(categories::delete_handler),
        )
        .route(
            "/members",
            get(members::list_handler).post(members::create_handler),
        )
        .route(
            "/members/:id",
            get(members::get_handler)
                .patch(members::update_handler)
                .delete(members::delete_handler),
        )
        .route("/pets", get(pets::list_handler).post(pets::create_handler))
        .route(
            "/pets/:id",
            get(pets::get_handler)
                .patch(pets::update_handler)
                .delete(pets::delete_handler),
        )
        .route("/rewards/summary", get(rewards::summary_handler))
        .route("/rewards/redeem", post(rewards::redeem_handler))
        .route("/household/invites", post(invites::create_handler))
        .route(
            "/household/invites/accept",
            post(invites::accept_handler),
        )
        .route(
            "/household/users/:id/role",
            patch(household::role_handler),
        );

    Router::new().nest("/api", api).with_state(state)
}
