//! Shared state handed to every request handler.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::google::GoogleVerifier;
use crate::mail::Mailer;

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtKeys>,
    pub mailer: Arc<dyn Mailer>,
    pub google: Arc<dyn GoogleVerifier>,
    pub config: Arc<AppConfig>,
}
