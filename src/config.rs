//! Runtime configuration, read from CLI flags and the environment.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "hearthside", about = "Household task and rewards API server")]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    #[arg(long, env = "HEARTHSIDE_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Path to the SQLite database file.
    #[arg(long, env = "HEARTHSIDE_DB", default_value = "data/hearthside.sqlite3")]
    pub db_path: PathBuf,

    /// HS256 signing secret, at least 32 characters.
    #[arg(long, env = "HEARTHSIDE_JWT_SECRET")]
    pub jwt_secret: String,

    /// Access token lifetime in seconds.
    #[arg(long, env = "HEARTHSIDE_ACCESS_TTL_SECS", default_value_t = 3600)]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds.
    #[arg(long, env = "HEARTHSIDE_REFRESH_TTL_SECS", default_value_t = 604_800)]
    pub refresh_ttl_secs: u64,

    /// Points credited for completing a task (and debited when it is
    /// reopened).
    #[arg(long, env = "HEARTHSIDE_TASK_AWARD", default_value_t = 10)]
    pub task_award: i64,

    /// Days before a household invitation expires.
    #[arg(long, env = "HEARTHSIDE_INVITE_TTL_DAYS", default_value_t = 7)]
    pub invite_ttl_days: i64,

    /// Base URL used to build invite links.
    #[arg(
        long,
        env = "HEARTHSIDE_FRONTEND_BASE_URL",
        default_value = "http://localhost:8080"
    )]
    pub frontend_base_url: String,

    /// OAuth client id checked against the `aud` claim of Google id tokens.
    /// Google sign-in is rejected when unset.
    #[arg(long, env = "HEARTHSIDE_GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "HEARTHSIDE_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}
