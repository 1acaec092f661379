use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use hearthside_lib::auth::JwtKeys;
use hearthside_lib::config::AppConfig;
use hearthside_lib::google::{DisabledVerifier, GoogleVerifier, TokenInfoVerifier};
use hearthside_lib::mail::LogMailer;
use hearthside_lib::state::ApiState;
use hearthside_lib::{db, http, logging, migrate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::parse();
    logging::init(config.log_json);

    let pool = db::open_sqlite_pool(&config.db_path)
        .await
        .context("open database")?;
    migrate::apply_migrations(&pool)
        .await
        .context("apply migrations")?;

    let jwt = JwtKeys::new(
        config.jwt_secret.clone(),
        config.access_ttl_secs,
        config.refresh_ttl_secs,
    )?;

    let google: Arc<dyn GoogleVerifier> = match &config.google_client_id {
        Some(client_id) => Arc::new(TokenInfoVerifier::new(client_id.clone())),
        None => Arc::new(DisabledVerifier),
    };

    let bind = config.bind.clone();
    let state = ApiState {
        pool,
        jwt: Arc::new(jwt),
        mailer: Arc::new(LogMailer),
        google,
        config: Arc::new(config),
    };

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    tracing::info!(target = "hearthside", event = "server_listening", addr = %bind);

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!(target = "hearthside", event = "shutdown_signal_unavailable");
    }
    tracing::info!(target = "hearthside", event = "shutdown");
}
