use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use hearthside_lib::auth::JwtKeys;
use hearthside_lib::config::AppConfig;
use hearthside_lib::google::DisabledVerifier;
use hearthside_lib::http::router;
use hearthside_lib::mail::LogMailer;
use hearthside_lib::migrate::apply_migrations;
use hearthside_lib::state::ApiState;

async fn app() -> Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory db");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    apply_migrations(&pool).await.expect("apply migrations");

    let config = AppConfig {
        bind: "127.0.0.1:0".into(),
        db_path: PathBuf::from(":memory:"),
        jwt_secret: "integration-test-secret-0123456789abcdef".into(),
        access_ttl_secs: 3600,
        refresh_ttl_secs: 7 * 24 * 3600,
        task_award: 10,
        invite_ttl_days: 7,
        frontend_base_url: "http://app.local".into(),
        google_client_id: None,
        log_json: false,
    };
    let jwt = JwtKeys::new(
        config.jwt_secret.clone(),
        config.access_ttl_secs,
        config.refresh_ttl_secs,
    )
    .unwrap();

    router(ApiState {
        pool,
        jwt: Arc::new(jwt),
        mailer: Arc::new(LogMailer),
        google: Arc::new(DisabledVerifier),
        config: Arc::new(config),
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(builder: axum::http::request::Builder, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn register(app: &Router, username: &str) -> (String, Value) {
    let (status, body) = send(
        app,
        post(
            "/api/auth/register",
            json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "correct horse",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["tokens"]["access"].as_str().unwrap().to_string();
    (token, body)
}

#[tokio::test]
async fn health_needs_no_auth() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Request::get("/api/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_reject_missing_or_bad_tokens() {
    let app = app().await;

    let (status, body) = send(
        &app,
        Request::get("/api/tasks").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH/UNAUTHENTICATED");

    let (status, body) = send(
        &app,
        authed(Request::get("/api/tasks"), "not-a-jwt", None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH/TOKEN_INVALID");
}

#[tokio::test]
async fn task_lifecycle_over_http() {
    let app = app().await;
    let (token, _) = register(&app, "alice").await;

    let (status, task) = send(
        &app,
        authed(
            Request::post("/api/tasks"),
            &token,
            Some(json!({ "title": "Dishes", "priority": "high" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["completed"], false);
    let task_id = task["id"].as_str().unwrap();

    let (status, done) = send(
        &app,
        authed(
            Request::patch(format!("/api/tasks/{task_id}")),
            &token,
            Some(json!({ "completed": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["completed"], true);
    assert!(done["completed_at"].is_i64());

    let (status, me) = send(&app, authed(Request::get("/api/me"), &token, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["points_balance"], 10);

    let (status, _) = send(
        &app,
        authed(
            Request::delete(format!("/api/tasks/{task_id}")),
            &token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        authed(Request::get(format!("/api/tasks/{task_id}")), &token, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TASK/NOT_FOUND");
}

#[tokio::test]
async fn children_are_read_only() {
    let app = app().await;
    let (admin_token, admin) = register(&app, "admin").await;

    // Demote a second registered user into the admin's household as a child.
    let (child_token, child) = register(&app, "kid").await;
    let (status, invite) = send(
        &app,
        authed(
            Request::post("/api/household/invites"),
            &admin_token,
            Some(json!({ "email": "kid@example.com", "role": "child" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let link = invite["invite_link"].as_str().unwrap();
    let token_param = link.split("token=").nth(1).unwrap();

    let (status, accepted) = send(
        &app,
        authed(
            Request::post("/api/household/invites/accept"),
            &child_token,
            Some(json!({ "token": token_param })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["role"], "child");
    assert_eq!(
        accepted["household_id"],
        admin["user"]["household"]["id"]
    );

    // Reads work.
    let (status, _) = send(&app, authed(Request::get("/api/tasks"), &child_token, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        authed(Request::get("/api/dashboard"), &child_token, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Writes are forbidden.
    let (status, body) = send(
        &app,
        authed(
            Request::post("/api/tasks"),
            &child_token,
            Some(json!({ "title": "Sneaky" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "AUTH/FORBIDDEN");

    let (status, _) = send(
        &app,
        authed(
            Request::post("/api/rewards/redeem"),
            &child_token,
            Some(json!({ "points": 5 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        authed(
            Request::post("/api/household/invites"),
            &child_token,
            Some(json!({ "email": "x@example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let child_id = child["user"]["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        authed(
            Request::patch(format!("/api/household/users/{child_id}/role")),
            &admin_token,
            Some(json!({ "role": "adult" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rewards_and_validation_status_codes() {
    let app = app().await;
    let (token, _) = register(&app, "alice").await;

    let (status, body) = send(
        &app,
        authed(
            Request::post("/api/rewards/redeem"),
            &token,
            Some(json!({ "points": 100 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "REWARDS/INSUFFICIENT_BALANCE");

    let (status, body) = send(
        &app,
        authed(
            Request::post("/api/tasks"),
            &token,
            Some(json!({ "title": "Trip", "start_at": 2000, "due_date": 1000 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION/DATE_ORDER");

    let (status, body) = send(
        &app,
        authed(
            Request::get("/api/calendar/tasks?start=2026-01-01&end=2026-02-01"),
            &token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_array());

    let (status, _) = send(
        &app,
        authed(Request::get("/api/calendar/tasks?start=nope"), &token, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Google sign-in is rejected outright when unconfigured.
    let (status, body) = send(&app, post("/api/auth/google", json!({ "id_token": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "GOOGLE/TOKEN_INVALID");
}
