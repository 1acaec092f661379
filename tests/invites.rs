use async_trait::async_trait;
use hearthside_lib::auth::AuthUser;
use hearthside_lib::invites::{self, InviteInput};
use hearthside_lib::mail::Mailer;
use hearthside_lib::migrate::apply_migrations;
use hearthside_lib::model::Role;
use hearthside_lib::time::now_ms;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

struct OkMailer;

#[async_trait]
impl Mailer for OkMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

struct FailMailer;

#[async_trait]
impl Mailer for FailMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
        anyhow::bail!("smtp unreachable")
    }
}

async fn setup() -> SqlitePool {
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
    pool
}

async fn seed_actor(
    pool: &SqlitePool,
    user: &str,
    email: &str,
    household: Option<&str>,
    role: Role,
) -> AuthUser {
    if let Some(h) = household {
        sqlx::query(
            "INSERT OR IGNORE INTO household (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(h)
        .bind(h)
        .bind(now_ms())
        .bind(now_ms())
        .execute(pool)
        .await
        .unwrap();
    }
    sqlx::query(
        "INSERT INTO users (id, username, email, first_name, last_name, household_id, role, \
         created_at, updated_at) VALUES (?, ?, ?, 'Pat', 'Example', ?, ?, ?, ?)",
    )
    .bind(user)
    .bind(user)
    .bind(email)
    .bind(household)
    .bind(role.as_str())
    .bind(now_ms())
    .bind(now_ms())
    .execute(pool)
    .await
    .unwrap();
    AuthUser {
        id: user.to_string(),
        username: user.to_string(),
        email: email.to_string(),
        role,
        household_id: household.map(str::to_string),
    }
}

fn invite(email: &str) -> InviteInput {
    InviteInput {
        email: email.to_string(),
        role: None,
    }
}

fn token_of(link: &str) -> String {
    link.split("token=").nth(1).unwrap().to_string()
}

#[tokio::test]
async fn only_admins_create_invites() {
    let pool = setup().await;
    let adult = seed_actor(&pool, "adult", "adult@example.com", Some("hh1"), Role::Adult).await;
    let err = invites::create_invite(
        &pool,
        &OkMailer,
        "http://app.local",
        7,
        &adult,
        invite("new@example.com"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "AUTH/FORBIDDEN");
}

#[tokio::test]
async fn accept_moves_user_and_creates_member() {
    let pool = setup().await;
    let admin = seed_actor(&pool, "admin", "admin@example.com", Some("hh1"), Role::Admin).await;
    let joiner = seed_actor(&pool, "joiner", "new@example.com", Some("hh2"), Role::Admin).await;

    let created = invites::create_invite(
        &pool,
        &OkMailer,
        "http://app.local/",
        7,
        &admin,
        InviteInput {
            email: "New@Example.com".into(),
            role: Some(Role::Child),
        },
    )
    .await
    .unwrap();
    assert!(created.email_sent);
    assert_eq!(created.email, "new@example.com");
    assert!(created.invite_link.starts_with("http://app.local/invite/accept?token="));

    let accepted = invites::accept_invite(&pool, &joiner, &token_of(&created.invite_link))
        .await
        .unwrap();
    assert_eq!(accepted.household_id, "hh1");
    assert_eq!(accepted.role, Role::Child);

    let (household, role): (String, String) =
        sqlx::query_as("SELECT household_id, role FROM users WHERE id = 'joiner'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(household, "hh1");
    assert_eq!(role, "child");

    let member_name: String = sqlx::query_scalar(
        "SELECT name FROM members WHERE household_id = 'hh1' AND user_id = 'joiner'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(member_name, "Pat Example");
}

#[tokio::test]
async fn token_is_single_use() {
    let pool = setup().await;
    let admin = seed_actor(&pool, "admin", "admin@example.com", Some("hh1"), Role::Admin).await;
    let joiner = seed_actor(&pool, "joiner", "new@example.com", None, Role::Adult).await;

    let created = invites::create_invite(
        &pool,
        &OkMailer,
        "http://app.local",
        7,
        &admin,
        invite("new@example.com"),
    )
    .await
    .unwrap();
    let token = token_of(&created.invite_link);

    invites::accept_invite(&pool, &joiner, &token).await.unwrap();
    let err = invites::accept_invite(&pool, &joiner, &token).await.unwrap_err();
    assert_eq!(err.code(), "INVITE/NOT_FOUND");
}

#[tokio::test]
async fn expired_invites_are_refused() {
    let pool = setup().await;
    let admin = seed_actor(&pool, "admin", "admin@example.com", Some("hh1"), Role::Admin).await;
    let joiner = seed_actor(&pool, "joiner", "new@example.com", None, Role::Adult).await;

    let created = invites::create_invite(
        &pool,
        &OkMailer,
        "http://app.local",
        -1,
        &admin,
        invite("new@example.com"),
    )
    .await
    .unwrap();

    let err = invites::accept_invite(&pool, &joiner, &token_of(&created.invite_link))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVITE/EXPIRED");
}

#[tokio::test]
async fn wrong_email_is_forbidden() {
    let pool = setup().await;
    let admin = seed_actor(&pool, "admin", "admin@example.com", Some("hh1"), Role::Admin).await;
    let wrong = seed_actor(&pool, "wrong", "other@example.com", None, Role::Adult).await;

    let created = invites::create_invite(
        &pool,
        &OkMailer,
        "http://app.local",
        7,
        &admin,
        invite("new@example.com"),
    )
    .await
    .unwrap();

    let err = invites::accept_invite(&pool, &wrong, &token_of(&created.invite_link))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVITE/EMAIL_MISMATCH");

    // The token survives the failed attempt.
    let unaccepted: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM household_invites WHERE accepted_at IS NULL",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(unaccepted, 1);
}

#[tokio::test]
async fn mail_failure_still_creates_the_invite() {
    let pool = setup().await;
    let admin = seed_actor(&pool, "admin", "admin@example.com", Some("hh1"), Role::Admin).await;

    let created = invites::create_invite(
        &pool,
        &FailMailer,
        "http://app.local",
        7,
        &admin,
        invite("new@example.com"),
    )
    .await
    .unwrap();
    assert!(!created.email_sent);
    assert!(created.email_error.unwrap().contains("smtp unreachable"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM household_invites")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
