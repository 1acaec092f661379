use hearthside_lib::auth::AuthUser;
use hearthside_lib::migrate::apply_migrations;
use hearthside_lib::model::{Priority, Role};
use hearthside_lib::tasks::{self, TaskFilter, TaskInput, TaskPatch};
use hearthside_lib::time::now_ms;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

const AWARD: i64 = 10;

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

async fn seed_household(pool: &SqlitePool, id: &str) {
    sqlx::query("INSERT INTO household (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(format!("{id} household"))
        .bind(now_ms())
        .bind(now_ms())
        .execute(pool)
        .await
        .unwrap();
}

async fn seed_user(pool: &SqlitePool, id: &str, household_id: &str, role: Role) -> AuthUser {
    sqlx::query(
        "INSERT INTO users (id, username, email, first_name, last_name, household_id, role, \
         created_at, updated_at) VALUES (?, ?, ?, '', '', ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(id)
    .bind(format!("{id}@example.com"))
    .bind(household_id)
    .bind(role.as_str())
    .bind(now_ms())
    .bind(now_ms())
    .execute(pool)
    .await
    .unwrap();
    AuthUser {
        id: id.to_string(),
        username: id.to_string(),
        email: format!("{id}@example.com"),
        role,
        household_id: Some(household_id.to_string()),
    }
}

async fn balance(pool: &SqlitePool, user_id: &str) -> i64 {
    sqlx::query_scalar("SELECT points_balance FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn input(title: &str) -> TaskInput {
    TaskInput {
        title: title.to_string(),
        description: String::new(),
        category_id: None,
        assignee_member_id: None,
        assignee_pet_id: None,
        start_at: None,
        due_date: None,
        priority: None,
        completed: false,
    }
}

#[tokio::test]
async fn completing_a_task_credits_the_actor() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    let actor = seed_user(&pool, "alice", "hh1", Role::Adult).await;

    let task = tasks::create_task(&pool, &actor, input("Dishes")).await.unwrap();
    assert!(!task.completed);
    assert_eq!(task.completed_at, None);

    let patch = TaskPatch {
        completed: Some(true),
        ..Default::default()
    };
    let done = tasks::update_task(&pool, &actor, &task.id, patch, AWARD)
        .await
        .unwrap();
    assert!(done.completed);
    assert!(done.completed_at.is_some());
    assert_eq!(balance(&pool, "alice").await, AWARD);
}

#[tokio::test]
async fn saving_an_already_completed_task_does_not_credit_again() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    let actor = seed_user(&pool, "alice", "hh1", Role::Adult).await;
    let task = tasks::create_task(&pool, &actor, input("Dishes")).await.unwrap();

    let complete = TaskPatch {
        completed: Some(true),
        ..Default::default()
    };
    tasks::update_task(&pool, &actor, &task.id, complete, AWARD)
        .await
        .unwrap();

    // Re-saving with completed still true, and unrelated edits, award nothing.
    let retitle = TaskPatch {
        title: Some("Dishes again".into()),
        completed: Some(true),
        ..Default::default()
    };
    tasks::update_task(&pool, &actor, &task.id, retitle, AWARD)
        .await
        .unwrap();
    assert_eq!(balance(&pool, "alice").await, AWARD);
}

#[tokio::test]
async fn reopening_a_task_debits_and_keeps_completed_at() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    let actor = seed_user(&pool, "alice", "hh1", Role::Adult).await;
    let task = tasks::create_task(&pool, &actor, input("Dishes")).await.unwrap();

    let complete = TaskPatch {
        completed: Some(true),
        ..Default::default()
    };
    let done = tasks::update_task(&pool, &actor, &task.id, complete, AWARD)
        .await
        .unwrap();
    let first_completed_at = done.completed_at.unwrap();

    let reopen = TaskPatch {
        completed: Some(false),
        ..Default::default()
    };
    let reopened = tasks::update_task(&pool, &actor, &task.id, reopen, AWARD)
        .await
        .unwrap();
    assert!(!reopened.completed);
    assert_eq!(reopened.completed_at, Some(first_completed_at));
    assert_eq!(balance(&pool, "alice").await, 0);

    // Completing again credits again but the original timestamp stays.
    let complete = TaskPatch {
        completed: Some(true),
        ..Default::default()
    };
    let done_again = tasks::update_task(&pool, &actor, &task.id, complete, AWARD)
        .await
        .unwrap();
    assert_eq!(done_again.completed_at, Some(first_completed_at));
    assert_eq!(balance(&pool, "alice").await, AWARD);
}

#[tokio::test]
async fn toggle_points_go_to_the_actor_not_the_assignee() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    let creator = seed_user(&pool, "alice", "hh1", Role::Adult).await;
    let toggler = seed_user(&pool, "bob", "hh1", Role::Adult).await;

    let task = tasks::create_task(&pool, &creator, input("Bins")).await.unwrap();
    let patch = TaskPatch {
        completed: Some(true),
        ..Default::default()
    };
    tasks::update_task(&pool, &toggler, &task.id, patch, AWARD)
        .await
        .unwrap();

    assert_eq!(balance(&pool, "alice").await, 0);
    assert_eq!(balance(&pool, "bob").await, AWARD);
}

#[tokio::test]
async fn start_after_due_is_rejected() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    let actor = seed_user(&pool, "alice", "hh1", Role::Adult).await;

    let mut bad = input("Trip");
    bad.start_at = Some(2_000);
    bad.due_date = Some(1_000);
    let err = tasks::create_task(&pool, &actor, bad).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/DATE_ORDER");

    // Patching into an invalid ordering is also rejected.
    let mut ok = input("Trip");
    ok.start_at = Some(1_000);
    ok.due_date = Some(2_000);
    let task = tasks::create_task(&pool, &actor, ok).await.unwrap();
    let patch = TaskPatch {
        due_date: Some(Some(500)),
        ..Default::default()
    };
    let err = tasks::update_task(&pool, &actor, &task.id, patch, AWARD)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/DATE_ORDER");
}

#[tokio::test]
async fn foreign_keys_must_belong_to_the_household() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    seed_household(&pool, "hh2").await;
    let actor = seed_user(&pool, "alice", "hh1", Role::Adult).await;
    let outsider = seed_user(&pool, "mallory", "hh2", Role::Adult).await;

    let foreign_cat = hearthside_lib::categories::create_category(
        &pool,
        &outsider,
        hearthside_lib::categories::CategoryInput {
            name: "Chores".into(),
        },
    )
    .await
    .unwrap();

    let mut task = input("Dishes");
    task.category_id = Some(foreign_cat.id.clone());
    let err = tasks::create_task(&pool, &actor, task).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/HOUSEHOLD_MISMATCH");

    let mut task = input("Dishes");
    task.category_id = Some("no-such-id".into());
    let err = tasks::create_task(&pool, &actor, task).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/INVALID_INPUT");
}

#[tokio::test]
async fn patch_can_clear_nullable_fields() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    let actor = seed_user(&pool, "alice", "hh1", Role::Adult).await;

    let cat = hearthside_lib::categories::create_category(
        &pool,
        &actor,
        hearthside_lib::categories::CategoryInput {
            name: "Chores".into(),
        },
    )
    .await
    .unwrap();

    let mut with_cat = input("Dishes");
    with_cat.category_id = Some(cat.id.clone());
    with_cat.due_date = Some(9_999);
    let task = tasks::create_task(&pool, &actor, with_cat).await.unwrap();
    assert_eq!(task.category_id, Some(cat.id));

    // Explicit nulls clear; absent fields are untouched.
    let patch: TaskPatch =
        serde_json::from_str(r#"{"category_id": null}"#).unwrap();
    let updated = tasks::update_task(&pool, &actor, &task.id, patch, AWARD)
        .await
        .unwrap();
    assert_eq!(updated.category_id, None);
    assert_eq!(updated.due_date, Some(9_999));
}

#[tokio::test]
async fn list_filters_apply() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    let actor = seed_user(&pool, "alice", "hh1", Role::Adult).await;

    let mut a = input("Wash the dishes");
    a.priority = Some(Priority::High);
    tasks::create_task(&pool, &actor, a).await.unwrap();
    let b = tasks::create_task(&pool, &actor, input("Walk the dog")).await.unwrap();
    let patch = TaskPatch {
        completed: Some(true),
        ..Default::default()
    };
    tasks::update_task(&pool, &actor, &b.id, patch, AWARD)
        .await
        .unwrap();

    let all = tasks::list_tasks(&pool, &actor, &TaskFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let filter = TaskFilter {
        search: Some("dish".into()),
        ..Default::default()
    };
    let dishes = tasks::list_tasks(&pool, &actor, &filter).await.unwrap();
    assert_eq!(dishes.len(), 1);
    assert_eq!(dishes[0].title, "Wash the dishes");

    let filter = TaskFilter {
        completed: Some("true".into()),
        ..Default::default()
    };
    let done = tasks::list_tasks(&pool, &actor, &filter).await.unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].title, "Walk the dog");
}

#[tokio::test]
async fn dashboard_counts_and_buckets() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    let actor = seed_user(&pool, "alice", "hh1", Role::Adult).await;
    let now = now_ms();

    let mut overdue = input("Overdue");
    overdue.due_date = Some(now - 86_400_000);
    tasks::create_task(&pool, &actor, overdue).await.unwrap();

    let mut upcoming = input("Upcoming");
    upcoming.due_date = Some(now + 86_400_000);
    tasks::create_task(&pool, &actor, upcoming).await.unwrap();

    let done = tasks::create_task(&pool, &actor, input("Done")).await.unwrap();
    let patch = TaskPatch {
        completed: Some(true),
        ..Default::default()
    };
    tasks::update_task(&pool, &actor, &done.id, patch, AWARD)
        .await
        .unwrap();

    let dash = tasks::dashboard(&pool, &actor).await.unwrap();
    assert_eq!(dash.stats.completed_this_week, 1);
    assert_eq!(dash.stats.pending_rewards, 1);
    assert_eq!(dash.overdue.len(), 1);
    assert_eq!(dash.overdue[0].title, "Overdue");
    assert_eq!(dash.upcoming.len(), 1);
    assert_eq!(dash.upcoming[0].title, "Upcoming");
}

#[tokio::test]
async fn calendar_window_selects_overlapping_tasks() {
    let pool = setup().await;
    seed_household(&pool, "hh1").await;
    let actor = seed_user(&pool, "alice", "hh1", Role::Adult).await;

    let mut spanning = input("Spanning");
    spanning.start_at = Some(0);
    spanning.due_date = Some(10_000);
    tasks::create_task(&pool, &actor, spanning).await.unwrap();

    let mut inside = input("Inside");
    inside.due_date = Some(5_000);
    tasks::create_task(&pool, &actor, inside).await.unwrap();

    let mut outside = input("Outside");
    outside.due_date = Some(50_000);
    tasks::create_task(&pool, &actor, outside).await.unwrap();

    let hits = tasks::calendar_tasks(&pool, &actor, 4_000, 6_000).await.unwrap();
    let titles: Vec<_> = hits.iter().map(|t| t.title.as_str()).collect();
    assert!(titles.contains(&"Spanning"));
    assert!(titles.contains(&"Inside"));
    assert!(!titles.contains(&"Outside"));
}
