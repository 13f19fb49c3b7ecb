use super::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .create_if_missing(true),
        )
        .await
        .expect("Failed to create test pool");

    sqlx::raw_sql(include_str!("../migrations/001_create_users.sql"))
        .execute(&pool)
        .await
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

#[tokio::test]
async fn user_crud_operations() {
    let (_temp_dir, pool) = create_test_pool().await;

    let created = UserQueries::create(
        &pool,
        NewUser::new("Alice", "alice@example.com").with_role("admin"),
    )
    .await
    .expect("Failed to create user");

    assert_eq!(created.name, "Alice");
    assert_eq!(created.role, "admin");
    assert!(Uuid::parse_str(&created.id).is_ok());

    let retrieved = UserQueries::get_by_id(&pool, &created.id)
        .await
        .expect("Failed to get user")
        .expect("User should exist");
    assert_eq!(retrieved, created);

    let update = UserUpdate {
        bio: Some("Keeps the lights on".to_string()),
        ..Default::default()
    };
    let updated = UserQueries::update(&pool, &created.id, update)
        .await
        .expect("Failed to update user")
        .expect("User should still exist");
    assert_eq!(updated.bio.as_deref(), Some("Keeps the lights on"));
    assert_eq!(updated.name, "Alice");
    assert!(updated.updated_date >= created.updated_date);

    assert!(
        UserQueries::delete(&pool, &created.id)
            .await
            .expect("Failed to delete user")
    );
    assert!(
        UserQueries::get_by_id(&pool, &created.id)
            .await
            .expect("Failed to get user")
            .is_none()
    );
}

#[tokio::test]
async fn list_preserves_creation_order_and_limit() {
    let (_temp_dir, pool) = create_test_pool().await;

    for name in ["Ann", "Ben", "Cid"] {
        UserQueries::create(
            &pool,
            NewUser::new(name, format!("{}@example.com", name.to_lowercase())),
        )
        .await
        .expect("Failed to create user");
    }

    let all = UserQueries::list(&pool, 100).await.expect("Failed to list");
    let names: Vec<&str> = all.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Ann", "Ben", "Cid"]);

    let limited = UserQueries::list(&pool, 2).await.expect("Failed to list");
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].name, "Ann");

    assert_eq!(UserQueries::count(&pool).await.expect("count"), 3);
}

#[tokio::test]
async fn empty_update_returns_existing_record() {
    let (_temp_dir, pool) = create_test_pool().await;

    let created = UserQueries::create(&pool, NewUser::new("Dee", "dee@example.com"))
        .await
        .expect("Failed to create user");

    let unchanged = UserQueries::update(&pool, &created.id, UserUpdate::default())
        .await
        .expect("Failed to update user")
        .expect("User should exist");
    assert_eq!(unchanged, created);
}

#[tokio::test]
async fn missing_records() {
    let (_temp_dir, pool) = create_test_pool().await;
    let missing = Uuid::new_v4().to_string();

    let update = UserUpdate {
        name: Some("Ghost".to_string()),
        ..Default::default()
    };
    assert!(
        UserQueries::update(&pool, &missing, update)
            .await
            .expect("update should not error")
            .is_none()
    );
    assert!(
        !UserQueries::delete(&pool, &missing)
            .await
            .expect("delete should not error")
    );
}
