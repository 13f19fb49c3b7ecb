use chrono::Utc;

use super::*;

#[test]
fn new_user_defaults_to_user_role() {
    let user = NewUser::new("Alice", "alice@example.com");
    assert_eq!(user.role, DEFAULT_ROLE);
    assert_eq!(user.bio, None);
    assert!(user.validate().is_ok());
}

#[test]
fn new_user_builder_methods() {
    let user = NewUser::new("Bob", "bob@example.com")
        .with_role("admin")
        .with_bio("Runs the on-call rotation");

    assert_eq!(user.role, "admin");
    assert_eq!(user.bio.as_deref(), Some("Runs the on-call rotation"));
}

#[test]
fn new_user_validation() {
    assert!(matches!(
        NewUser::new("", "a@example.com").validate(),
        Err(RagError::Validation(_))
    ));
    assert!(matches!(
        NewUser::new("   ", "a@example.com").validate(),
        Err(RagError::Validation(_))
    ));
    assert!(matches!(
        NewUser::new("Ann", "not-an-email").validate(),
        Err(RagError::Validation(_))
    ));
    assert!(matches!(
        NewUser::new("Ann", "ann@localhost").validate(),
        Err(RagError::Validation(_))
    ));
    assert!(matches!(
        NewUser::new("Ann", "ann@example.com").with_role("").validate(),
        Err(RagError::Validation(_))
    ));
}

#[test]
fn update_validation_only_checks_present_fields() {
    assert!(UserUpdate::default().is_empty());
    assert!(UserUpdate::default().validate().is_ok());

    let update = UserUpdate {
        role: Some("admin".to_string()),
        ..Default::default()
    };
    assert!(!update.is_empty());
    assert!(update.validate().is_ok());

    let update = UserUpdate {
        email: Some("broken@".to_string()),
        ..Default::default()
    };
    assert!(update.validate().is_err());
}

#[test]
fn user_id_validation() {
    let id = uuid::Uuid::new_v4().to_string();
    assert!(validate_user_id(&id).is_ok());
    assert!(validate_user_id("64b7f1c2e4b0a1b2c3d4e5f6").is_err());
    assert!(validate_user_id("").is_err());
}

#[test]
fn bio_placeholder() {
    let now = Utc::now().naive_utc();
    let mut user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: "Carol".to_string(),
        email: "carol@example.com".to_string(),
        role: "viewer".to_string(),
        bio: None,
        created_date: now,
        updated_date: now,
    };

    assert_eq!(user.bio_or_placeholder(), "N/A");
    user.bio = Some("Data analyst".to_string());
    assert_eq!(user.bio_or_placeholder(), "Data analyst");
}
