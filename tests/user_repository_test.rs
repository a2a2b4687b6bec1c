use gymdesk::{
    domain::{CreateUserRequest, MemberProfile, Role, TrainerProfile, UpdateUserRequest},
    error::AppError,
    repository::{SqliteUserRepository, UserRepository},
};
use sqlx::sqlite::SqlitePoolOptions;

#[tokio::test]
async fn test_user_crud() -> anyhow::Result<()> {
    // Single connection so the in-memory database is shared
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await?;

    let repo = SqliteUserRepository::new(pool.clone());

    let create_request = CreateUserRequest {
        email: "Test@Example.com".to_string(),
        full_name: "Test User".to_string(),
        password: "secure_password123".to_string(),
        phone: None,
        role: Role::Member(MemberProfile {
            fitness_goals: Some("Run a 10k".to_string()),
            health_notes: None,
        }),
    };

    let user = repo.create(create_request.clone()).await?;
    assert_eq!(user.email, "test@example.com");
    assert!(user.is_active);
    assert!(user.is_member());

    let found = repo.find_by_id(user.id).await?;
    assert_eq!(found.map(|u| u.id), Some(user.id));

    let found_by_email = repo.find_by_email("test@example.com").await?;
    assert!(found_by_email.is_some());

    // Emails are unique regardless of case
    let duplicate = repo.create(create_request).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let users = repo.list(10, 0).await?;
    assert_eq!(users.len(), 1);

    let update = UpdateUserRequest {
        is_active: Some(false),
        stripe_customer_id: Some("cus_test".to_string()),
        ..Default::default()
    };
    let updated = repo.update(user.id, update).await?;
    assert!(!updated.is_active);
    assert_eq!(updated.role, user.role);

    let by_customer = repo.find_by_stripe_customer_id("cus_test").await?;
    assert_eq!(by_customer.map(|u| u.id), Some(user.id));

    let missing = repo.update(uuid::Uuid::new_v4(), UpdateUserRequest::default()).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_trainer_profile_round_trip() -> anyhow::Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let repo = SqliteUserRepository::new(pool);
    let profile = TrainerProfile {
        specialization: Some("Olympic lifting".to_string()),
        experience_years: Some(7),
    };
    let trainer = repo
        .create(CreateUserRequest {
            email: "coach@example.com".to_string(),
            full_name: "Coach".to_string(),
            password: "secure_password123".to_string(),
            phone: Some("555-0100".to_string()),
            role: Role::Trainer(profile.clone()),
        })
        .await?;

    assert_eq!(trainer.role, Role::Trainer(profile));
    assert!(trainer.bypasses_subscription_gate());
    Ok(())
}

#[tokio::test]
async fn test_password_hashing() -> anyhow::Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let repo = SqliteUserRepository::new(pool);
    repo.create(CreateUserRequest {
        email: "hash@example.com".to_string(),
        full_name: "Hash Check".to_string(),
        password: "my_secure_password".to_string(),
        phone: None,
        role: Role::Admin,
    })
    .await?;

    let hash = repo.password_hash("hash@example.com").await?.unwrap();
    assert_ne!(hash, "my_secure_password");
    assert!(gymdesk::auth::verify_password("my_secure_password", &hash)?);
    assert!(!gymdesk::auth::verify_password("wrong_password", &hash)?);

    Ok(())
}
