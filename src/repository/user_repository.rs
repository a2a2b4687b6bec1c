use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{CreateUserRequest, MemberProfile, Role, RoleKind, TrainerProfile, UpdateUserRequest, User},
    error::{is_unique_violation, AppError, Result},
    repository::{parse_enum, parse_uuid, to_utc, UserRepository},
};

// Database row struct that matches SQLite schema
#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    full_name: String,
    role: String,
    is_active: i32,
    stripe_customer_id: Option<String>,
    phone: Option<String>,
    specialization: Option<String>,
    experience_years: Option<i32>,
    fitness_goals: Option<String>,
    health_notes: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const USER_COLUMNS: &str = r#"
    id, email, full_name, role, is_active, stripe_customer_id, phone,
    specialization, experience_years, fitness_goals, health_notes,
    created_at, updated_at
"#;

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: UserRow) -> Result<User> {
        let role = match parse_enum::<RoleKind>(&row.role)? {
            RoleKind::Admin => Role::Admin,
            RoleKind::Trainer => Role::Trainer(TrainerProfile {
                specialization: row.specialization,
                experience_years: row.experience_years,
            }),
            RoleKind::Member => Role::Member(MemberProfile {
                fitness_goals: row.fitness_goals,
                health_notes: row.health_notes,
            }),
        };

        Ok(User {
            id: parse_uuid(&row.id)?,
            email: row.email,
            full_name: row.full_name,
            is_active: row.is_active != 0,
            stripe_customer_id: row.stripe_customer_id,
            phone: row.phone,
            role,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, clause);
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_user).transpose()
    }
}

fn hash_password(password: &str) -> Result<String> {
    use argon2::{Argon2, PasswordHasher};
    use argon2::password_hash::{SaltString, rand_core::OsRng};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, request: CreateUserRequest) -> Result<User> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let password_hash = hash_password(&request.password)?;

        let (trainer, member) = match &request.role {
            Role::Admin => (TrainerProfile::default(), MemberProfile::default()),
            Role::Trainer(profile) => (profile.clone(), MemberProfile::default()),
            Role::Member(profile) => (TrainerProfile::default(), profile.clone()),
        };

        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, full_name, password_hash, role, is_active, phone,
                specialization, experience_years, fitness_goals, health_notes,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(request.email.to_lowercase())
        .bind(&request.full_name)
        .bind(&password_hash)
        .bind(request.role.kind().as_str())
        .bind(&request.phone)
        .bind(&trainer.specialization)
        .bind(trainer.experience_years)
        .bind(&member.fitness_goals)
        .bind(&member.health_notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Email already registered".to_string())
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created user".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.fetch_one_where("id", &id.to_string()).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_where("email", &email.to_lowercase()).await
    }

    async fn find_by_stripe_customer_id(&self, customer_id: &str) -> Result<Option<User>> {
        self.fetch_one_where("stripe_customer_id", customer_id).await
    }

    async fn password_hash(&self, email: &str) -> Result<Option<String>> {
        let result = sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM users WHERE email = ?"
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let query = format!(
            "SELECT {} FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(Self::row_to_user)
            .collect()
    }

    async fn update(&self, id: Uuid, update: UpdateUserRequest) -> Result<User> {
        let existing = self.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        // Profile updates only apply to the matching role
        let (trainer, member) = match existing.role {
            Role::Admin => (TrainerProfile::default(), MemberProfile::default()),
            Role::Trainer(profile) => (
                update.trainer_profile.unwrap_or(profile),
                MemberProfile::default(),
            ),
            Role::Member(profile) => (
                TrainerProfile::default(),
                update.member_profile.unwrap_or(profile),
            ),
        };

        let full_name = update.full_name.unwrap_or(existing.full_name);
        let phone = update.phone.or(existing.phone);
        let is_active = update.is_active.unwrap_or(existing.is_active);
        let stripe_customer_id = update.stripe_customer_id.or(existing.stripe_customer_id);
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            UPDATE users
            SET full_name = ?, phone = ?, is_active = ?, stripe_customer_id = ?,
                specialization = ?, experience_years = ?,
                fitness_goals = ?, health_notes = ?, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(&full_name)
        .bind(&phone)
        .bind(if is_active { 1i32 } else { 0i32 })
        .bind(&stripe_customer_id)
        .bind(&trainer.specialization)
        .bind(trainer.experience_years)
        .bind(&member.fitness_goals)
        .bind(&member.health_notes)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated user".to_string())
        })
    }
}
