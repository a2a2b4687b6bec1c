use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{BillingInterval, CreatePlanRequest, Plan, UpdatePlanRequest},
    error::{is_unique_violation, AppError, Result},
    repository::{parse_enum, parse_uuid, to_utc, PlanRepository},
};

#[derive(FromRow)]
struct PlanRow {
    id: String,
    name: String,
    description: String,
    price_cents: i64,
    currency: String,
    billing_interval: String,
    stripe_price_id: String,
    stripe_product_id: Option<String>,
    features: String,
    classes_per_month: i64,
    is_active: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const PLAN_COLUMNS: &str = r#"
    id, name, description, price_cents, currency, billing_interval,
    stripe_price_id, stripe_product_id, features, classes_per_month,
    is_active, created_at, updated_at
"#;

pub struct SqlitePlanRepository {
    pool: SqlitePool,
}

impl SqlitePlanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_plan(row: PlanRow) -> Result<Plan> {
        let features: Vec<String> = serde_json::from_str(&row.features)
            .map_err(|e| AppError::Database(format!("Invalid plan features: {}", e)))?;

        Ok(Plan {
            id: parse_uuid(&row.id)?,
            name: row.name,
            description: row.description,
            price_cents: row.price_cents,
            currency: row.currency,
            interval: parse_enum::<BillingInterval>(&row.billing_interval)?,
            stripe_price_id: row.stripe_price_id,
            stripe_product_id: row.stripe_product_id,
            features,
            classes_per_month: row.classes_per_month,
            is_active: row.is_active != 0,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

fn encode_features(features: &[String]) -> Result<String> {
    serde_json::to_string(features).map_err(|e| AppError::Internal(e.to_string()))
}

#[async_trait]
impl PlanRepository for SqlitePlanRepository {
    async fn create(&self, request: CreatePlanRequest) -> Result<Plan> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO plans (
                id, name, description, price_cents, currency, billing_interval,
                stripe_price_id, stripe_product_id, features, classes_per_month,
                is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.price_cents)
        .bind(request.currency.to_lowercase())
        .bind(request.interval.as_str())
        .bind(&request.stripe_price_id)
        .bind(&request.stripe_product_id)
        .bind(encode_features(&request.features)?)
        .bind(request.classes_per_month)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("A plan already uses this price".to_string())
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created plan".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Plan>> {
        let query = format!("SELECT {} FROM plans WHERE id = ?", PLAN_COLUMNS);
        let row = sqlx::query_as::<_, PlanRow>(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_plan).transpose()
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Plan>> {
        let query = if include_inactive {
            format!("SELECT {} FROM plans ORDER BY price_cents ASC", PLAN_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM plans WHERE is_active = 1 ORDER BY price_cents ASC",
                PLAN_COLUMNS
            )
        };

        let rows = sqlx::query_as::<_, PlanRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_plan).collect()
    }

    async fn update(&self, id: Uuid, update: UpdatePlanRequest) -> Result<Plan> {
        let existing = self.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        let name = update.name.unwrap_or(existing.name);
        let description = update.description.unwrap_or(existing.description);
        let features = update.features.unwrap_or(existing.features);
        let classes_per_month = update.classes_per_month.unwrap_or(existing.classes_per_month);
        let is_active = update.is_active.unwrap_or(existing.is_active);

        sqlx::query(
            r#"
            UPDATE plans
            SET name = ?, description = ?, features = ?, classes_per_month = ?,
                is_active = ?, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(&name)
        .bind(&description)
        .bind(encode_features(&features)?)
        .bind(classes_per_month)
        .bind(if is_active { 1i32 } else { 0i32 })
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated plan".to_string())
        })
    }
}
