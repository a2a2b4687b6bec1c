use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{ProviderSubscription, Subscription, SubscriptionStatus},
    error::{is_unique_violation, AppError, Result},
    repository::{parse_enum, parse_optional_uuid, parse_uuid, to_utc, SubscriptionRepository},
};

#[derive(FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: String,
    plan_id: Option<String>,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: String,
    status: String,
    current_period_start: NaiveDateTime,
    current_period_end: NaiveDateTime,
    cancel_at_period_end: i32,
    cancelled_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, user_id, plan_id, stripe_customer_id, stripe_subscription_id, status,
    current_period_start, current_period_end, cancel_at_period_end,
    cancelled_at, created_at, updated_at
"#;

pub struct SqliteSubscriptionRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_subscription(row: SubscriptionRow) -> Result<Subscription> {
        Ok(Subscription {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            plan_id: parse_optional_uuid(row.plan_id)?,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            status: parse_enum::<SubscriptionStatus>(&row.status)?,
            current_period_start: to_utc(row.current_period_start),
            current_period_end: to_utc(row.current_period_end),
            cancel_at_period_end: row.cancel_at_period_end != 0,
            cancelled_at: row.cancelled_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    async fn fetch_optional_where(&self, column: &str, value: &str) -> Result<Option<Subscription>> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE {} = ?",
            SUBSCRIPTION_COLUMNS, column
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_subscription).transpose()
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn create(&self, subscription: Subscription) -> Result<Subscription> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_id, stripe_customer_id, stripe_subscription_id, status,
                current_period_start, current_period_end, cancel_at_period_end,
                cancelled_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(subscription.id.to_string())
        .bind(subscription.user_id.to_string())
        .bind(subscription.plan_id.map(|id| id.to_string()))
        .bind(&subscription.stripe_customer_id)
        .bind(&subscription.stripe_subscription_id)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_start.naive_utc())
        .bind(subscription.current_period_end.naive_utc())
        .bind(if subscription.cancel_at_period_end { 1i32 } else { 0i32 })
        .bind(subscription.cancelled_at.map(|t| t.naive_utc()))
        .bind(subscription.created_at.naive_utc())
        .bind(subscription.updated_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Subscription already recorded".to_string())
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        Ok(subscription)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>> {
        self.fetch_optional_where("id", &id.to_string()).await
    }

    async fn find_by_stripe_id(&self, stripe_subscription_id: &str) -> Result<Option<Subscription>> {
        self.fetch_optional_where("stripe_subscription_id", stripe_subscription_id).await
    }

    async fn find_current_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<Subscription>> {
        let query = format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE user_id = ?
              AND status IN ('Active', 'Trialing')
              AND current_period_end >= ?
            ORDER BY current_period_end DESC
            LIMIT 1
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(user_id.to_string())
            .bind(now.naive_utc())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_subscription).transpose()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Subscription>> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE user_id = ? ORDER BY created_at DESC",
            SUBSCRIPTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_subscription).collect()
    }

    async fn set_status(&self, id: Uuid, status: SubscriptionStatus, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(at.naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_cancelled(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'Cancelled', cancelled_at = COALESCE(cancelled_at, ?), updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(at.naive_utc())
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_provider_state(&self, id: Uuid, state: &ProviderSubscription, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = ?, current_period_start = ?, current_period_end = ?,
                cancel_at_period_end = ?, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(state.status.as_str())
        .bind(state.current_period_start.naive_utc())
        .bind(state.current_period_end.naive_utc())
        .bind(if state.cancel_at_period_end { 1i32 } else { 0i32 })
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
