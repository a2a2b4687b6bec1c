use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{Payment, PaymentMethod, PaymentStatus},
    error::{is_unique_violation, AppError, Result},
    repository::{parse_enum, parse_optional_uuid, parse_uuid, to_utc, PaymentRepository},
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    user_id: String,
    amount_cents: i64,
    currency: String,
    status: String,
    payment_method: String,
    stripe_payment_intent_id: Option<String>,
    stripe_invoice_id: Option<String>,
    subscription_id: Option<String>,
    description: String,
    refunded_at: Option<NaiveDateTime>,
    refund_reason: Option<String>,
    reconciled: i32,
    reconciled_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const PAYMENT_COLUMNS: &str = r#"
    id, user_id, amount_cents, currency, status, payment_method,
    stripe_payment_intent_id, stripe_invoice_id, subscription_id, description,
    refunded_at, refund_reason, reconciled, reconciled_at, created_at, updated_at
"#;

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: parse_enum::<PaymentStatus>(&row.status)?,
            payment_method: parse_enum::<PaymentMethod>(&row.payment_method)?,
            stripe_payment_intent_id: row.stripe_payment_intent_id,
            stripe_invoice_id: row.stripe_invoice_id,
            subscription_id: parse_optional_uuid(row.subscription_id)?,
            description: row.description,
            refunded_at: row.refunded_at.map(to_utc),
            refund_reason: row.refund_reason,
            reconciled: row.reconciled != 0,
            reconciled_at: row.reconciled_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    async fn fetch_optional_where(&self, column: &str, value: &str) -> Result<Option<Payment>> {
        let query = format!("SELECT {} FROM payments WHERE {} = ?", PAYMENT_COLUMNS, column);
        let row = sqlx::query_as::<_, PaymentRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: Payment) -> Result<Payment> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, amount_cents, currency, status, payment_method,
                stripe_payment_intent_id, stripe_invoice_id, subscription_id, description,
                refunded_at, refund_reason, reconciled, reconciled_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(payment.id.to_string())
        .bind(payment.user_id.to_string())
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.payment_method.as_str())
        .bind(&payment.stripe_payment_intent_id)
        .bind(&payment.stripe_invoice_id)
        .bind(payment.subscription_id.map(|id| id.to_string()))
        .bind(&payment.description)
        .bind(payment.refunded_at.map(|t| t.naive_utc()))
        .bind(&payment.refund_reason)
        .bind(if payment.reconciled { 1i32 } else { 0i32 })
        .bind(payment.reconciled_at.map(|t| t.naive_utc()))
        .bind(payment.created_at.naive_utc())
        .bind(payment.updated_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Payment already recorded".to_string())
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        Ok(payment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        self.fetch_optional_where("id", &id.to_string()).await
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>> {
        let query = format!(
            "SELECT {} FROM payments WHERE user_id = ? ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&query)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn find_by_invoice_id(&self, invoice_id: &str) -> Result<Option<Payment>> {
        self.fetch_optional_where("stripe_invoice_id", invoice_id).await
    }

    async fn find_by_payment_intent_id(&self, payment_intent_id: &str) -> Result<Option<Payment>> {
        self.fetch_optional_where("stripe_payment_intent_id", payment_intent_id).await
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Payment>> {
        let query = format!(
            "SELECT {} FROM payments ORDER BY created_at DESC LIMIT ? OFFSET ?",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn link_invoice(&self, id: Uuid, invoice_id: &str, subscription_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payments
            SET stripe_invoice_id = ?, subscription_id = ?, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(invoice_id)
        .bind(subscription_id.to_string())
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn settle(
        &self,
        id: Uuid,
        method: PaymentMethod,
        description: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'Paid', payment_method = ?,
                description = COALESCE(?, description), updated_at = ?
            WHERE id = ? AND status IN ('Pending', 'Failed')
            "#
        )
        .bind(method.as_str())
        .bind(&description)
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'Failed', updated_at = ? WHERE id = ? AND status = 'Pending'"
        )
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_refunded(&self, id: Uuid, reason: Option<String>, at: DateTime<Utc>) -> Result<Payment> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'Refunded', refunded_at = ?, refund_reason = ?, updated_at = ?
            WHERE id = ? AND status = 'Paid'
            "#
        )
        .bind(at.naive_utc())
        .bind(&reason)
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState(
                "Only paid payments can be refunded".to_string(),
            ));
        }

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve refunded payment".to_string())
        })
    }

    async fn list_unreconciled_since(&self, since: DateTime<Utc>) -> Result<Vec<Payment>> {
        let query = format!(
            r#"
            SELECT {} FROM payments
            WHERE reconciled = 0
              AND status = 'Paid'
              AND payment_method = 'Stripe'
              AND stripe_payment_intent_id IS NOT NULL
              AND created_at >= ?
            ORDER BY created_at ASC
            "#,
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&query)
            .bind(since.naive_utc())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn mark_reconciled(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payments SET reconciled = 1, reconciled_at = ? WHERE id = ? AND reconciled = 0"
        )
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
