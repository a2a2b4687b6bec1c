use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{error::Result, repository::WebhookEventRepository};

/// Durable record of provider event ids that have been handled, so
/// redelivery after a restart is still skipped.
pub struct SqliteWebhookEventRepository {
    pool: SqlitePool,
}

impl SqliteWebhookEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventRepository for SqliteWebhookEventRepository {
    async fn claim(&self, event_id: &str, event_type: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type, processed_at)
            VALUES (?, ?, ?)
            ON CONFLICT (event_id) DO NOTHING
            "#
        )
        .bind(event_id)
        .bind(event_type)
        .bind(at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, event_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = ?")
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
