use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{DeliveryStatus, NewNotification, Notification},
    error::Result,
    repository::{parse_enum, parse_uuid, to_utc, NotificationRepository},
};

#[derive(FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    kind: String,
    title: String,
    message: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    read_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    delivered_at: Option<NaiveDateTime>,
}

const NOTIFICATION_COLUMNS: &str = r#"
    id, user_id, kind, title, message, status, attempts, last_error,
    read_at, created_at, delivered_at
"#;

pub struct SqliteNotificationRepository {
    pool: SqlitePool,
}

impl SqliteNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_notification(row: NotificationRow) -> Result<Notification> {
        Ok(Notification {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            kind: row.kind,
            title: row.title,
            message: row.message,
            status: parse_enum::<DeliveryStatus>(&row.status)?,
            attempts: row.attempts,
            last_error: row.last_error,
            read_at: row.read_at.map(to_utc),
            created_at: to_utc(row.created_at),
            delivered_at: row.delivered_at.map(to_utc),
        })
    }
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn enqueue(&self, notification: NewNotification, at: DateTime<Utc>) -> Result<Notification> {
        let stored = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            kind: notification.kind.to_string(),
            title: notification.title,
            message: notification.message,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            read_at: None,
            created_at: at,
            delivered_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, message, status, attempts, created_at)
            VALUES (?, ?, ?, ?, ?, 'Pending', 0, ?)
            "#
        )
        .bind(stored.id.to_string())
        .bind(stored.user_id.to_string())
        .bind(&stored.kind)
        .bind(&stored.title)
        .bind(&stored.message)
        .bind(at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn pending(&self, limit: i64) -> Result<Vec<Notification>> {
        let query = format!(
            "SELECT {} FROM notifications WHERE status = 'Pending' ORDER BY created_at ASC LIMIT ?",
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_notification).collect()
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'Delivered', delivered_at = ?, attempts = attempts + 1, last_error = NULL
            WHERE id = ? AND status = 'Pending'
            "#
        )
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str, max_attempts: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET attempts = attempts + 1,
                last_error = ?,
                status = CASE WHEN attempts + 1 >= ? THEN 'Failed' ELSE 'Pending' END
            WHERE id = ? AND status = 'Pending'
            "#
        )
        .bind(error)
        .bind(max_attempts)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Notification>> {
        let query = format!(
            "SELECT {} FROM notifications WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(user_id.to_string())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_notification).collect()
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = COALESCE(read_at, ?) WHERE id = ? AND user_id = ?"
        )
        .bind(at.naive_utc())
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_reminder(&self, booking_id: Uuid, window: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO class_reminders (booking_id, reminder_window, sent_at)
            VALUES (?, ?, ?)
            ON CONFLICT (booking_id, reminder_window) DO NOTHING
            "#
        )
        .bind(booking_id.to_string())
        .bind(window)
        .bind(at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
