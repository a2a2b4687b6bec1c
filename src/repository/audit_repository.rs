use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{SqlitePool, FromRow};

use crate::{
    domain::AuditEntry,
    error::{AppError, Result},
    repository::{parse_optional_uuid, parse_uuid, to_utc, AuditRepository},
};

#[derive(FromRow)]
struct AuditRow {
    id: String,
    user_id: Option<String>,
    action: String,
    resource: String,
    resource_id: Option<String>,
    details: String,
    created_at: NaiveDateTime,
}

pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: AuditRow) -> Result<AuditEntry> {
        Ok(AuditEntry {
            id: parse_uuid(&row.id)?,
            user_id: parse_optional_uuid(row.user_id)?,
            action: row.action,
            resource: row.resource,
            resource_id: row.resource_id,
            details: serde_json::from_str(&row.details)
                .map_err(|e| AppError::Database(format!("Invalid audit details: {}", e)))?,
            created_at: to_utc(row.created_at),
        })
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, user_id, action, resource, resource_id, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(entry.id.to_string())
        .bind(entry.user_id.map(|id| id.to_string()))
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(&entry.resource_id)
        .bind(entry.details.to_string())
        .bind(entry.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, user_id, action, resource, resource_id, details, created_at
            FROM audit_log
            ORDER BY created_at DESC
            LIMIT ?
            "#
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn list_by_action(&self, action: &str) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, user_id, action, resource, resource_id, details, created_at
            FROM audit_log
            WHERE action = ?
            ORDER BY created_at DESC
            "#
        )
        .bind(action)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn exists(&self, action: &str, resource_id: &str) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM audit_log WHERE action = ? AND resource_id = ? LIMIT 1"
        )
        .bind(action)
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }
}
