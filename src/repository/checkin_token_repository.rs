use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::CheckInToken,
    error::Result,
    repository::{parse_uuid, to_utc, CheckInTokenRepository},
};

#[derive(FromRow)]
struct TokenRow {
    id: String,
    token_hash: String,
    booking_id: String,
    class_id: String,
    member_id: String,
    expires_at: NaiveDateTime,
    used: i32,
    used_at: Option<NaiveDateTime>,
    revoked_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
}

pub struct SqliteCheckInTokenRepository {
    pool: SqlitePool,
}

impl SqliteCheckInTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_token(row: TokenRow) -> Result<CheckInToken> {
        Ok(CheckInToken {
            id: parse_uuid(&row.id)?,
            token_hash: row.token_hash,
            booking_id: parse_uuid(&row.booking_id)?,
            class_id: parse_uuid(&row.class_id)?,
            member_id: parse_uuid(&row.member_id)?,
            expires_at: to_utc(row.expires_at),
            used: row.used != 0,
            used_at: row.used_at.map(to_utc),
            revoked_at: row.revoked_at.map(to_utc),
            created_at: to_utc(row.created_at),
        })
    }
}

#[async_trait]
impl CheckInTokenRepository for SqliteCheckInTokenRepository {
    async fn create(&self, token: CheckInToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checkin_tokens (
                id, token_hash, booking_id, class_id, member_id,
                expires_at, used, used_at, revoked_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(token.id.to_string())
        .bind(&token.token_hash)
        .bind(token.booking_id.to_string())
        .bind(token.class_id.to_string())
        .bind(token.member_id.to_string())
        .bind(token.expires_at.naive_utc())
        .bind(if token.used { 1i32 } else { 0i32 })
        .bind(token.used_at.map(|t| t.naive_utc()))
        .bind(token.revoked_at.map(|t| t.naive_utc()))
        .bind(token.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str, booking_id: Uuid) -> Result<Option<CheckInToken>> {
        // Revoked tokens behave as if they never existed
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT id, token_hash, booking_id, class_id, member_id,
                   expires_at, used, used_at, revoked_at, created_at
            FROM checkin_tokens
            WHERE token_hash = ? AND booking_id = ? AND revoked_at IS NULL
            "#
        )
        .bind(token_hash)
        .bind(booking_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_token).transpose()
    }

    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE checkin_tokens SET used = 1, used_at = ? WHERE id = ? AND used = 0 AND revoked_at IS NULL"
        )
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_unused_for_booking(&self, booking_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE checkin_tokens SET revoked_at = ? WHERE booking_id = ? AND used = 0 AND revoked_at IS NULL"
        )
        .bind(at.naive_utc())
        .bind(booking_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
