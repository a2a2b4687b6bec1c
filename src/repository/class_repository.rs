use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{ClassRoster, ClassSession, ClassStatus},
    error::{AppError, Result},
    repository::{parse_enum, parse_uuid, to_utc, ClassRepository},
};

#[derive(FromRow)]
struct ClassRow {
    id: String,
    trainer_id: String,
    name: String,
    description: Option<String>,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    capacity: i64,
    location: Option<String>,
    status: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const CLASS_COLUMNS: &str = r#"
    id, trainer_id, name, description, start_time, end_time,
    capacity, location, status, created_at, updated_at
"#;

pub struct SqliteClassRepository {
    pool: SqlitePool,
}

impl SqliteClassRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_class(row: ClassRow) -> Result<ClassSession> {
        Ok(ClassSession {
            id: parse_uuid(&row.id)?,
            trainer_id: parse_uuid(&row.trainer_id)?,
            name: row.name,
            description: row.description,
            start_time: to_utc(row.start_time),
            end_time: to_utc(row.end_time),
            capacity: row.capacity,
            location: row.location,
            status: parse_enum::<ClassStatus>(&row.status)?,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    async fn member_ids(&self, table: &str, class_id: Uuid) -> Result<Vec<Uuid>> {
        let query = format!(
            "SELECT member_id FROM {} WHERE class_id = ? ORDER BY seq ASC",
            table
        );
        let rows: Vec<(String,)> = sqlx::query_as(&query)
            .bind(class_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|(id,)| parse_uuid(id)).collect()
    }
}

#[async_trait]
impl ClassRepository for SqliteClassRepository {
    async fn create(&self, session: ClassSession) -> Result<ClassSession> {
        sqlx::query(
            r#"
            INSERT INTO class_sessions (
                id, trainer_id, name, description, start_time, end_time,
                capacity, location, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(session.id.to_string())
        .bind(session.trainer_id.to_string())
        .bind(&session.name)
        .bind(&session.description)
        .bind(session.start_time.naive_utc())
        .bind(session.end_time.naive_utc())
        .bind(session.capacity)
        .bind(&session.location)
        .bind(session.status.as_str())
        .bind(session.created_at.naive_utc())
        .bind(session.updated_at.naive_utc())
        .execute(&self.pool)
        .await?;

        self.find_by_id(session.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created class".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ClassSession>> {
        let query = format!("SELECT {} FROM class_sessions WHERE id = ?", CLASS_COLUMNS);
        let row = sqlx::query_as::<_, ClassRow>(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_class).transpose()
    }

    async fn list_upcoming(&self, from: DateTime<Utc>, limit: i64) -> Result<Vec<ClassSession>> {
        let query = format!(
            r#"
            SELECT {} FROM class_sessions
            WHERE status = 'Scheduled' AND start_time > ?
            ORDER BY start_time ASC
            LIMIT ?
            "#,
            CLASS_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClassRow>(&query)
            .bind(from.naive_utc())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_class).collect()
    }

    async fn list_by_trainer(&self, trainer_id: Uuid) -> Result<Vec<ClassSession>> {
        let query = format!(
            "SELECT {} FROM class_sessions WHERE trainer_id = ? ORDER BY start_time DESC",
            CLASS_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClassRow>(&query)
            .bind(trainer_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_class).collect()
    }

    async fn list_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClassSession>> {
        let query = format!(
            r#"
            SELECT {} FROM class_sessions
            WHERE status = 'Scheduled' AND start_time >= ? AND start_time <= ?
            ORDER BY start_time ASC
            "#,
            CLASS_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClassRow>(&query)
            .bind(start.naive_utc())
            .bind(end.naive_utc())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_class).collect()
    }

    async fn update(&self, session: ClassSession) -> Result<ClassSession> {
        // Capacity may never drop below the current attendee count
        let result = sqlx::query(
            r#"
            UPDATE class_sessions
            SET name = ?, description = ?, start_time = ?, end_time = ?,
                capacity = ?, location = ?, updated_at = ?
            WHERE id = ?
              AND status = 'Scheduled'
              AND ? >= (SELECT COUNT(*) FROM class_attendees a WHERE a.class_id = class_sessions.id)
            "#
        )
        .bind(&session.name)
        .bind(&session.description)
        .bind(session.start_time.naive_utc())
        .bind(session.end_time.naive_utc())
        .bind(session.capacity)
        .bind(&session.location)
        .bind(session.updated_at.naive_utc())
        .bind(session.id.to_string())
        .bind(session.capacity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "Class is not scheduled or capacity is below current attendance".to_string(),
            ));
        }

        self.find_by_id(session.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated class".to_string())
        })
    }

    async fn transition_from_scheduled(&self, id: Uuid, status: ClassStatus, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE class_sessions SET status = ?, updated_at = ? WHERE id = ? AND status = 'Scheduled'"
        )
        .bind(status.as_str())
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn try_admit(&self, class_id: Uuid, member_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let member = member_id.to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO class_attendees (class_id, member_id, added_at)
            SELECT c.id, ?, ?
            FROM class_sessions c
            WHERE c.id = ?
              AND c.status = 'Scheduled'
              AND (SELECT COUNT(*) FROM class_attendees a WHERE a.class_id = c.id) < c.capacity
              AND NOT EXISTS (SELECT 1 FROM class_attendees a WHERE a.class_id = c.id AND a.member_id = ?)
              AND NOT EXISTS (SELECT 1 FROM class_waitlist w WHERE w.class_id = c.id)
            "#
        )
        .bind(&member)
        .bind(at.naive_utc())
        .bind(class_id.to_string())
        .bind(&member)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn try_waitlist(&self, class_id: Uuid, member_id: Uuid, at: DateTime<Utc>) -> Result<Option<i64>> {
        let member = member_id.to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO class_waitlist (class_id, member_id, added_at)
            SELECT c.id, ?, ?
            FROM class_sessions c
            WHERE c.id = ?
              AND c.status = 'Scheduled'
              AND NOT EXISTS (SELECT 1 FROM class_attendees a WHERE a.class_id = c.id AND a.member_id = ?)
              AND NOT EXISTS (SELECT 1 FROM class_waitlist w WHERE w.class_id = c.id AND w.member_id = ?)
            "#
        )
        .bind(&member)
        .bind(at.naive_utc())
        .bind(class_id.to_string())
        .bind(&member)
        .bind(&member)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.waitlist_position(class_id, member_id).await
    }

    async fn release_and_promote(&self, class_id: Uuid, member_id: Uuid, at: DateTime<Utc>) -> Result<Option<Uuid>> {
        let class = class_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM class_attendees WHERE class_id = ? AND member_id = ?")
            .bind(&class)
            .bind(member_id.to_string())
            .execute(&mut *tx)
            .await?;

        // Head of the waitlist, only if the session can take one more
        let head: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT w.seq, w.member_id
            FROM class_waitlist w
            JOIN class_sessions c ON c.id = w.class_id
            WHERE w.class_id = ?
              AND c.status = 'Scheduled'
              AND (SELECT COUNT(*) FROM class_attendees a WHERE a.class_id = c.id) < c.capacity
            ORDER BY w.seq ASC
            LIMIT 1
            "#
        )
        .bind(&class)
        .fetch_optional(&mut *tx)
        .await?;

        let mut promoted = None;
        if let Some((seq, promoted_member)) = head {
            let popped = sqlx::query("DELETE FROM class_waitlist WHERE seq = ?")
                .bind(seq)
                .execute(&mut *tx)
                .await?;

            if popped.rows_affected() == 1 {
                sqlx::query(
                    "INSERT INTO class_attendees (class_id, member_id, added_at) VALUES (?, ?, ?)"
                )
                .bind(&class)
                .bind(&promoted_member)
                .bind(at.naive_utc())
                .execute(&mut *tx)
                .await?;

                promoted = Some(parse_uuid(&promoted_member)?);
            }
        }

        tx.commit().await?;
        Ok(promoted)
    }

    async fn promote_waiting(&self, class_id: Uuid, at: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let class = class_id.to_string();
        let mut tx = self.pool.begin().await?;
        let mut promoted = Vec::new();

        loop {
            let head: Option<(i64, String)> = sqlx::query_as(
                r#"
                SELECT w.seq, w.member_id
                FROM class_waitlist w
                JOIN class_sessions c ON c.id = w.class_id
                WHERE w.class_id = ?
                  AND c.status = 'Scheduled'
                  AND (SELECT COUNT(*) FROM class_attendees a WHERE a.class_id = c.id) < c.capacity
                ORDER BY w.seq ASC
                LIMIT 1
                "#
            )
            .bind(&class)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((seq, member)) = head else {
                break;
            };

            sqlx::query("DELETE FROM class_waitlist WHERE seq = ?")
                .bind(seq)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO class_attendees (class_id, member_id, added_at) VALUES (?, ?, ?)"
            )
            .bind(&class)
            .bind(&member)
            .bind(at.naive_utc())
            .execute(&mut *tx)
            .await?;

            promoted.push(parse_uuid(&member)?);
        }

        tx.commit().await?;
        Ok(promoted)
    }

    async fn remove_from_waitlist(&self, class_id: Uuid, member_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM class_waitlist WHERE class_id = ? AND member_id = ?")
            .bind(class_id.to_string())
            .bind(member_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn waitlist_position(&self, class_id: Uuid, member_id: Uuid) -> Result<Option<i64>> {
        let class = class_id.to_string();

        let seq: Option<i64> = sqlx::query_scalar(
            "SELECT seq FROM class_waitlist WHERE class_id = ? AND member_id = ?"
        )
        .bind(&class)
        .bind(member_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(seq) = seq else {
            return Ok(None);
        };

        let position: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM class_waitlist WHERE class_id = ? AND seq <= ?"
        )
        .bind(&class)
        .bind(seq)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(position))
    }

    async fn roster(&self, class_id: Uuid) -> Result<ClassRoster> {
        Ok(ClassRoster {
            attendees: self.member_ids("class_attendees", class_id).await?,
            waitlist: self.member_ids("class_waitlist", class_id).await?,
        })
    }

    async fn attendee_count(&self, class_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM class_attendees WHERE class_id = ?"
        )
        .bind(class_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
