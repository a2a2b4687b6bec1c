use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{Attendance, CheckInMethod},
    error::{is_unique_violation, AppError, Result},
    repository::{parse_enum, parse_optional_uuid, parse_uuid, to_utc, AttendanceRepository},
};

#[derive(FromRow)]
struct AttendanceRow {
    id: String,
    booking_id: String,
    member_id: String,
    class_id: String,
    method: String,
    checked_in_at: NaiveDateTime,
    checked_in_by: Option<String>,
}

const ATTENDANCE_COLUMNS: &str =
    "id, booking_id, member_id, class_id, method, checked_in_at, checked_in_by";

pub struct SqliteAttendanceRepository {
    pool: SqlitePool,
}

impl SqliteAttendanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_attendance(row: AttendanceRow) -> Result<Attendance> {
        Ok(Attendance {
            id: parse_uuid(&row.id)?,
            booking_id: parse_uuid(&row.booking_id)?,
            member_id: parse_uuid(&row.member_id)?,
            class_id: parse_uuid(&row.class_id)?,
            method: parse_enum::<CheckInMethod>(&row.method)?,
            checked_in_at: to_utc(row.checked_in_at),
            checked_in_by: parse_optional_uuid(row.checked_in_by)?,
        })
    }

    async fn list_where(&self, column: &str, value: Uuid) -> Result<Vec<Attendance>> {
        let query = format!(
            "SELECT {} FROM attendance WHERE {} = ? ORDER BY checked_in_at DESC",
            ATTENDANCE_COLUMNS, column
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(value.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_attendance).collect()
    }
}

#[async_trait]
impl AttendanceRepository for SqliteAttendanceRepository {
    async fn check_in(&self, attendance: Attendance) -> Result<Attendance> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            "UPDATE bookings SET status = 'CheckedIn', updated_at = ? WHERE id = ? AND status = 'Booked'"
        )
        .bind(attendance.checked_in_at.naive_utc())
        .bind(attendance.booking_id.to_string())
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            let existing: Option<i64> = sqlx::query_scalar("SELECT 1 FROM attendance WHERE booking_id = ?")
                .bind(attendance.booking_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match existing {
                Some(_) => AppError::AlreadyCheckedIn,
                None => AppError::InvalidState("Booking is no longer booked".to_string()),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO attendance (
                id, booking_id, member_id, class_id, method, checked_in_at, checked_in_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(attendance.id.to_string())
        .bind(attendance.booking_id.to_string())
        .bind(attendance.member_id.to_string())
        .bind(attendance.class_id.to_string())
        .bind(attendance.method.as_str())
        .bind(attendance.checked_in_at.naive_utc())
        .bind(attendance.checked_in_by.map(|id| id.to_string()))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyCheckedIn
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        tx.commit().await?;
        Ok(attendance)
    }

    async fn find_by_booking(&self, booking_id: Uuid) -> Result<Option<Attendance>> {
        let query = format!("SELECT {} FROM attendance WHERE booking_id = ?", ATTENDANCE_COLUMNS);
        let row = sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(booking_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_attendance).transpose()
    }

    async fn list_by_class(&self, class_id: Uuid) -> Result<Vec<Attendance>> {
        self.list_where("class_id", class_id).await
    }

    async fn list_by_member(&self, member_id: Uuid) -> Result<Vec<Attendance>> {
        self.list_where("member_id", member_id).await
    }
}
