use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{Booking, BookingStatus},
    error::{is_unique_violation, AppError, Result},
    repository::{parse_enum, parse_uuid, to_utc, BookingRepository},
};

#[derive(FromRow)]
struct BookingRow {
    id: String,
    member_id: String,
    class_id: String,
    status: String,
    booked_at: NaiveDateTime,
    cancelled_at: Option<NaiveDateTime>,
    cancellation_reason: Option<String>,
    qr_expires_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const BOOKING_COLUMNS: &str = r#"
    id, member_id, class_id, status, booked_at, cancelled_at,
    cancellation_reason, qr_expires_at, created_at, updated_at
"#;

pub struct SqliteBookingRepository {
    pool: SqlitePool,
}

impl SqliteBookingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: BookingRow) -> Result<Booking> {
        Ok(Booking {
            id: parse_uuid(&row.id)?,
            member_id: parse_uuid(&row.member_id)?,
            class_id: parse_uuid(&row.class_id)?,
            status: parse_enum::<BookingStatus>(&row.status)?,
            booked_at: to_utc(row.booked_at),
            cancelled_at: row.cancelled_at.map(to_utc),
            cancellation_reason: row.cancellation_reason,
            qr_expires_at: row.qr_expires_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    async fn fetch_all_where(&self, clause: &str, binds: &[String]) -> Result<Vec<Booking>> {
        let query = format!(
            "SELECT {} FROM bookings WHERE {} ORDER BY booked_at ASC",
            BOOKING_COLUMNS, clause
        );
        let mut q = sqlx::query_as::<_, BookingRow>(&query);
        for value in binds {
            q = q.bind(value.as_str());
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.into_iter().map(Self::row_to_booking).collect()
    }
}

#[async_trait]
impl BookingRepository for SqliteBookingRepository {
    async fn create(&self, booking: Booking) -> Result<Booking> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, member_id, class_id, status, booked_at, cancelled_at,
                cancellation_reason, qr_expires_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(booking.id.to_string())
        .bind(booking.member_id.to_string())
        .bind(booking.class_id.to_string())
        .bind(booking.status.as_str())
        .bind(booking.booked_at.naive_utc())
        .bind(booking.cancelled_at.map(|t| t.naive_utc()))
        .bind(&booking.cancellation_reason)
        .bind(booking.qr_expires_at.map(|t| t.naive_utc()))
        .bind(booking.created_at.naive_utc())
        .bind(booking.updated_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateBooking
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        Ok(booking)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>> {
        let query = format!("SELECT {} FROM bookings WHERE id = ?", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_booking).transpose()
    }

    async fn find_active(&self, member_id: Uuid, class_id: Uuid) -> Result<Option<Booking>> {
        let query = format!(
            "SELECT {} FROM bookings WHERE member_id = ? AND class_id = ? AND status != 'Cancelled'",
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(member_id.to_string())
            .bind(class_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_booking).transpose()
    }

    async fn list_by_member(&self, member_id: Uuid) -> Result<Vec<Booking>> {
        self.fetch_all_where("member_id = ?", &[member_id.to_string()]).await
    }

    async fn list_by_class(&self, class_id: Uuid) -> Result<Vec<Booking>> {
        self.fetch_all_where("class_id = ?", &[class_id.to_string()]).await
    }

    async fn list_by_class_and_status(&self, class_id: Uuid, status: BookingStatus) -> Result<Vec<Booking>> {
        self.fetch_all_where(
            "class_id = ? AND status = ?",
            &[class_id.to_string(), status.as_str().to_string()],
        )
        .await
    }

    async fn transition(&self, id: Uuid, from: BookingStatus, to: BookingStatus, at: DateTime<Utc>) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidState(format!(
                "Cannot move booking from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let result = sqlx::query(
            "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
        )
        .bind(to.as_str())
        .bind(at.naive_utc())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel(&self, id: Uuid, reason: Option<String>, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'Cancelled', cancelled_at = ?, cancellation_reason = ?, updated_at = ?
            WHERE id = ? AND status = 'Booked'
            "#
        )
        .bind(at.naive_utc())
        .bind(&reason)
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition_all_in_class(
        &self,
        class_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidState(format!(
                "Cannot move bookings from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let cancelled_at = (to == BookingStatus::Cancelled).then(|| at.naive_utc());

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = ?, updated_at = ?, cancelled_at = COALESCE(?, cancelled_at)
            WHERE class_id = ? AND status = ?
            "#
        )
        .bind(to.as_str())
        .bind(at.naive_utc())
        .bind(cancelled_at)
        .bind(class_id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_qr_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE bookings SET qr_expires_at = ? WHERE id = ?")
            .bind(expires_at.naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
