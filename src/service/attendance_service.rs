use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::{
    clock::Clock,
    domain::*,
    error::{AppError, Result},
    notifications::{kinds, NotificationCenter},
    repository::{AttendanceRepository, AuditRepository, BookingRepository, ClassRepository},
    service::token_issuer::TokenIssuer,
};

pub struct AttendanceService {
    attendance_repo: Arc<dyn AttendanceRepository>,
    booking_repo: Arc<dyn BookingRepository>,
    class_repo: Arc<dyn ClassRepository>,
    audit_repo: Arc<dyn AuditRepository>,
    tokens: Arc<TokenIssuer>,
    notifications: Arc<NotificationCenter>,
    clock: Arc<dyn Clock>,
}

impl AttendanceService {
    pub fn new(
        attendance_repo: Arc<dyn AttendanceRepository>,
        booking_repo: Arc<dyn BookingRepository>,
        class_repo: Arc<dyn ClassRepository>,
        audit_repo: Arc<dyn AuditRepository>,
        tokens: Arc<TokenIssuer>,
        notifications: Arc<NotificationCenter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attendance_repo,
            booking_repo,
            class_repo,
            audit_repo,
            tokens,
            notifications,
            clock,
        }
    }

    /// Member-driven check-in with a previously issued token.
    pub async fn check_in_with_token(
        &self,
        member_id: Uuid,
        booking_id: Uuid,
        raw_token: &str,
    ) -> Result<Attendance> {
        let booking = self.booking_repo.find_by_id(booking_id).await?
            .ok_or(AppError::TokenNotFound)?;

        if booking.member_id != member_id {
            return Err(AppError::NotOwner);
        }
        if self.attendance_repo.find_by_booking(booking.id).await?.is_some() {
            return Err(AppError::AlreadyCheckedIn);
        }
        if booking.status != BookingStatus::Booked {
            return Err(AppError::InvalidState(format!(
                "Cannot check in a booking that is {}",
                booking.status.as_str()
            )));
        }

        self.tokens.redeem(raw_token, booking.id).await?;
        self.record(&booking, CheckInMethod::Qr, None).await
    }

    /// Trainer-driven check-in. Only the trainer who owns the session may
    /// mark a member present by hand.
    pub async fn manual_check_in(&self, trainer: &User, class_id: Uuid, member_id: Uuid) -> Result<Attendance> {
        let session = self.class_repo.find_by_id(class_id).await?
            .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;

        if !session.is_owned_by(trainer.id) {
            return Err(AppError::NotOwner);
        }

        let booking = self.booking_repo.find_active(member_id, class_id).await?
            .ok_or_else(|| AppError::NotFound("No booking found for this member".to_string()))?;

        if self.attendance_repo.find_by_booking(booking.id).await?.is_some() {
            return Err(AppError::AlreadyCheckedIn);
        }
        if booking.status != BookingStatus::Booked {
            return Err(AppError::InvalidState(format!(
                "Cannot check in a booking that is {}",
                booking.status.as_str()
            )));
        }

        let attendance = self.record(&booking, CheckInMethod::Manual, Some(trainer.id)).await?;

        if let Err(e) = self.audit_repo
            .record(AuditEntry::new(
                Some(trainer.id),
                "manual_checkin",
                "attendance",
                Some(attendance.id.to_string()),
                json!({
                    "booking_id": booking.id,
                    "class_id": class_id,
                    "member_id": member_id,
                }),
                self.clock.now(),
            ))
            .await
        {
            tracing::error!(attendance_id = %attendance.id, "Failed to write audit entry: {}", e);
        }

        Ok(attendance)
    }

    pub async fn class_report(&self, requester: &User, class_id: Uuid) -> Result<ClassAttendanceReport> {
        let session = self.class_repo.find_by_id(class_id).await?
            .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;

        if !requester.is_admin() && !session.is_owned_by(requester.id) {
            return Err(AppError::NotOwner);
        }

        let bookings = self.booking_repo.list_by_class(class_id).await?;
        let attendance = self.attendance_repo.list_by_class(class_id).await?;
        let stats = class_stats(&bookings, &attendance);

        Ok(ClassAttendanceReport {
            class_id,
            attendance,
            stats,
        })
    }

    pub async fn member_report(&self, requester: &User, member_id: Uuid) -> Result<MemberAttendanceReport> {
        if !requester.is_admin() && requester.id != member_id {
            return Err(AppError::Forbidden);
        }

        let attendance = self.attendance_repo.list_by_member(member_id).await?;
        let stats = MemberAttendanceStats {
            total_classes: attendance.len(),
            qr_check_ins: count_method(&attendance, CheckInMethod::Qr),
            manual_check_ins: count_method(&attendance, CheckInMethod::Manual),
        };

        Ok(MemberAttendanceReport {
            member_id,
            attendance,
            stats,
        })
    }

    async fn record(&self, booking: &Booking, method: CheckInMethod, checked_in_by: Option<Uuid>) -> Result<Attendance> {
        let now = self.clock.now();
        let attendance = self.attendance_repo
            .check_in(Attendance {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                member_id: booking.member_id,
                class_id: booking.class_id,
                method,
                checked_in_at: now,
                checked_in_by,
            })
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            member_id = %booking.member_id,
            method = method.as_str(),
            "Member checked in"
        );
        self.notifications
            .notify(
                booking.member_id,
                kinds::CHECKED_IN,
                "Checked In",
                "You're checked in. Enjoy your class!".to_string(),
            )
            .await;

        Ok(attendance)
    }
}

fn count_method(attendance: &[Attendance], method: CheckInMethod) -> usize {
    attendance.iter().filter(|a| a.method == method).count()
}

fn class_stats(bookings: &[Booking], attendance: &[Attendance]) -> ClassAttendanceStats {
    let with_status = |status: BookingStatus| bookings.iter().filter(|b| b.status == status).count();

    ClassAttendanceStats {
        total_bookings: bookings.len(),
        checked_in: attendance.len(),
        no_shows: with_status(BookingStatus::NoShow),
        cancelled: with_status(BookingStatus::Cancelled),
        qr_check_ins: count_method(attendance, CheckInMethod::Qr),
        manual_check_ins: count_method(attendance, CheckInMethod::Manual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn attendance(booking: &Booking, method: CheckInMethod) -> Attendance {
        Attendance {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            member_id: booking.member_id,
            class_id: booking.class_id,
            method,
            checked_in_at: Utc::now(),
            checked_in_by: None,
        }
    }

    #[test]
    fn stats_count_each_outcome() {
        let class_id = Uuid::new_v4();
        let now = Utc::now();
        let mut bookings: Vec<Booking> = (0..5).map(|_| Booking::new(Uuid::new_v4(), class_id, now)).collect();
        bookings[0].status = BookingStatus::Completed;
        bookings[1].status = BookingStatus::Completed;
        bookings[2].status = BookingStatus::NoShow;
        bookings[3].status = BookingStatus::Cancelled;

        let records = vec![
            attendance(&bookings[0], CheckInMethod::Qr),
            attendance(&bookings[1], CheckInMethod::Manual),
        ];

        let stats = class_stats(&bookings, &records);
        assert_eq!(
            stats,
            ClassAttendanceStats {
                total_bookings: 5,
                checked_in: 2,
                no_shows: 1,
                cancelled: 1,
                qr_check_ins: 1,
                manual_check_ins: 1,
            }
        );
    }
}
