use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::BookingPolicy,
    domain::*,
    error::{AppError, Result},
    notifications::{kinds, NotificationCenter},
    repository::{BookingRepository, ClassRepository, SubscriptionRepository},
    service::capacity::{CapacityManager, SlotClaim},
};

pub struct BookingService {
    booking_repo: Arc<dyn BookingRepository>,
    class_repo: Arc<dyn ClassRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    capacity: Arc<CapacityManager>,
    notifications: Arc<NotificationCenter>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
}

impl BookingService {
    pub fn new(
        booking_repo: Arc<dyn BookingRepository>,
        class_repo: Arc<dyn ClassRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        capacity: Arc<CapacityManager>,
        notifications: Arc<NotificationCenter>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            booking_repo,
            class_repo,
            subscription_repo,
            capacity,
            notifications,
            clock,
            policy,
        }
    }

    pub async fn book(&self, member: &User, class_id: Uuid) -> Result<BookingOutcome> {
        if self.booking_repo.find_active(member.id, class_id).await?.is_some() {
            return Err(AppError::DuplicateBooking);
        }
        if self.class_repo.waitlist_position(class_id, member.id).await?.is_some() {
            return Err(AppError::DuplicateBooking);
        }

        let session = self.class_repo.find_by_id(class_id).await?
            .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;

        let now = self.clock.now();
        if !session.is_scheduled() || session.start_time <= now {
            return Err(AppError::ClassUnavailable);
        }

        if !member.bypasses_subscription_gate()
            && self.subscription_repo.find_current_for_user(member.id, now).await?.is_none()
        {
            return Err(AppError::SubscriptionRequired);
        }

        match self.capacity.claim_slot(class_id, member.id).await? {
            SlotClaim::Admitted => self.confirm(member, &session, now).await,
            SlotClaim::Waitlisted { position } => {
                // A slot released while we queued is handed out in waitlist order
                let mut admitted = false;
                for promoted in self.capacity.fill_open_slots(class_id).await? {
                    if promoted == member.id {
                        admitted = true;
                    } else {
                        self.book_promoted(&session, Some(promoted)).await;
                    }
                }
                if admitted {
                    return self.confirm(member, &session, now).await;
                }

                tracing::info!(%class_id, member_id = %member.id, position, "Added to waitlist");
                Ok(BookingOutcome::Waitlisted { class_id, position })
            }
        }
    }

    async fn confirm(&self, member: &User, session: &ClassSession, now: DateTime<Utc>) -> Result<BookingOutcome> {
        let class_id = session.id;
        let booking = match self.booking_repo.create(Booking::new(member.id, class_id, now)).await {
            Ok(booking) => booking,
            Err(e) => {
                // Give the slot back so the attendee set matches the bookings
                let promoted = self.capacity.release_slot(class_id, member.id).await?;
                self.book_promoted(session, promoted).await;
                return Err(e);
            }
        };

        tracing::info!(booking_id = %booking.id, %class_id, member_id = %member.id, "Class booked");
        self.notifications
            .notify(
                member.id,
                kinds::BOOKING_CONFIRMED,
                "Booking Confirmed",
                format!(
                    "You're booked for {} on {}.",
                    session.name,
                    session.start_time.format("%a %d %b %H:%M UTC")
                ),
            )
            .await;

        Ok(BookingOutcome::Booked { booking })
    }

    pub async fn cancel(
        &self,
        booking_id: Uuid,
        requester_id: Uuid,
        reason: Option<String>,
    ) -> Result<CancellationOutcome> {
        let booking = self.booking_repo.find_by_id(booking_id).await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        if booking.member_id != requester_id {
            return Err(AppError::NotOwner);
        }
        if booking.status != BookingStatus::Booked {
            return Err(AppError::InvalidState(format!(
                "Cannot cancel a booking that is {}",
                booking.status.as_str()
            )));
        }

        let session = self.class_repo.find_by_id(booking.class_id).await?
            .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;
        if !session.is_scheduled() {
            return Err(AppError::InvalidState("Class is no longer scheduled".to_string()));
        }

        let now = self.clock.now();
        if !cancellation_allowed(session.start_time, now, self.policy.cancellation_window_hours) {
            return Err(AppError::CutoffExceeded {
                hours: self.policy.cancellation_window_hours,
            });
        }

        if !self.booking_repo.cancel(booking.id, reason, now).await? {
            return Err(AppError::InvalidState("Booking is no longer active".to_string()));
        }

        let promoted_member = self.capacity.release_slot(session.id, booking.member_id).await?;
        let promoted = self.book_promoted(&session, promoted_member).await;

        let cancelled = self.booking_repo.find_by_id(booking.id).await?
            .ok_or_else(|| AppError::Database("Failed to retrieve cancelled booking".to_string()))?;

        tracing::info!(booking_id = %cancelled.id, class_id = %session.id, "Booking cancelled");
        self.notifications
            .notify(
                cancelled.member_id,
                kinds::BOOKING_CANCELLED,
                "Booking Cancelled",
                format!("Your booking for {} has been cancelled.", session.name),
            )
            .await;

        Ok(CancellationOutcome {
            booking: cancelled,
            promoted,
        })
    }

    pub async fn complete_session(&self, class_id: Uuid, trainer_id: Uuid) -> Result<CompletionSummary> {
        let session = self.class_repo.find_by_id(class_id).await?
            .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;

        if !session.is_owned_by(trainer_id) {
            return Err(AppError::NotOwner);
        }
        if !session.is_scheduled() {
            return Err(AppError::InvalidState("Class is not scheduled".to_string()));
        }

        let now = self.clock.now();
        if !self.class_repo
            .transition_from_scheduled(class_id, ClassStatus::Completed, now)
            .await?
        {
            return Err(AppError::InvalidState("Class is not scheduled".to_string()));
        }

        let completed = self.booking_repo
            .transition_all_in_class(class_id, BookingStatus::CheckedIn, BookingStatus::Completed, now)
            .await?;
        let no_shows = self.booking_repo
            .transition_all_in_class(class_id, BookingStatus::Booked, BookingStatus::NoShow, now)
            .await?;

        tracing::info!(%class_id, completed, no_shows, "Class completed");
        Ok(CompletionSummary { completed, no_shows })
    }

    pub async fn list_for_member(&self, member_id: Uuid) -> Result<Vec<Booking>> {
        self.booking_repo.list_by_member(member_id).await
    }

    pub async fn leave_waitlist(&self, class_id: Uuid, member_id: Uuid) -> Result<()> {
        self.capacity.leave_waitlist(class_id, member_id).await
    }

    /// Books waiting members into slots freed by a capacity increase.
    pub async fn fill_from_waitlist(&self, session: &ClassSession) -> Result<Vec<Booking>> {
        let mut booked = Vec::new();
        for member_id in self.capacity.fill_open_slots(session.id).await? {
            if let Some(booking) = self.book_promoted(session, Some(member_id)).await {
                booked.push(booking);
            }
        }
        Ok(booked)
    }

    /// Creates the booking for a member moved off the waitlist. The
    /// member's subscription is not re-checked here.
    async fn book_promoted(&self, session: &ClassSession, promoted: Option<Uuid>) -> Option<Booking> {
        let member_id = promoted?;

        match self.booking_repo
            .create(Booking::new(member_id, session.id, self.clock.now()))
            .await
        {
            Ok(booking) => {
                self.notifications
                    .notify(
                        member_id,
                        kinds::WAITLIST_PROMOTED,
                        "Spot Available",
                        format!(
                            "A spot opened up in {} and you've been booked from the waitlist.",
                            session.name
                        ),
                    )
                    .await;
                Some(booking)
            }
            Err(e) => {
                tracing::error!(class_id = %session.id, %member_id, "Failed to book promoted member: {}", e);
                None
            }
        }
    }
}

/// Cancelling is allowed only while more than the window remains before the
/// class starts. Exactly at the window is already too late.
pub fn cancellation_allowed(start_time: DateTime<Utc>, now: DateTime<Utc>, window_hours: i64) -> bool {
    start_time - now > Duration::hours(window_hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_is_exclusive_of_the_boundary() {
        let start = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();

        assert!(!cancellation_allowed(start, start - Duration::hours(2), 2));
        assert!(cancellation_allowed(start, start - Duration::hours(2) - Duration::seconds(1), 2));
        assert!(!cancellation_allowed(start, start - Duration::minutes(30), 2));
        assert!(!cancellation_allowed(start, start + Duration::minutes(5), 2));
    }
}
