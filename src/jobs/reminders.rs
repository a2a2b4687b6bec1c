use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use crate::{
    clock::Clock,
    domain::{BookingStatus, ClassSession},
    error::Result,
    notifications::{kinds, NotificationCenter},
    repository::{BookingRepository, ClassRepository, NotificationRepository},
};

/// A band of start times around a fixed lead time.
#[derive(Debug, Clone, Copy)]
pub struct ReminderWindow {
    pub label: &'static str,
    pub lead: Duration,
    pub tolerance: Duration,
}

pub fn default_windows() -> [ReminderWindow; 2] {
    [
        ReminderWindow {
            label: "24h",
            lead: Duration::hours(24),
            tolerance: Duration::minutes(30),
        },
        ReminderWindow {
            label: "1h",
            lead: Duration::hours(1),
            tolerance: Duration::minutes(15),
        },
    ]
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReminderSummary {
    pub sessions: usize,
    pub sent: usize,
    pub already_sent: usize,
}

pub struct ReminderSweep {
    class_repo: Arc<dyn ClassRepository>,
    booking_repo: Arc<dyn BookingRepository>,
    notification_repo: Arc<dyn NotificationRepository>,
    notifications: Arc<NotificationCenter>,
    clock: Arc<dyn Clock>,
    windows: Vec<ReminderWindow>,
}

impl ReminderSweep {
    pub fn new(
        class_repo: Arc<dyn ClassRepository>,
        booking_repo: Arc<dyn BookingRepository>,
        notification_repo: Arc<dyn NotificationRepository>,
        notifications: Arc<NotificationCenter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            class_repo,
            booking_repo,
            notification_repo,
            notifications,
            clock,
            windows: default_windows().to_vec(),
        }
    }

    /// Sends at most one reminder per booking and window, however often the
    /// sweep runs while a session sits inside the window.
    pub async fn run_once(&self) -> Result<ReminderSummary> {
        let now = self.clock.now();
        let mut summary = ReminderSummary::default();

        for window in &self.windows {
            let target = now + window.lead;
            let sessions = self.class_repo
                .list_scheduled_between(target - window.tolerance, target + window.tolerance)
                .await?;

            for session in sessions {
                summary.sessions += 1;
                self.remind_session(&session, window, &mut summary).await?;
            }
        }

        if summary.sent > 0 {
            tracing::info!(sent = summary.sent, sessions = summary.sessions, "Class reminders queued");
        }
        Ok(summary)
    }

    async fn remind_session(
        &self,
        session: &ClassSession,
        window: &ReminderWindow,
        summary: &mut ReminderSummary,
    ) -> Result<()> {
        let bookings = self.booking_repo
            .list_by_class_and_status(session.id, BookingStatus::Booked)
            .await?;

        for booking in bookings {
            if !self.notification_repo
                .claim_reminder(booking.id, window.label, self.clock.now())
                .await?
            {
                summary.already_sent += 1;
                continue;
            }

            self.notifications
                .notify(
                    booking.member_id,
                    kinds::CLASS_REMINDER,
                    "Class Reminder",
                    format!(
                        "{} starts at {}{}.",
                        session.name,
                        session.start_time.format("%H:%M UTC on %a %d %b"),
                        session
                            .location
                            .as_deref()
                            .map(|location| format!(" in {}", location))
                            .unwrap_or_default()
                    ),
                )
                .await;
            summary.sent += 1;
        }

        Ok(())
    }
}
