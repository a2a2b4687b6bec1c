use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{NewNotification, Notification, User};
use crate::error::Result;
use crate::repository::NotificationRepository;

pub mod dispatcher;
pub mod log_notifier;

pub use dispatcher::{DispatchSummary, NotificationDispatcher};
pub use log_notifier::LogNotifier;

/// Notification kinds written to the outbox.
pub mod kinds {
    pub const BOOKING_CONFIRMED: &str = "booking_confirmed";
    pub const BOOKING_CANCELLED: &str = "booking_cancelled";
    pub const WAITLIST_PROMOTED: &str = "waitlist_promoted";
    pub const CLASS_CANCELLED: &str = "class_cancelled";
    pub const CLASS_REMINDER: &str = "class_reminder";
    pub const CHECKED_IN: &str = "checked_in";
    pub const PAYMENT_SUCCEEDED: &str = "payment_succeeded";
    pub const PAYMENT_FAILED: &str = "payment_failed";
    pub const PAYMENT_REFUNDED: &str = "payment_refunded";
    pub const SUBSCRIPTION_CANCELLED: &str = "subscription_cancelled";
}

/// A delivery channel for outbox rows (email, push, chat...).
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool {
        true
    }
    async fn deliver(&self, notification: &Notification, recipient: &User) -> Result<()>;
}

/// Writes notifications to the outbox. Failing to enqueue is logged and
/// never surfaces to the operation that triggered it.
pub struct NotificationCenter {
    repo: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
}

impl NotificationCenter {
    pub fn new(repo: Arc<dyn NotificationRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub async fn notify(
        &self,
        user_id: Uuid,
        kind: &'static str,
        title: impl Into<String>,
        message: impl Into<String>,
    ) {
        let notification = NewNotification {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
        };

        match self.repo.enqueue(notification, self.clock.now()).await {
            Ok(stored) => {
                tracing::debug!(notification_id = %stored.id, %user_id, kind, "Notification queued");
            }
            Err(e) => {
                tracing::error!(%user_id, kind, "Failed to queue notification: {}", e);
            }
        }
    }

    pub async fn feed(&self, user_id: Uuid, limit: i64) -> Result<Vec<Notification>> {
        self.repo.list_for_user(user_id, limit).await
    }

    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.repo.mark_read(id, user_id, self.clock.now()).await
    }
}
