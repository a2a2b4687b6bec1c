use async_trait::async_trait;

use crate::domain::{Notification, User};
use crate::error::Result;
use crate::notifications::Notifier;

/// Delivers by writing the notification to the log. Always enabled, so the
/// outbox drains even when no external channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, notification: &Notification, recipient: &User) -> Result<()> {
        tracing::info!(
            notification_id = %notification.id,
            kind = %notification.kind,
            to = %recipient.email,
            "{}: {}",
            notification.title,
            notification.message
        );
        Ok(())
    }
}
