use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::time;

use crate::clock::Clock;
use crate::domain::Notification;
use crate::error::{AppError, Result};
use crate::notifications::Notifier;
use crate::repository::{NotificationRepository, UserRepository};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Drains the notification outbox through the registered notifiers.
///
/// A row is delivered when every enabled notifier accepts it. Otherwise the
/// attempt is recorded and the row is retried on a later poll until it runs
/// out of attempts.
pub struct NotificationDispatcher {
    repo: Arc<dyn NotificationRepository>,
    user_repo: Arc<dyn UserRepository>,
    notifiers: RwLock<Vec<Arc<dyn Notifier>>>,
    clock: Arc<dyn Clock>,
    batch_size: i64,
    max_attempts: i64,
}

impl NotificationDispatcher {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        user_repo: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
        batch_size: i64,
        max_attempts: i64,
    ) -> Self {
        Self {
            repo,
            user_repo,
            notifiers: RwLock::new(Vec::new()),
            clock,
            batch_size,
            max_attempts,
        }
    }

    pub async fn register(&self, notifier: Arc<dyn Notifier>) {
        if notifier.is_enabled() {
            tracing::info!("Registered notifier: {}", notifier.name());
            self.notifiers.write().await.push(notifier);
        }
    }

    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // Flush what is already queued before stopping
                        if let Err(e) = self.process_batch().await {
                            tracing::error!("Final notification batch failed: {}", e);
                        }
                        tracing::info!("Notification dispatcher stopped");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.process_batch().await {
                        tracing::error!("Notification batch failed: {}", e);
                    }
                }
            }
        }
    }

    pub async fn process_batch(&self) -> Result<DispatchSummary> {
        let notifiers = self.notifiers.read().await.clone();
        if notifiers.is_empty() {
            tracing::debug!("No notifiers registered, leaving outbox untouched");
            return Ok(DispatchSummary::default());
        }

        let pending = self.repo.pending(self.batch_size).await?;
        let mut summary = DispatchSummary::default();

        for notification in pending {
            match self.deliver(&notifiers, &notification).await {
                Ok(()) => {
                    self.repo.mark_delivered(notification.id, self.clock.now()).await?;
                    summary.delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        notification_id = %notification.id,
                        attempts = notification.attempts + 1,
                        "Notification delivery failed: {}",
                        e
                    );
                    self.repo
                        .record_failure(notification.id, &e.to_string(), self.max_attempts)
                        .await?;
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn deliver(&self, notifiers: &[Arc<dyn Notifier>], notification: &Notification) -> Result<()> {
        let recipient = self.user_repo.find_by_id(notification.user_id).await?
            .ok_or_else(|| AppError::NotFound("Recipient no longer exists".to_string()))?;

        for notifier in notifiers {
            notifier.deliver(notification, &recipient).await.map_err(|e| {
                AppError::External(format!("{}: {}", notifier.name(), e))
            })?;
        }

        Ok(())
    }
}
