use std::sync::Arc;

use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{AppError, Result},
    repository::ClassRepository,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClaim {
    Admitted,
    Waitlisted { position: i64 },
}

/// Owns the attendee/waitlist sets of class sessions. Every mutation is a
/// conditional statement at the storage layer; nothing here reads a count
/// and then writes based on it.
pub struct CapacityManager {
    class_repo: Arc<dyn ClassRepository>,
    clock: Arc<dyn Clock>,
}

impl CapacityManager {
    pub fn new(class_repo: Arc<dyn ClassRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { class_repo, clock }
    }

    pub async fn claim_slot(&self, class_id: Uuid, member_id: Uuid) -> Result<SlotClaim> {
        let now = self.clock.now();

        if self.class_repo.try_admit(class_id, member_id, now).await? {
            return Ok(SlotClaim::Admitted);
        }

        if let Some(position) = self.class_repo.try_waitlist(class_id, member_id, now).await? {
            return Ok(SlotClaim::Waitlisted { position });
        }

        // The waitlist insert can lose to a concurrent release that freed a
        // slot; one more admission attempt settles it.
        if self.class_repo.try_admit(class_id, member_id, now).await? {
            return Ok(SlotClaim::Admitted);
        }

        Err(AppError::ClassUnavailable)
    }

    /// Frees the member's slot and promotes the head of the waitlist into it.
    /// Returns the promoted member, if any.
    pub async fn release_slot(&self, class_id: Uuid, member_id: Uuid) -> Result<Option<Uuid>> {
        let promoted = self
            .class_repo
            .release_and_promote(class_id, member_id, self.clock.now())
            .await?;

        if let Some(promoted) = promoted {
            tracing::info!(%class_id, %promoted, "Promoted member from waitlist");
        }

        Ok(promoted)
    }

    /// Fills any free slots from the head of the waitlist, in order.
    pub async fn fill_open_slots(&self, class_id: Uuid) -> Result<Vec<Uuid>> {
        let promoted = self.class_repo.promote_waiting(class_id, self.clock.now()).await?;
        if !promoted.is_empty() {
            tracing::info!(%class_id, count = promoted.len(), "Filled open slots from waitlist");
        }
        Ok(promoted)
    }

    pub async fn leave_waitlist(&self, class_id: Uuid, member_id: Uuid) -> Result<()> {
        if self.class_repo.remove_from_waitlist(class_id, member_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound("Not on the waitlist for this class".to_string()))
        }
    }
}
