use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    domain::*,
    error::{AppError, Result},
    notifications::{kinds, NotificationCenter},
    repository::{BookingRepository, ClassRepository, UserRepository},
    service::booking_service::BookingService,
};

pub struct ClassService {
    class_repo: Arc<dyn ClassRepository>,
    booking_repo: Arc<dyn BookingRepository>,
    user_repo: Arc<dyn UserRepository>,
    booking_service: Arc<BookingService>,
    notifications: Arc<NotificationCenter>,
    clock: Arc<dyn Clock>,
}

impl ClassService {
    pub fn new(
        class_repo: Arc<dyn ClassRepository>,
        booking_repo: Arc<dyn BookingRepository>,
        user_repo: Arc<dyn UserRepository>,
        booking_service: Arc<BookingService>,
        notifications: Arc<NotificationCenter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            class_repo,
            booking_repo,
            user_repo,
            booking_service,
            notifications,
            clock,
        }
    }

    pub async fn create(&self, requester: &User, request: CreateClassRequest) -> Result<ClassSession> {
        request.validate()?;

        let trainer_id = if requester.is_admin() {
            match request.trainer_id {
                Some(trainer_id) => {
                    let trainer = self.user_repo.find_by_id(trainer_id).await?
                        .ok_or_else(|| AppError::NotFound("Trainer not found".to_string()))?;
                    if !trainer.is_trainer() {
                        return Err(AppError::BadRequest("Assigned user is not a trainer".to_string()));
                    }
                    trainer.id
                }
                None => requester.id,
            }
        } else if requester.is_trainer() {
            requester.id
        } else {
            return Err(AppError::Forbidden);
        };

        let now = self.clock.now();
        let session = ClassSession {
            id: Uuid::new_v4(),
            trainer_id,
            name: request.name,
            description: request.description,
            start_time: request.start_time,
            end_time: request.end_time,
            capacity: request.capacity,
            location: request.location,
            status: ClassStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };

        let created = self.class_repo.create(session).await?;
        tracing::info!(class_id = %created.id, trainer_id = %created.trainer_id, "Class created");
        Ok(created)
    }

    pub async fn update(&self, requester: &User, id: Uuid, request: UpdateClassRequest) -> Result<ClassSession> {
        request.validate()?;

        let mut session = self.owned_session(requester, id).await?;
        if !session.is_scheduled() {
            return Err(AppError::InvalidState("Only scheduled classes can be edited".to_string()));
        }

        if let Some(name) = request.name {
            session.name = name;
        }
        if request.description.is_some() {
            session.description = request.description;
        }
        let now = self.clock.now();
        if let Some(start_time) = request.start_time {
            if start_time <= now {
                return Err(AppError::Validation("start_time must be in the future".to_string()));
            }
            session.start_time = start_time;
        }
        if let Some(end_time) = request.end_time {
            session.end_time = end_time;
        }
        if request.location.is_some() {
            session.location = request.location;
        }
        if session.end_time <= session.start_time {
            return Err(AppError::Validation("end_time must be after start_time".to_string()));
        }

        let mut grew = false;
        if let Some(capacity) = request.capacity {
            let attendees = self.class_repo.attendee_count(id).await?;
            if capacity < attendees {
                return Err(AppError::Conflict(format!(
                    "Capacity cannot drop below the {} members already booked",
                    attendees
                )));
            }
            grew = capacity > session.capacity;
            session.capacity = capacity;
        }

        session.updated_at = now;
        let updated = self.class_repo.update(session).await?;

        // New seats go to the waitlist first, never to the next booker
        if grew {
            let promoted = self.booking_service.fill_from_waitlist(&updated).await?;
            if !promoted.is_empty() {
                tracing::info!(class_id = %id, promoted = promoted.len(), "Waitlist promoted after capacity increase");
            }
        }

        Ok(updated)
    }

    pub async fn list_upcoming(&self, limit: i64) -> Result<Vec<ClassSummary>> {
        let sessions = self.class_repo.list_upcoming(self.clock.now(), limit).await?;

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(self.summarize(session).await?);
        }
        Ok(summaries)
    }

    pub async fn list_for_trainer(&self, trainer_id: Uuid) -> Result<Vec<ClassSession>> {
        self.class_repo.list_by_trainer(trainer_id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<ClassSummary> {
        let session = self.class_repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;
        self.summarize(session).await
    }

    pub async fn roster(&self, requester: &User, id: Uuid) -> Result<ClassRoster> {
        self.owned_session(requester, id).await?;
        self.class_repo.roster(id).await
    }

    /// Cancels a scheduled class and every booking still held for it.
    pub async fn cancel(&self, requester: &User, id: Uuid) -> Result<ClassSession> {
        let session = self.owned_session(requester, id).await?;

        let now = self.clock.now();
        if !self.class_repo
            .transition_from_scheduled(id, ClassStatus::Cancelled, now)
            .await?
        {
            return Err(AppError::InvalidState("Class is not scheduled".to_string()));
        }

        let bookings = self.booking_repo
            .list_by_class_and_status(id, BookingStatus::Booked)
            .await?;

        for booking in bookings {
            if self.booking_repo
                .cancel(booking.id, Some("class cancelled".to_string()), now)
                .await?
            {
                self.notifications
                    .notify(
                        booking.member_id,
                        kinds::CLASS_CANCELLED,
                        "Class Cancelled",
                        format!(
                            "{} on {} has been cancelled.",
                            session.name,
                            session.start_time.format("%a %d %b %H:%M UTC")
                        ),
                    )
                    .await;
            }
        }

        tracing::info!(class_id = %id, "Class cancelled");
        self.class_repo.find_by_id(id).await?
            .ok_or_else(|| AppError::Database("Failed to retrieve cancelled class".to_string()))
    }

    async fn owned_session(&self, requester: &User, id: Uuid) -> Result<ClassSession> {
        let session = self.class_repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;

        if !requester.is_admin() && !session.is_owned_by(requester.id) {
            return Err(AppError::NotOwner);
        }
        Ok(session)
    }

    async fn summarize(&self, session: ClassSession) -> Result<ClassSummary> {
        let roster = self.class_repo.roster(session.id).await?;
        Ok(ClassSummary {
            session,
            attendee_count: roster.attendees.len() as i64,
            waitlist_count: roster.waitlist.len() as i64,
        })
    }
}
