use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;
use crate::domain::*;
use crate::error::{AppError, Result};

pub mod user_repository;
pub mod class_repository;
pub mod booking_repository;
pub mod checkin_token_repository;
pub mod attendance_repository;
pub mod plan_repository;
pub mod subscription_repository;
pub mod payment_repository;
pub mod audit_repository;
pub mod notification_repository;
pub mod webhook_event_repository;

pub use user_repository::SqliteUserRepository;
pub use class_repository::SqliteClassRepository;
pub use booking_repository::SqliteBookingRepository;
pub use checkin_token_repository::SqliteCheckInTokenRepository;
pub use attendance_repository::SqliteAttendanceRepository;
pub use plan_repository::SqlitePlanRepository;
pub use subscription_repository::SqliteSubscriptionRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use audit_repository::SqliteAuditRepository;
pub use notification_repository::SqliteNotificationRepository;
pub use webhook_event_repository::SqliteWebhookEventRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, request: CreateUserRequest) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_stripe_customer_id(&self, customer_id: &str) -> Result<Option<User>>;
    async fn password_hash(&self, email: &str) -> Result<Option<String>>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>>;
    async fn update(&self, id: Uuid, update: UpdateUserRequest) -> Result<User>;
}

/// Class sessions and the attendee/waitlist sets they own. The slot
/// operations are single conditional statements (or one transaction for
/// release + promotion) so concurrent callers cannot push a session past
/// its capacity.
#[async_trait]
pub trait ClassRepository: Send + Sync {
    async fn create(&self, session: ClassSession) -> Result<ClassSession>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ClassSession>>;
    async fn list_upcoming(&self, from: DateTime<Utc>, limit: i64) -> Result<Vec<ClassSession>>;
    async fn list_by_trainer(&self, trainer_id: Uuid) -> Result<Vec<ClassSession>>;
    async fn list_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClassSession>>;
    async fn update(&self, session: ClassSession) -> Result<ClassSession>;
    /// Moves a scheduled session to `status`. Returns false if the session
    /// was no longer scheduled.
    async fn transition_from_scheduled(&self, id: Uuid, status: ClassStatus, at: DateTime<Utc>) -> Result<bool>;

    /// Adds the member to attendees iff the session is scheduled, below
    /// capacity, nobody is waiting and the member is not already attending.
    async fn try_admit(&self, class_id: Uuid, member_id: Uuid, at: DateTime<Utc>) -> Result<bool>;
    /// Appends the member to the waitlist iff the session is scheduled and
    /// the member is on neither list. Returns the 1-based position.
    async fn try_waitlist(&self, class_id: Uuid, member_id: Uuid, at: DateTime<Utc>) -> Result<Option<i64>>;
    /// Removes the member from attendees and, in the same transaction,
    /// promotes the waitlist head if a slot is free.
    async fn release_and_promote(&self, class_id: Uuid, member_id: Uuid, at: DateTime<Utc>) -> Result<Option<Uuid>>;
    /// Moves waitlist heads into attendees, in order, until the session is
    /// full or nobody is waiting. Returns the promoted members.
    async fn promote_waiting(&self, class_id: Uuid, at: DateTime<Utc>) -> Result<Vec<Uuid>>;
    async fn remove_from_waitlist(&self, class_id: Uuid, member_id: Uuid) -> Result<bool>;
    async fn waitlist_position(&self, class_id: Uuid, member_id: Uuid) -> Result<Option<i64>>;
    async fn roster(&self, class_id: Uuid) -> Result<ClassRoster>;
    async fn attendee_count(&self, class_id: Uuid) -> Result<i64>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, booking: Booking) -> Result<Booking>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>>;
    async fn find_active(&self, member_id: Uuid, class_id: Uuid) -> Result<Option<Booking>>;
    async fn list_by_member(&self, member_id: Uuid) -> Result<Vec<Booking>>;
    async fn list_by_class(&self, class_id: Uuid) -> Result<Vec<Booking>>;
    async fn list_by_class_and_status(&self, class_id: Uuid, status: BookingStatus) -> Result<Vec<Booking>>;
    /// Conditional status change; false if the booking was not in `from`.
    async fn transition(&self, id: Uuid, from: BookingStatus, to: BookingStatus, at: DateTime<Utc>) -> Result<bool>;
    async fn cancel(&self, id: Uuid, reason: Option<String>, at: DateTime<Utc>) -> Result<bool>;
    /// Bulk transition used when a session completes or is cancelled.
    async fn transition_all_in_class(
        &self,
        class_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<u64>;
    async fn set_qr_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait CheckInTokenRepository: Send + Sync {
    async fn create(&self, token: CheckInToken) -> Result<()>;
    async fn find_by_hash(&self, token_hash: &str, booking_id: Uuid) -> Result<Option<CheckInToken>>;
    /// Flips `used` iff it is still false. Only one caller can win.
    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;
    async fn revoke_unused_for_booking(&self, booking_id: Uuid, at: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    /// Moves the booking from booked to checked-in and inserts the record in
    /// one transaction. Fails with `AlreadyCheckedIn` if the booking already
    /// has a record, or `InvalidState` if it is no longer booked.
    async fn check_in(&self, attendance: Attendance) -> Result<Attendance>;
    async fn find_by_booking(&self, booking_id: Uuid) -> Result<Option<Attendance>>;
    async fn list_by_class(&self, class_id: Uuid) -> Result<Vec<Attendance>>;
    async fn list_by_member(&self, member_id: Uuid) -> Result<Vec<Attendance>>;
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn create(&self, request: CreatePlanRequest) -> Result<Plan>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Plan>>;
    async fn list(&self, include_inactive: bool) -> Result<Vec<Plan>>;
    async fn update(&self, id: Uuid, update: UpdatePlanRequest) -> Result<Plan>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: Subscription) -> Result<Subscription>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>>;
    async fn find_by_stripe_id(&self, stripe_subscription_id: &str) -> Result<Option<Subscription>>;
    async fn find_current_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<Subscription>>;
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Subscription>>;
    async fn set_status(&self, id: Uuid, status: SubscriptionStatus, at: DateTime<Utc>) -> Result<()>;
    async fn mark_cancelled(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn apply_provider_state(&self, id: Uuid, state: &ProviderSubscription, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: Payment) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>>;
    async fn find_by_invoice_id(&self, invoice_id: &str) -> Result<Option<Payment>>;
    async fn find_by_payment_intent_id(&self, payment_intent_id: &str) -> Result<Option<Payment>>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Payment>>;
    async fn link_invoice(&self, id: Uuid, invoice_id: &str, subscription_id: Uuid, at: DateTime<Utc>) -> Result<()>;
    /// Pending or failed becomes paid. False if the payment was in any other state.
    async fn settle(&self, id: Uuid, method: PaymentMethod, description: Option<String>, at: DateTime<Utc>) -> Result<bool>;
    /// Pending becomes failed.
    async fn mark_failed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;
    async fn mark_refunded(&self, id: Uuid, reason: Option<String>, at: DateTime<Utc>) -> Result<Payment>;
    async fn list_unreconciled_since(&self, since: DateTime<Utc>) -> Result<Vec<Payment>>;
    /// Sets `reconciled` iff it is still false. Never touches `status`.
    async fn mark_reconciled(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
    async fn list_recent(&self, limit: i64) -> Result<Vec<AuditEntry>>;
    async fn list_by_action(&self, action: &str) -> Result<Vec<AuditEntry>>;
    async fn exists(&self, action: &str, resource_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn enqueue(&self, notification: NewNotification, at: DateTime<Utc>) -> Result<Notification>;
    async fn pending(&self, limit: i64) -> Result<Vec<Notification>>;
    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    /// Records a failed attempt; the row becomes `Failed` once `max_attempts` is reached.
    async fn record_failure(&self, id: Uuid, error: &str, max_attempts: i64) -> Result<()>;
    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Notification>>;
    async fn mark_read(&self, id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<bool>;
    /// Claims the reminder marker for a booking/window. False if already sent.
    async fn claim_reminder(&self, booking_id: Uuid, window: &str, at: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Records the event id. False if it was already recorded.
    async fn claim(&self, event_id: &str, event_type: &str, at: DateTime<Utc>) -> Result<bool>;
    async fn release(&self, event_id: &str) -> Result<()>;
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
}

pub(crate) fn parse_optional_uuid(s: Option<String>) -> Result<Option<Uuid>> {
    s.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(dt, Utc)
}

pub(crate) fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> Result<T> {
    s.parse::<T>().map_err(AppError::Database)
}
