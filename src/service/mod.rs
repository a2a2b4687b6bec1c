pub mod attendance_service;
pub mod billing_service;
pub mod booking_service;
pub mod capacity;
pub mod class_service;
pub mod token_issuer;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::AuthService;
use crate::clock::Clock;
use crate::config::Settings;
use crate::jobs::{Reconciler, ReminderSweep};
use crate::notifications::{NotificationCenter, NotificationDispatcher};
use crate::payments::{BillingGateway, SubscriptionSync};
use crate::repository::*;

use attendance_service::AttendanceService;
use billing_service::BillingService;
use booking_service::BookingService;
use capacity::CapacityManager;
use class_service::ClassService;
use token_issuer::TokenIssuer;

/// Everything a request handler or background job needs, wired once at
/// startup over a single pool and clock.
pub struct ServiceContext {
    pub user_repo: Arc<dyn UserRepository>,
    pub class_repo: Arc<dyn ClassRepository>,
    pub booking_repo: Arc<dyn BookingRepository>,
    pub subscription_repo: Arc<dyn SubscriptionRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub auth_service: Arc<AuthService>,
    pub capacity: Arc<CapacityManager>,
    pub class_service: Arc<ClassService>,
    pub booking_service: Arc<BookingService>,
    pub token_issuer: Arc<TokenIssuer>,
    pub attendance_service: Arc<AttendanceService>,
    pub billing_service: Arc<BillingService>,
    pub notifications: Arc<NotificationCenter>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub subscription_sync: Arc<SubscriptionSync>,
    pub reminders: Arc<ReminderSweep>,
    pub reconciler: Arc<Reconciler>,
    pub clock: Arc<dyn Clock>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        settings: &Settings,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn BillingGateway>,
    ) -> Self {
        let user_repo: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(db_pool.clone()));
        let class_repo: Arc<dyn ClassRepository> = Arc::new(SqliteClassRepository::new(db_pool.clone()));
        let booking_repo: Arc<dyn BookingRepository> = Arc::new(SqliteBookingRepository::new(db_pool.clone()));
        let token_repo: Arc<dyn CheckInTokenRepository> =
            Arc::new(SqliteCheckInTokenRepository::new(db_pool.clone()));
        let attendance_repo: Arc<dyn AttendanceRepository> =
            Arc::new(SqliteAttendanceRepository::new(db_pool.clone()));
        let plan_repo: Arc<dyn PlanRepository> = Arc::new(SqlitePlanRepository::new(db_pool.clone()));
        let subscription_repo: Arc<dyn SubscriptionRepository> =
            Arc::new(SqliteSubscriptionRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let audit_repo: Arc<dyn AuditRepository> = Arc::new(SqliteAuditRepository::new(db_pool.clone()));
        let notification_repo: Arc<dyn NotificationRepository> =
            Arc::new(SqliteNotificationRepository::new(db_pool.clone()));
        let webhook_repo: Arc<dyn WebhookEventRepository> =
            Arc::new(SqliteWebhookEventRepository::new(db_pool.clone()));

        let auth_service = Arc::new(AuthService::new(db_pool.clone(), user_repo.clone(), clock.clone()));
        let notifications = Arc::new(NotificationCenter::new(notification_repo.clone(), clock.clone()));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            notification_repo.clone(),
            user_repo.clone(),
            clock.clone(),
            settings.jobs.outbox_batch_size,
            settings.jobs.outbox_max_attempts,
        ));

        let capacity = Arc::new(CapacityManager::new(class_repo.clone(), clock.clone()));
        let booking_service = Arc::new(BookingService::new(
            booking_repo.clone(),
            class_repo.clone(),
            subscription_repo.clone(),
            capacity.clone(),
            notifications.clone(),
            clock.clone(),
            settings.booking.clone(),
        ));
        let class_service = Arc::new(ClassService::new(
            class_repo.clone(),
            booking_repo.clone(),
            user_repo.clone(),
            booking_service.clone(),
            notifications.clone(),
            clock.clone(),
        ));
        let token_issuer = Arc::new(TokenIssuer::new(
            token_repo,
            booking_repo.clone(),
            clock.clone(),
            settings.checkin.clone(),
        ));
        let attendance_service = Arc::new(AttendanceService::new(
            attendance_repo,
            booking_repo.clone(),
            class_repo.clone(),
            audit_repo.clone(),
            token_issuer.clone(),
            notifications.clone(),
            clock.clone(),
        ));
        let billing_service = Arc::new(BillingService::new(
            plan_repo.clone(),
            subscription_repo.clone(),
            payment_repo.clone(),
            user_repo.clone(),
            audit_repo.clone(),
            gateway.clone(),
            notifications.clone(),
            clock.clone(),
            settings.server.base_url.clone(),
        ));
        let subscription_sync = Arc::new(SubscriptionSync::new(
            subscription_repo.clone(),
            payment_repo.clone(),
            user_repo.clone(),
            plan_repo,
            webhook_repo,
            notifications.clone(),
            clock.clone(),
            settings.webhooks.event_cache_size,
        ));

        let reminders = Arc::new(ReminderSweep::new(
            class_repo.clone(),
            booking_repo.clone(),
            notification_repo,
            notifications.clone(),
            clock.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            payment_repo.clone(),
            audit_repo,
            gateway,
            clock.clone(),
            settings.jobs.reconciliation_lookback_days,
        ));

        Self {
            user_repo,
            class_repo,
            booking_repo,
            subscription_repo,
            payment_repo,
            auth_service,
            capacity,
            class_service,
            booking_service,
            token_issuer,
            attendance_service,
            billing_service,
            notifications,
            dispatcher,
            subscription_sync,
            reminders,
            reconciler,
            clock,
            db_pool,
        }
    }
}
