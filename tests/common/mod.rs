#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use gymdesk::{
    clock::{Clock, ManualClock},
    config::Settings,
    domain::*,
    error::{AppError, Result},
    payments::{BillingGateway, CheckoutRequest, CreatedPaymentIntent, PaymentIntentRequest},
    service::ServiceContext,
};

/// In-memory stand-in for the billing provider.
#[derive(Default)]
pub struct FakeGateway {
    pub amounts: Mutex<HashMap<String, i64>>,
    pub refunded: Mutex<Vec<String>>,
    pub cancelled: Mutex<Vec<String>>,
    pub fail_refunds: Mutex<bool>,
    pub intents: Mutex<Vec<PaymentIntentRequest>>,
    /// When set, a refund also flips the local row the way the provider's
    /// `charge.refunded` webhook would, before the caller records it.
    pub webhook_refunds_first: Mutex<Option<SqlitePool>>,
}

impl FakeGateway {
    pub fn set_amount(&self, payment_intent_id: &str, amount_cents: i64) {
        self.amounts.lock().unwrap().insert(payment_intent_id.to_string(), amount_cents);
    }

    pub fn fail_refunds(&self, fail: bool) {
        *self.fail_refunds.lock().unwrap() = fail;
    }

    pub fn refund_webhook_wins(&self, pool: SqlitePool) {
        *self.webhook_refunds_first.lock().unwrap() = Some(pool);
    }
}

#[async_trait]
impl BillingGateway for FakeGateway {
    async fn retrieve_payment_amount(&self, payment_intent_id: &str) -> Result<i64> {
        self.amounts
            .lock()
            .unwrap()
            .get(payment_intent_id)
            .copied()
            .ok_or_else(|| AppError::External(format!("No such payment_intent: {}", payment_intent_id)))
    }

    async fn refund_payment(&self, payment_intent_id: &str) -> Result<()> {
        if *self.fail_refunds.lock().unwrap() {
            return Err(AppError::External("card_declined".to_string()));
        }
        self.refunded.lock().unwrap().push(payment_intent_id.to_string());

        let pool = self.webhook_refunds_first.lock().unwrap().clone();
        if let Some(pool) = pool {
            sqlx::query(
                "UPDATE payments SET status = 'Refunded', refunded_at = CURRENT_TIMESTAMP, \
                 refund_reason = 'Refunded via provider' WHERE stripe_payment_intent_id = ?",
            )
            .bind(payment_intent_id)
            .execute(&pool)
            .await?;
        }
        Ok(())
    }

    async fn create_subscription_checkout(&self, request: CheckoutRequest) -> Result<String> {
        Ok(format!("https://checkout.test/{}", request.plan_id))
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(subscription_id.to_string());
        Ok(())
    }

    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<CreatedPaymentIntent> {
        let mut intents = self.intents.lock().unwrap();
        intents.push(request);
        let id = format!("pi_test_{}", intents.len());
        Ok(CreatedPaymentIntent {
            client_secret: format!("{}_secret", id),
            id,
        })
    }
}

pub struct TestApp {
    pub ctx: Arc<ServiceContext>,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<FakeGateway>,
    pub pool: SqlitePool,
    pub settings: Settings,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, 4, 8, 0, 0).unwrap()
}

/// One connection so every task shares the same in-memory database.
pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub async fn setup() -> anyhow::Result<TestApp> {
    let pool = test_pool().await?;
    Ok(app_on(pool, Arc::new(ManualClock::new(start_time())), Arc::new(FakeGateway::default())))
}

/// A second context over an existing pool, with fresh in-memory caches.
pub fn app_on(pool: SqlitePool, clock: Arc<ManualClock>, gateway: Arc<FakeGateway>) -> TestApp {
    let mut settings = Settings::default();
    settings.checkin.token_secret = "test-secret".to_string();

    let ctx = Arc::new(ServiceContext::new(
        pool.clone(),
        &settings,
        clock.clone() as Arc<dyn Clock>,
        gateway.clone() as Arc<dyn BillingGateway>,
    ));

    TestApp {
        ctx,
        clock,
        gateway,
        pool,
        settings,
    }
}

impl TestApp {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn user(&self, email: &str, role: Role) -> anyhow::Result<User> {
        let user = self.ctx.user_repo
            .create(CreateUserRequest {
                email: email.to_string(),
                full_name: email.split('@').next().unwrap_or(email).to_string(),
                password: "password123".to_string(),
                phone: None,
                role,
            })
            .await?;
        Ok(user)
    }

    pub async fn admin(&self) -> anyhow::Result<User> {
        self.user("admin@gym.test", Role::Admin).await
    }

    pub async fn trainer(&self, email: &str) -> anyhow::Result<User> {
        self.user(email, Role::Trainer(TrainerProfile::default())).await
    }

    /// A member holding an active subscription for the next 30 days.
    pub async fn member(&self, email: &str) -> anyhow::Result<User> {
        let member = self.user(email, Role::Member(MemberProfile::default())).await?;
        self.subscribe(&member, &format!("sub_{}", Uuid::new_v4().simple())).await?;
        Ok(member)
    }

    pub async fn member_without_subscription(&self, email: &str) -> anyhow::Result<User> {
        self.user(email, Role::Member(MemberProfile::default())).await
    }

    pub async fn subscribe(&self, user: &User, stripe_subscription_id: &str) -> anyhow::Result<Subscription> {
        let now = self.now();
        let subscription = self.ctx.subscription_repo
            .create(Subscription {
                id: Uuid::new_v4(),
                user_id: user.id,
                plan_id: None,
                stripe_customer_id: None,
                stripe_subscription_id: stripe_subscription_id.to_string(),
                status: SubscriptionStatus::Active,
                current_period_start: now,
                current_period_end: now + Duration::days(30),
                cancel_at_period_end: false,
                cancelled_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
        Ok(subscription)
    }

    pub async fn class(&self, trainer: &User, starts_in: Duration, capacity: i64) -> anyhow::Result<ClassSession> {
        let start_time = self.now() + starts_in;
        let session = self.ctx.class_service
            .create(
                trainer,
                CreateClassRequest {
                    trainer_id: None,
                    name: "Morning HIIT".to_string(),
                    description: None,
                    start_time,
                    end_time: start_time + Duration::minutes(45),
                    capacity,
                    location: Some("Studio A".to_string()),
                },
            )
            .await?;
        Ok(session)
    }

    pub async fn book(&self, member: &User, class_id: Uuid) -> anyhow::Result<Booking> {
        match self.ctx.booking_service.book(member, class_id).await? {
            BookingOutcome::Booked { booking } => Ok(booking),
            other => anyhow::bail!("expected a booking, got {:?}", other),
        }
    }

    pub async fn notification_kinds(&self, user_id: Uuid) -> anyhow::Result<Vec<String>> {
        let feed = self.ctx.notifications.feed(user_id, 100).await?;
        Ok(feed.into_iter().map(|n| n.kind).collect())
    }
}
