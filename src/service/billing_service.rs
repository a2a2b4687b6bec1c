use std::sync::Arc;

use chrono::Months;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    domain::*,
    error::{AppError, Result},
    notifications::{kinds, NotificationCenter},
    payments::{sync::format_amount, BillingGateway, CheckoutRequest, PaymentIntentRequest},
    repository::{AuditRepository, PaymentRepository, PlanRepository, SubscriptionRepository, UserRepository},
};

/// Plans, subscriptions and payments as seen from the members' and the
/// admins' side. Provider-driven state changes live in `SubscriptionSync`.
pub struct BillingService {
    plan_repo: Arc<dyn PlanRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    user_repo: Arc<dyn UserRepository>,
    audit_repo: Arc<dyn AuditRepository>,
    gateway: Arc<dyn BillingGateway>,
    notifications: Arc<NotificationCenter>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl BillingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plan_repo: Arc<dyn PlanRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        user_repo: Arc<dyn UserRepository>,
        audit_repo: Arc<dyn AuditRepository>,
        gateway: Arc<dyn BillingGateway>,
        notifications: Arc<NotificationCenter>,
        clock: Arc<dyn Clock>,
        base_url: String,
    ) -> Self {
        Self {
            plan_repo,
            subscription_repo,
            payment_repo,
            user_repo,
            audit_repo,
            gateway,
            notifications,
            clock,
            base_url,
        }
    }

    // Plans

    pub async fn list_plans(&self, include_inactive: bool) -> Result<Vec<Plan>> {
        self.plan_repo.list(include_inactive).await
    }

    pub async fn create_plan(&self, admin: &User, request: CreatePlanRequest) -> Result<Plan> {
        request.validate()?;
        let plan = self.plan_repo.create(request).await?;

        self.audit(admin.id, "create_plan", "plan", plan.id.to_string(), json!({ "name": plan.name }))
            .await;
        Ok(plan)
    }

    pub async fn update_plan(&self, admin: &User, id: Uuid, request: UpdatePlanRequest) -> Result<Plan> {
        if let Some(ref name) = request.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Plan name cannot be empty".to_string()));
            }
        }
        if matches!(request.classes_per_month, Some(n) if n < 0) {
            return Err(AppError::Validation("classes_per_month cannot be negative".to_string()));
        }

        let plan = self.plan_repo.update(id, request).await?;
        self.audit(admin.id, "update_plan", "plan", plan.id.to_string(), json!({ "is_active": plan.is_active }))
            .await;
        Ok(plan)
    }

    /// Plans are never deleted; existing subscriptions keep pointing at them.
    pub async fn deactivate_plan(&self, admin: &User, id: Uuid) -> Result<Plan> {
        self.update_plan(
            admin,
            id,
            UpdatePlanRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    // Subscriptions

    pub async fn start_checkout(&self, user: &User, plan_id: Uuid) -> Result<String> {
        let plan = self.plan_repo.find_by_id(plan_id).await?
            .filter(|plan| plan.is_active)
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        if self.subscription_repo
            .find_current_for_user(user.id, self.clock.now())
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("You already have an active subscription".to_string()));
        }

        let base = self.base_url.trim_end_matches('/');
        let url = self.gateway
            .create_subscription_checkout(CheckoutRequest {
                user_id: user.id,
                plan_id: plan.id,
                price_id: plan.stripe_price_id.clone(),
                customer_email: user.email.clone(),
                customer_id: user.stripe_customer_id.clone(),
                success_url: format!("{}/subscriptions/success", base),
                cancel_url: format!("{}/subscriptions/cancelled", base),
            })
            .await?;

        tracing::info!(user_id = %user.id, plan_id = %plan.id, "Checkout session created");
        Ok(url)
    }

    pub async fn subscriptions_for(&self, user_id: Uuid) -> Result<Vec<Subscription>> {
        self.subscription_repo.list_by_user(user_id).await
    }

    /// Stops renewal at the end of the current period. The provider is asked
    /// first; its failure is surfaced and nothing changes locally.
    pub async fn cancel_subscription(&self, user: &User, subscription_id: Uuid) -> Result<Subscription> {
        let subscription = self.subscription_repo.find_by_id(subscription_id).await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        if subscription.user_id != user.id && !user.is_admin() {
            return Err(AppError::NotOwner);
        }
        if !subscription.status.grants_access() {
            return Err(AppError::InvalidState(format!(
                "Cannot cancel a subscription that is {}",
                subscription.status.as_str()
            )));
        }
        if subscription.cancel_at_period_end {
            return Ok(subscription);
        }

        if !is_manual_grant(&subscription.stripe_subscription_id) {
            self.gateway
                .cancel_at_period_end(&subscription.stripe_subscription_id)
                .await?;
        }

        let now = self.clock.now();
        self.subscription_repo
            .apply_provider_state(
                subscription.id,
                &ProviderSubscription {
                    subscription_id: subscription.stripe_subscription_id.clone(),
                    status: subscription.status,
                    current_period_start: subscription.current_period_start,
                    current_period_end: subscription.current_period_end,
                    cancel_at_period_end: true,
                },
                now,
            )
            .await?;

        tracing::info!(subscription_id = %subscription.id, "Subscription set to cancel at period end");
        self.notifications
            .notify(
                subscription.user_id,
                kinds::SUBSCRIPTION_CANCELLED,
                "Subscription Cancelled",
                format!(
                    "Your subscription will end on {}.",
                    subscription.current_period_end.format("%d %b %Y")
                ),
            )
            .await;

        self.subscription_repo.find_by_id(subscription.id).await?
            .ok_or_else(|| AppError::Database("Failed to retrieve subscription".to_string()))
    }

    pub async fn grant_subscription(
        &self,
        admin: &User,
        user_id: Uuid,
        request: GrantSubscriptionRequest,
    ) -> Result<Subscription> {
        request.validate()?;

        let user = self.user_repo.find_by_id(user_id).await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let plan = self.plan_repo.find_by_id(request.plan_id).await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        let now = self.clock.now();
        let period_end = now
            .checked_add_months(Months::new(request.months))
            .ok_or_else(|| AppError::Validation("Subscription period is out of range".to_string()))?;

        let subscription = self.subscription_repo
            .create(Subscription {
                id: Uuid::new_v4(),
                user_id: user.id,
                plan_id: Some(plan.id),
                stripe_customer_id: user.stripe_customer_id.clone(),
                stripe_subscription_id: format!("manual_{}", Uuid::new_v4().simple()),
                status: SubscriptionStatus::Active,
                current_period_start: now,
                current_period_end: period_end,
                cancel_at_period_end: false,
                cancelled_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(subscription_id = %subscription.id, user_id = %user.id, months = request.months, "Subscription granted");
        self.audit(
            admin.id,
            "grant_subscription",
            "subscription",
            subscription.id.to_string(),
            json!({
                "user_id": user.id,
                "plan_id": plan.id,
                "months": request.months,
            }),
        )
        .await;

        Ok(subscription)
    }

    // Payments

    pub async fn payments_for(&self, user_id: Uuid) -> Result<Vec<Payment>> {
        self.payment_repo.find_by_user(user_id).await
    }

    pub async fn list_payments(&self, limit: i64, offset: i64) -> Result<Vec<Payment>> {
        self.payment_repo.list(limit, offset).await
    }

    pub async fn record_manual_payment(&self, admin: &User, request: ManualPaymentRequest) -> Result<Payment> {
        request.validate()?;

        if self.user_repo.find_by_id(request.user_id).await?.is_none() {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let now = self.clock.now();
        let payment = self.payment_repo
            .create(Payment {
                id: Uuid::new_v4(),
                user_id: request.user_id,
                amount_cents: request.amount_cents,
                currency: request.currency.to_lowercase(),
                status: PaymentStatus::Paid,
                payment_method: PaymentMethod::Manual,
                stripe_payment_intent_id: None,
                stripe_invoice_id: None,
                subscription_id: None,
                description: request.description,
                refunded_at: None,
                refund_reason: None,
                reconciled: false,
                reconciled_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.audit(
            admin.id,
            "manual_payment",
            "payment",
            payment.id.to_string(),
            json!({
                "user_id": payment.user_id,
                "amount_cents": payment.amount_cents,
                "currency": payment.currency,
            }),
        )
        .await;

        Ok(payment)
    }

    /// Opens a one-off payment at the provider and records it as pending.
    /// The `payment_intent.succeeded` webhook settles it.
    pub async fn create_payment_intent(
        &self,
        user: &User,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentIntentCreated> {
        request.validate()?;

        let currency = request.currency.as_deref().unwrap_or("usd").to_lowercase();
        let description = request.description.unwrap_or_else(|| "One-time payment".to_string());

        let intent = self.gateway
            .create_payment_intent(PaymentIntentRequest {
                user_id: user.id,
                amount_cents: request.amount_cents,
                currency: currency.clone(),
                customer_id: user.stripe_customer_id.clone(),
                description: description.clone(),
            })
            .await?;

        let mut payment = Payment::paid_via_stripe(user.id, request.amount_cents, currency, description, self.clock.now());
        payment.status = PaymentStatus::Pending;
        payment.stripe_payment_intent_id = Some(intent.id);

        let payment = self.payment_repo.create(payment).await?;
        tracing::info!(payment_id = %payment.id, user_id = %user.id, "Pending payment recorded");

        Ok(PaymentIntentCreated {
            payment,
            client_secret: intent.client_secret,
        })
    }

    /// Settles a pending or failed payment that was paid outside the provider.
    pub async fn mark_payment_paid(&self, admin: &User, payment_id: Uuid, request: MarkPaidRequest) -> Result<Payment> {
        request.validate()?;

        let payment = self.payment_repo.find_by_id(payment_id).await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if !self.payment_repo
            .settle(payment.id, PaymentMethod::Manual, request.description.clone(), self.clock.now())
            .await?
        {
            return Err(AppError::InvalidState(format!(
                "Cannot mark a payment that is {} as paid",
                payment.status.as_str()
            )));
        }

        let paid = self.payment_repo.find_by_id(payment.id).await?
            .ok_or_else(|| AppError::Database("Failed to retrieve payment".to_string()))?;

        tracing::info!(payment_id = %paid.id, "Payment marked as paid");
        self.audit(
            admin.id,
            "mark_payment_paid",
            "payment",
            paid.id.to_string(),
            json!({
                "amount_cents": paid.amount_cents,
                "previous_status": payment.status.as_str(),
                "description": request.description,
            }),
        )
        .await;

        Ok(paid)
    }

    /// Refunds at the provider synchronously, then records it locally. A
    /// provider failure leaves the payment untouched.
    pub async fn refund_payment(&self, admin: &User, payment_id: Uuid, reason: Option<String>) -> Result<Payment> {
        let payment = self.payment_repo.find_by_id(payment_id).await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if payment.status != PaymentStatus::Paid {
            return Err(AppError::InvalidState(format!(
                "Cannot refund a payment that is {}",
                payment.status.as_str()
            )));
        }

        if payment.payment_method == PaymentMethod::Stripe {
            let intent_id = payment.stripe_payment_intent_id.as_deref().ok_or_else(|| {
                AppError::InvalidState("Payment has no provider reference to refund".to_string())
            })?;
            self.gateway.refund_payment(intent_id).await?;
        }

        let refunded = match self.payment_repo
            .mark_refunded(payment.id, reason.clone(), self.clock.now())
            .await
        {
            Ok(refunded) => {
                self.notifications
                    .notify(
                        refunded.user_id,
                        kinds::PAYMENT_REFUNDED,
                        "Payment Refunded",
                        format!(
                            "Your payment of {} has been refunded.",
                            format_amount(refunded.amount_cents, &refunded.currency)
                        ),
                    )
                    .await;
                refunded
            }
            // The provider's refund webhook got there first
            Err(AppError::InvalidState(_)) => {
                let current = self.payment_repo.find_by_id(payment.id).await?
                    .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;
                if current.status != PaymentStatus::Refunded {
                    return Err(AppError::InvalidState(format!(
                        "Payment became {} during the refund",
                        current.status.as_str()
                    )));
                }
                current
            }
            Err(e) => return Err(e),
        };

        tracing::info!(payment_id = %refunded.id, "Payment refunded");
        self.audit(
            admin.id,
            "refund_payment",
            "payment",
            refunded.id.to_string(),
            json!({
                "amount_cents": refunded.amount_cents,
                "reason": reason,
            }),
        )
        .await;

        Ok(refunded)
    }

    pub async fn audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        self.audit_repo.list_recent(limit).await
    }

    async fn audit(&self, actor: Uuid, action: &str, resource: &str, resource_id: String, details: serde_json::Value) {
        let entry = AuditEntry::new(Some(actor), action, resource, Some(resource_id), details, self.clock.now());
        if let Err(e) = self.audit_repo.record(entry).await {
            tracing::error!(action, "Failed to write audit entry: {}", e);
        }
    }
}

/// Subscriptions granted by an admin have no provider counterpart.
pub fn is_manual_grant(stripe_subscription_id: &str) -> bool {
    stripe_subscription_id.starts_with("manual_")
}
