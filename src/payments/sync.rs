use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    clock::Clock,
    domain::{Payment, PaymentMethod, PaymentStatus, ProviderSubscription, Subscription, SubscriptionStatus, UpdateUserRequest},
    error::{AppError, Result},
    notifications::{kinds, NotificationCenter},
    payments::{
        event_cache::EventCache,
        events::{BillingEvent, BillingEventKind},
    },
    repository::{
        PaymentRepository, PlanRepository, SubscriptionRepository, UserRepository,
        WebhookEventRepository,
    },
};

/// Acknowledgement returned to the provider for every verified event.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl WebhookAck {
    fn processed() -> Self {
        Self { received: true, skipped: false }
    }

    fn skipped() -> Self {
        Self { received: true, skipped: true }
    }
}

/// Applies provider events to local subscription and payment state.
///
/// Every event is acknowledged. Handler errors are logged and left for the
/// reconciliation sweep, so the provider never retries because of us.
pub struct SubscriptionSync {
    subscription_repo: Arc<dyn SubscriptionRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    user_repo: Arc<dyn UserRepository>,
    plan_repo: Arc<dyn PlanRepository>,
    webhook_repo: Arc<dyn WebhookEventRepository>,
    notifications: Arc<NotificationCenter>,
    clock: Arc<dyn Clock>,
    recent: Mutex<EventCache>,
}

impl SubscriptionSync {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        user_repo: Arc<dyn UserRepository>,
        plan_repo: Arc<dyn PlanRepository>,
        webhook_repo: Arc<dyn WebhookEventRepository>,
        notifications: Arc<NotificationCenter>,
        clock: Arc<dyn Clock>,
        cache_size: usize,
    ) -> Self {
        Self {
            subscription_repo,
            payment_repo,
            user_repo,
            plan_repo,
            webhook_repo,
            notifications,
            clock,
            recent: Mutex::new(EventCache::new(cache_size)),
        }
    }

    /// Claims the event id before running its handler, so concurrent
    /// deliveries of one event run the handler once.
    pub async fn handle_event(&self, event: BillingEvent) -> WebhookAck {
        if !self.claim(&event).await {
            tracing::info!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook event skipped");
            return WebhookAck::skipped();
        }

        match self.dispatch(&event).await {
            Ok(()) => {
                self.recent.lock().await.insert(&event.id);
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Webhook handler failed: {}",
                    e
                );
                // A later redelivery gets another attempt
                if let Err(e) = self.webhook_repo.release(&event.id).await {
                    tracing::error!(event_id = %event.id, "Failed to release webhook event: {}", e);
                }
            }
        }

        WebhookAck::processed()
    }

    async fn claim(&self, event: &BillingEvent) -> bool {
        if self.recent.lock().await.contains(&event.id) {
            return false;
        }

        match self
            .webhook_repo
            .claim(&event.id, &event.event_type, self.clock.now())
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                self.recent.lock().await.insert(&event.id);
                false
            }
            Err(e) => {
                tracing::warn!(event_id = %event.id, "Could not claim webhook event: {}", e);
                true
            }
        }
    }

    async fn dispatch(&self, event: &BillingEvent) -> Result<()> {
        match &event.kind {
            BillingEventKind::InvoicePaymentSucceeded {
                invoice_id,
                subscription_id,
                payment_intent_id,
                amount_cents,
                currency,
            } => {
                self.invoice_paid(
                    invoice_id,
                    subscription_id.as_deref(),
                    payment_intent_id.as_deref(),
                    *amount_cents,
                    currency,
                )
                .await
            }
            BillingEventKind::InvoicePaymentFailed { invoice_id, subscription_id } => {
                self.invoice_failed(invoice_id, subscription_id.as_deref()).await
            }
            BillingEventKind::SubscriptionDeleted { subscription_id } => {
                self.subscription_deleted(subscription_id).await
            }
            BillingEventKind::SubscriptionUpdated(state) => self.subscription_updated(state).await,
            BillingEventKind::PaymentIntentSucceeded {
                payment_intent_id,
                customer_id,
                amount_cents,
                currency,
                description,
            } => {
                self.one_off_payment(
                    payment_intent_id,
                    customer_id.as_deref(),
                    *amount_cents,
                    currency,
                    description.as_deref(),
                )
                .await
            }
            BillingEventKind::PaymentIntentFailed { payment_intent_id } => {
                self.payment_intent_failed(payment_intent_id).await
            }
            BillingEventKind::ChargeRefunded { charge_id, payment_intent_id } => {
                self.charge_refunded(charge_id, payment_intent_id.as_deref()).await
            }
            BillingEventKind::CheckoutCompleted {
                subscription_id,
                customer_id,
                user_id,
                plan_id,
            } => {
                self.checkout_completed(
                    subscription_id.as_deref(),
                    customer_id.as_deref(),
                    user_id.as_deref(),
                    plan_id.as_deref(),
                )
                .await
            }
            BillingEventKind::Unhandled => {
                tracing::debug!(event_type = %event.event_type, "Unhandled webhook event type");
                Ok(())
            }
        }
    }

    async fn local_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        let found = self.subscription_repo.find_by_stripe_id(subscription_id).await?;
        if found.is_none() {
            tracing::warn!(subscription_id, "No local subscription for provider subscription");
        }
        Ok(found)
    }

    async fn invoice_paid(
        &self,
        invoice_id: &str,
        subscription_id: Option<&str>,
        payment_intent_id: Option<&str>,
        amount_cents: i64,
        currency: &str,
    ) -> Result<()> {
        let Some(subscription_id) = subscription_id else {
            tracing::debug!(invoice_id, "Invoice is not tied to a subscription");
            return Ok(());
        };
        let Some(subscription) = self.local_subscription(subscription_id).await? else {
            return Ok(());
        };

        let now = self.clock.now();
        self.subscription_repo
            .set_status(subscription.id, SubscriptionStatus::Active, now)
            .await?;

        if self.payment_repo.find_by_invoice_id(invoice_id).await?.is_some() {
            tracing::info!(invoice_id, "Invoice payment already recorded");
            return Ok(());
        }

        // The payment intent may have been recorded first as a one-off payment
        if let Some(intent_id) = payment_intent_id {
            if let Some(existing) = self.payment_repo.find_by_payment_intent_id(intent_id).await? {
                self.payment_repo
                    .link_invoice(existing.id, invoice_id, subscription.id, now)
                    .await?;
                return Ok(());
            }
        }

        let description = match subscription.plan_id {
            Some(plan_id) => match self.plan_repo.find_by_id(plan_id).await? {
                Some(plan) => format!("Subscription payment for {}", plan.name),
                None => "Subscription payment".to_string(),
            },
            None => "Subscription payment".to_string(),
        };

        let mut payment = Payment::paid_via_stripe(
            subscription.user_id,
            amount_cents,
            currency,
            description,
            now,
        );
        payment.stripe_invoice_id = Some(invoice_id.to_string());
        payment.stripe_payment_intent_id = payment_intent_id.map(str::to_string);
        payment.subscription_id = Some(subscription.id);

        match self.payment_repo.create(payment).await {
            Ok(payment) => {
                tracing::info!(payment_id = %payment.id, invoice_id, "Subscription payment recorded");
                self.notifications
                    .notify(
                        subscription.user_id,
                        kinds::PAYMENT_SUCCEEDED,
                        "Payment Successful",
                        format!("Your payment of {} was successful.", format_amount(amount_cents, currency)),
                    )
                    .await;
                Ok(())
            }
            Err(AppError::Conflict(_)) => {
                tracing::info!(invoice_id, "Invoice payment recorded concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn invoice_failed(&self, invoice_id: &str, subscription_id: Option<&str>) -> Result<()> {
        let Some(subscription_id) = subscription_id else {
            tracing::debug!(invoice_id, "Invoice is not tied to a subscription");
            return Ok(());
        };
        let Some(subscription) = self.local_subscription(subscription_id).await? else {
            return Ok(());
        };

        self.subscription_repo
            .set_status(subscription.id, SubscriptionStatus::PastDue, self.clock.now())
            .await?;

        self.notifications
            .notify(
                subscription.user_id,
                kinds::PAYMENT_FAILED,
                "Payment Failed",
                "Your subscription payment failed. Please update your payment method.",
            )
            .await;

        Ok(())
    }

    async fn subscription_deleted(&self, subscription_id: &str) -> Result<()> {
        let Some(subscription) = self.local_subscription(subscription_id).await? else {
            return Ok(());
        };

        self.subscription_repo
            .mark_cancelled(subscription.id, self.clock.now())
            .await?;

        self.notifications
            .notify(
                subscription.user_id,
                kinds::SUBSCRIPTION_CANCELLED,
                "Subscription Cancelled",
                "Your subscription has been cancelled.",
            )
            .await;

        Ok(())
    }

    async fn subscription_updated(&self, state: &ProviderSubscription) -> Result<()> {
        let Some(subscription) = self.local_subscription(&state.subscription_id).await? else {
            return Ok(());
        };

        self.subscription_repo
            .apply_provider_state(subscription.id, state, self.clock.now())
            .await
    }

    async fn one_off_payment(
        &self,
        payment_intent_id: &str,
        customer_id: Option<&str>,
        amount_cents: i64,
        currency: &str,
        description: Option<&str>,
    ) -> Result<()> {
        if let Some(existing) = self.payment_repo.find_by_payment_intent_id(payment_intent_id).await? {
            // Intents created through the app are recorded as pending up front
            if self.payment_repo
                .settle(existing.id, PaymentMethod::Stripe, None, self.clock.now())
                .await?
            {
                tracing::info!(payment_id = %existing.id, payment_intent_id, "Pending payment settled");
                self.notifications
                    .notify(
                        existing.user_id,
                        kinds::PAYMENT_SUCCEEDED,
                        "Payment Successful",
                        format!(
                            "Your payment of {} was successful.",
                            format_amount(existing.amount_cents, &existing.currency)
                        ),
                    )
                    .await;
            } else {
                tracing::info!(payment_intent_id, "Payment already recorded");
            }
            return Ok(());
        }

        let Some(customer_id) = customer_id else {
            tracing::warn!(payment_intent_id, "Payment intent has no customer");
            return Ok(());
        };
        let Some(user) = self.user_repo.find_by_stripe_customer_id(customer_id).await? else {
            tracing::warn!(payment_intent_id, customer_id, "No user for provider customer");
            return Ok(());
        };

        let mut payment = Payment::paid_via_stripe(
            user.id,
            amount_cents,
            currency,
            description.unwrap_or("One-time payment"),
            self.clock.now(),
        );
        payment.stripe_payment_intent_id = Some(payment_intent_id.to_string());

        match self.payment_repo.create(payment).await {
            Ok(payment) => {
                tracing::info!(payment_id = %payment.id, payment_intent_id, "Payment recorded");
                Ok(())
            }
            Err(AppError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn payment_intent_failed(&self, payment_intent_id: &str) -> Result<()> {
        let Some(payment) = self.payment_repo.find_by_payment_intent_id(payment_intent_id).await? else {
            tracing::debug!(payment_intent_id, "Failed intent has no local payment");
            return Ok(());
        };

        if !self.payment_repo.mark_failed(payment.id, self.clock.now()).await? {
            tracing::info!(payment_id = %payment.id, status = payment.status.as_str(), "Payment not pending, skipping");
            return Ok(());
        }

        self.notifications
            .notify(
                payment.user_id,
                kinds::PAYMENT_FAILED,
                "Payment Failed",
                format!(
                    "Your payment of {} did not go through.",
                    format_amount(payment.amount_cents, &payment.currency)
                ),
            )
            .await;

        Ok(())
    }

    async fn charge_refunded(&self, charge_id: &str, payment_intent_id: Option<&str>) -> Result<()> {
        let Some(intent_id) = payment_intent_id else {
            tracing::warn!(charge_id, "Refunded charge has no payment intent");
            return Ok(());
        };
        let Some(payment) = self.payment_repo.find_by_payment_intent_id(intent_id).await? else {
            tracing::warn!(charge_id, "Payment not found for refunded charge");
            return Ok(());
        };

        if payment.status != PaymentStatus::Paid {
            tracing::info!(payment_id = %payment.id, status = payment.status.as_str(), "Payment not refundable, skipping");
            return Ok(());
        }

        let refunded = self.payment_repo
            .mark_refunded(payment.id, Some("Refunded via provider".to_string()), self.clock.now())
            .await?;

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

        Ok(())
    }

    async fn checkout_completed(
        &self,
        subscription_id: Option<&str>,
        customer_id: Option<&str>,
        user_id: Option<&str>,
        plan_id: Option<&str>,
    ) -> Result<()> {
        let Some(subscription_id) = subscription_id else {
            tracing::warn!("Subscription checkout completed without a subscription");
            return Ok(());
        };

        if self.subscription_repo.find_by_stripe_id(subscription_id).await?.is_some() {
            return Ok(());
        }

        let Some(user_id) = user_id.and_then(|id| Uuid::parse_str(id).ok()) else {
            tracing::warn!(subscription_id, "Checkout carried no usable user id");
            return Ok(());
        };
        let Some(user) = self.user_repo.find_by_id(user_id).await? else {
            tracing::warn!(%user_id, "Checkout completed for unknown user");
            return Ok(());
        };

        if let (Some(customer_id), None) = (customer_id, &user.stripe_customer_id) {
            let update = UpdateUserRequest {
                stripe_customer_id: Some(customer_id.to_string()),
                ..Default::default()
            };
            self.user_repo.update(user.id, update).await?;
        }

        let now = self.clock.now();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: user.id,
            plan_id: plan_id.and_then(|id| Uuid::parse_str(id).ok()),
            stripe_customer_id: customer_id.map(str::to_string),
            stripe_subscription_id: subscription_id.to_string(),
            status: SubscriptionStatus::Incomplete,
            current_period_start: now,
            current_period_end: now,
            cancel_at_period_end: false,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        match self.subscription_repo.create(subscription).await {
            Ok(created) => {
                tracing::info!(subscription_id = %created.id, user_id = %user.id, "Subscription created from checkout");
                Ok(())
            }
            Err(AppError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

pub fn format_amount(amount_cents: i64, currency: &str) -> String {
    let symbol = match currency.to_lowercase().as_str() {
        "usd" => "$",
        "eur" => "€",
        "gbp" => "£",
        _ => "",
    };
    let amount = format!("{}.{:02}", amount_cents / 100, (amount_cents % 100).abs());

    if symbol.is_empty() {
        format!("{} {}", amount, currency.to_uppercase())
    } else {
        format!("{}{}", symbol, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_render_with_currency() {
        assert_eq!(format_amount(4999, "usd"), "$49.99");
        assert_eq!(format_amount(500, "EUR"), "€5.00");
        assert_eq!(format_amount(1234, "inr"), "12.34 INR");
    }

    #[test]
    fn skipped_flag_only_serialized_when_set() {
        let processed = serde_json::to_value(WebhookAck::processed()).unwrap();
        assert_eq!(processed, serde_json::json!({"received": true}));

        let skipped = serde_json::to_value(WebhookAck::skipped()).unwrap();
        assert_eq!(skipped, serde_json::json!({"received": true, "skipped": true}));
    }
}
