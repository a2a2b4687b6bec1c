use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub price_id: String,
    pub customer_email: String,
    pub customer_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct PaymentIntentRequest {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_id: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CreatedPaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Synchronous calls into the billing provider. Failures come back as
/// `AppError::External` and are surfaced to the caller.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// The amount the provider recorded for a payment intent, in cents.
    async fn retrieve_payment_amount(&self, payment_intent_id: &str) -> Result<i64>;
    async fn refund_payment(&self, payment_intent_id: &str) -> Result<()>;
    /// Returns the hosted checkout URL.
    async fn create_subscription_checkout(&self, request: CheckoutRequest) -> Result<String>;
    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<()>;
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<CreatedPaymentIntent>;
}

/// Stand-in used when no provider is configured.
pub struct DisabledGateway;

fn disabled<T>() -> Result<T> {
    Err(AppError::ServiceUnavailable(
        "Payment processing is not configured".to_string(),
    ))
}

#[async_trait]
impl BillingGateway for DisabledGateway {
    async fn retrieve_payment_amount(&self, _payment_intent_id: &str) -> Result<i64> {
        disabled()
    }

    async fn refund_payment(&self, _payment_intent_id: &str) -> Result<()> {
        disabled()
    }

    async fn create_subscription_checkout(&self, _request: CheckoutRequest) -> Result<String> {
        disabled()
    }

    async fn cancel_at_period_end(&self, _subscription_id: &str) -> Result<()> {
        disabled()
    }

    async fn create_payment_intent(&self, _request: PaymentIntentRequest) -> Result<CreatedPaymentIntent> {
        disabled()
    }
}
