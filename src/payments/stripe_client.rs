use async_trait::async_trait;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreatePaymentIntent, CreatePaymentIntentAutomaticPaymentMethods,
    CreateRefund, Currency, CustomerId, PaymentIntent, PaymentIntentId, Refund, Subscription,
    SubscriptionId, UpdateSubscription, Webhook, WebhookError,
};

use crate::{
    error::{AppError, Result},
    payments::{
        events::BillingEvent,
        gateway::{BillingGateway, CheckoutRequest, CreatedPaymentIntent, PaymentIntentRequest},
    },
};

pub struct StripeClient {
    client: Client,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(api_key: String, webhook_secret: String) -> Self {
        let client = Client::new(api_key);
        Self {
            client,
            webhook_secret,
        }
    }

    /// Verifies the signature against the raw body and maps the event into
    /// a `BillingEvent`. Nothing is touched when verification fails.
    pub fn verify_webhook(&self, payload: &str, stripe_signature: &str) -> Result<BillingEvent> {
        let event = Webhook::construct_event(payload, stripe_signature, &self.webhook_secret)
            .map_err(|e| match e {
                WebhookError::BadSignature => AppError::BadRequest("Invalid signature".to_string()),
                _ => AppError::BadRequest(format!("Webhook error: {}", e)),
            })?;

        Ok(BillingEvent::from_stripe(event))
    }
}

fn stripe_error(e: stripe::StripeError) -> AppError {
    AppError::External(format!("Stripe error: {}", e))
}

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| AppError::BadRequest(format!("Invalid {} id: {}", what, raw)))
}

#[async_trait]
impl BillingGateway for StripeClient {
    async fn retrieve_payment_amount(&self, payment_intent_id: &str) -> Result<i64> {
        let id: PaymentIntentId = parse_id(payment_intent_id, "payment intent")?;
        let intent = PaymentIntent::retrieve(&self.client, &id, &[])
            .await
            .map_err(stripe_error)?;

        Ok(intent.amount)
    }

    async fn refund_payment(&self, payment_intent_id: &str) -> Result<()> {
        let id: PaymentIntentId = parse_id(payment_intent_id, "payment intent")?;

        let mut params = CreateRefund::new();
        params.payment_intent = Some(id);

        let refund = Refund::create(&self.client, params)
            .await
            .map_err(stripe_error)?;

        tracing::info!(refund_id = %refund.id, payment_intent = payment_intent_id, "Refund created");
        Ok(())
    }

    async fn create_subscription_checkout(&self, request: CheckoutRequest) -> Result<String> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        // Reuse the provider customer when we already know it
        match &request.customer_id {
            Some(customer_id) => {
                params.customer = Some(parse_id::<CustomerId>(customer_id, "customer")?);
            }
            None => {
                params.customer_email = Some(&request.customer_email);
            }
        }

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), request.user_id.to_string());
        metadata.insert("plan_id".to_string(), request.plan_id.to_string());
        params.metadata = Some(metadata);
        let user_id_str = request.user_id.to_string();
        params.client_reference_id = Some(&user_id_str);

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(stripe_error)?;

        session.url
            .ok_or_else(|| AppError::External("No checkout URL returned".to_string()))
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<()> {
        let id: SubscriptionId = parse_id(subscription_id, "subscription")?;

        let mut params = UpdateSubscription::new();
        params.cancel_at_period_end = Some(true);

        Subscription::update(&self.client, &id, params)
            .await
            .map_err(stripe_error)?;

        Ok(())
    }

    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<CreatedPaymentIntent> {
        let currency: Currency = request.currency.parse()
            .map_err(|_| AppError::BadRequest(format!("Unsupported currency: {}", request.currency)))?;

        let mut params = CreatePaymentIntent::new(request.amount_cents, currency);
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            ..Default::default()
        });
        params.description = Some(&request.description);
        if let Some(customer_id) = &request.customer_id {
            params.customer = Some(parse_id::<CustomerId>(customer_id, "customer")?);
        }

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), request.user_id.to_string());
        params.metadata = Some(metadata);

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(stripe_error)?;

        let client_secret = intent.client_secret
            .ok_or_else(|| AppError::External("No client secret returned".to_string()))?;

        tracing::info!(payment_intent = %intent.id, user_id = %request.user_id, "Payment intent created");
        Ok(CreatedPaymentIntent {
            id: intent.id.to_string(),
            client_secret,
        })
    }
}
