use chrono::{DateTime, Utc};
use stripe::{CheckoutSessionMode, Event, EventObject, EventType};

use crate::domain::{ProviderSubscription, SubscriptionStatus};

/// A verified provider event, reduced to the fields the sync reads.
#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub id: String,
    pub event_type: String,
    pub kind: BillingEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BillingEventKind {
    InvoicePaymentSucceeded {
        invoice_id: String,
        subscription_id: Option<String>,
        payment_intent_id: Option<String>,
        amount_cents: i64,
        currency: String,
    },
    InvoicePaymentFailed {
        invoice_id: String,
        subscription_id: Option<String>,
    },
    SubscriptionDeleted {
        subscription_id: String,
    },
    SubscriptionUpdated(ProviderSubscription),
    PaymentIntentSucceeded {
        payment_intent_id: String,
        customer_id: Option<String>,
        amount_cents: i64,
        currency: String,
        description: Option<String>,
    },
    PaymentIntentFailed {
        payment_intent_id: String,
    },
    ChargeRefunded {
        charge_id: String,
        payment_intent_id: Option<String>,
    },
    /// A subscription-mode checkout finished.
    CheckoutCompleted {
        subscription_id: Option<String>,
        customer_id: Option<String>,
        user_id: Option<String>,
        plan_id: Option<String>,
    },
    Unhandled,
}

impl BillingEvent {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, kind: BillingEventKind) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            kind,
        }
    }

    pub fn from_stripe(event: Event) -> Self {
        let id = event.id.to_string();
        let event_type = event.type_.to_string();

        let kind = match (event.type_, event.data.object) {
            (EventType::InvoicePaymentSucceeded, EventObject::Invoice(invoice)) => {
                BillingEventKind::InvoicePaymentSucceeded {
                    invoice_id: invoice.id.to_string(),
                    subscription_id: invoice.subscription.as_ref().map(|s| s.id().to_string()),
                    payment_intent_id: invoice.payment_intent.as_ref().map(|p| p.id().to_string()),
                    amount_cents: invoice.amount_paid.unwrap_or(0),
                    currency: invoice
                        .currency
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "usd".to_string()),
                }
            }
            (EventType::InvoicePaymentFailed, EventObject::Invoice(invoice)) => {
                BillingEventKind::InvoicePaymentFailed {
                    invoice_id: invoice.id.to_string(),
                    subscription_id: invoice.subscription.as_ref().map(|s| s.id().to_string()),
                }
            }
            (EventType::CustomerSubscriptionDeleted, EventObject::Subscription(subscription)) => {
                BillingEventKind::SubscriptionDeleted {
                    subscription_id: subscription.id.to_string(),
                }
            }
            (EventType::CustomerSubscriptionUpdated, EventObject::Subscription(subscription)) => {
                BillingEventKind::SubscriptionUpdated(ProviderSubscription {
                    subscription_id: subscription.id.to_string(),
                    status: map_subscription_status(subscription.status),
                    current_period_start: timestamp(subscription.current_period_start),
                    current_period_end: timestamp(subscription.current_period_end),
                    cancel_at_period_end: subscription.cancel_at_period_end,
                })
            }
            (EventType::PaymentIntentSucceeded, EventObject::PaymentIntent(intent)) => {
                BillingEventKind::PaymentIntentSucceeded {
                    payment_intent_id: intent.id.to_string(),
                    customer_id: intent.customer.as_ref().map(|c| c.id().to_string()),
                    amount_cents: intent.amount,
                    currency: intent.currency.to_string(),
                    description: intent.description.clone(),
                }
            }
            (EventType::PaymentIntentPaymentFailed, EventObject::PaymentIntent(intent)) => {
                BillingEventKind::PaymentIntentFailed {
                    payment_intent_id: intent.id.to_string(),
                }
            }
            (EventType::ChargeRefunded, EventObject::Charge(charge)) => {
                BillingEventKind::ChargeRefunded {
                    charge_id: charge.id.to_string(),
                    payment_intent_id: charge.payment_intent.as_ref().map(|p| p.id().to_string()),
                }
            }
            (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session))
                if session.mode == CheckoutSessionMode::Subscription =>
            {
                let metadata = session.metadata.unwrap_or_default();
                BillingEventKind::CheckoutCompleted {
                    subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
                    customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
                    user_id: metadata
                        .get("user_id")
                        .cloned()
                        .or(session.client_reference_id),
                    plan_id: metadata.get("plan_id").cloned(),
                }
            }
            _ => BillingEventKind::Unhandled,
        };

        Self { id, event_type, kind }
    }
}

/// Provider statuses collapse onto the local set; anything that no longer
/// bills counts as cancelled.
pub fn map_subscription_status(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
    use stripe::SubscriptionStatus as Provider;

    match status {
        Provider::Active => SubscriptionStatus::Active,
        Provider::Trialing => SubscriptionStatus::Trialing,
        Provider::PastDue | Provider::Unpaid | Provider::Paused => SubscriptionStatus::PastDue,
        Provider::Canceled | Provider::IncompleteExpired => SubscriptionStatus::Cancelled,
        Provider::Incomplete => SubscriptionStatus::Incomplete,
    }
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}
