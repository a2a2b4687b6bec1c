use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_invoice_id: Option<String>,
    pub subscription_id: Option<Uuid>,
    pub description: String,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub reconciled: bool,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Paid" => Ok(PaymentStatus::Paid),
            "Failed" => Ok(PaymentStatus::Failed),
            "Refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethod {
    Stripe,
    Manual,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "Stripe",
            PaymentMethod::Manual => "Manual",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Stripe" => Ok(PaymentMethod::Stripe),
            "Manual" => Ok(PaymentMethod::Manual),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

impl Payment {
    pub fn paid_via_stripe(
        user_id: Uuid,
        amount_cents: i64,
        currency: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount_cents,
            currency: currency.into(),
            status: PaymentStatus::Paid,
            payment_method: PaymentMethod::Stripe,
            stripe_payment_intent_id: None,
            stripe_invoice_id: None,
            subscription_id: None,
            description: description.into(),
            refunded_at: None,
            refund_reason: None,
            reconciled: false,
            reconciled_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ManualPaymentRequest {
    pub user_id: Uuid,
    #[validate(range(min = 1))]
    pub amount_cents: i64,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(min = 1, max = 255))]
    pub description: String,
}

/// A one-off charge the member completes client-side with the returned secret.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentIntentRequest {
    #[validate(range(min = 50))]
    pub amount_cents: i64,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentCreated {
    pub payment: Payment,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MarkPaidRequest {
    #[validate(length(min = 1, max = 255))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    pub reason: Option<String>,
}
