use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Cancelled,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "Active",
            SubscriptionStatus::Trialing => "Trialing",
            SubscriptionStatus::PastDue => "PastDue",
            SubscriptionStatus::Cancelled => "Cancelled",
            SubscriptionStatus::Incomplete => "Incomplete",
        }
    }

    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(SubscriptionStatus::Active),
            "Trialing" => Ok(SubscriptionStatus::Trialing),
            "PastDue" => Ok(SubscriptionStatus::PastDue),
            "Cancelled" => Ok(SubscriptionStatus::Cancelled),
            "Incomplete" => Ok(SubscriptionStatus::Incomplete),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

impl Subscription {
    /// The subscription that gates bookings: a granting status and a period
    /// that has not ended yet.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status.grants_access() && self.current_period_end >= now
    }
}

/// The provider's view of a subscription, applied verbatim on update events.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSubscription {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GrantSubscriptionRequest {
    pub plan_id: Uuid,
    #[validate(range(min = 1, max = 36))]
    pub months: u32,
}
