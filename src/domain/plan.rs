use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub stripe_price_id: String,
    pub stripe_product_id: Option<String>,
    pub features: Vec<String>,
    /// 0 means unlimited.
    pub classes_per_month: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "Month",
            BillingInterval::Year => "Year",
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            BillingInterval::Month => 1,
            BillingInterval::Year => 12,
        }
    }
}

impl FromStr for BillingInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Month" => Ok(BillingInterval::Month),
            "Year" => Ok(BillingInterval::Year),
            _ => Err(format!("Invalid billing interval: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePlanRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: String,
    #[validate(range(min = 0))]
    pub price_cents: i64,
    #[validate(length(equal = 3))]
    pub currency: String,
    pub interval: BillingInterval,
    #[validate(length(min = 1))]
    pub stripe_price_id: String,
    pub stripe_product_id: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub classes_per_month: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub features: Option<Vec<String>>,
    pub classes_per_month: Option<i64>,
    pub is_active: Option<bool>,
}
