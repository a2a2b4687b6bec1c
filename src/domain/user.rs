use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
    pub stripe_customer_id: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a user is allowed to do, with the fields that only make sense for
/// that capability set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Role {
    Admin,
    Trainer(TrainerProfile),
    Member(MemberProfile),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrainerProfile {
    pub specialization: Option<String>,
    pub experience_years: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemberProfile {
    pub fitness_goals: Option<String>,
    pub health_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoleKind {
    Admin,
    Trainer,
    Member,
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Admin => RoleKind::Admin,
            Role::Trainer(_) => RoleKind::Trainer,
            Role::Member(_) => RoleKind::Member,
        }
    }
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Admin => "Admin",
            RoleKind::Trainer => "Trainer",
            RoleKind::Member => "Member",
        }
    }
}

impl FromStr for RoleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(RoleKind::Admin),
            "Trainer" => Ok(RoleKind::Trainer),
            "Member" => Ok(RoleKind::Member),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl User {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    pub fn is_trainer(&self) -> bool {
        matches!(self.role, Role::Trainer(_))
    }

    pub fn is_member(&self) -> bool {
        matches!(self.role, Role::Member(_))
    }

    /// Admins and trainers can book without holding a subscription.
    pub fn bypasses_subscription_gate(&self) -> bool {
        !self.is_member()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub stripe_customer_id: Option<String>,
    pub trainer_profile: Option<TrainerProfile>,
    pub member_profile: Option<MemberProfile>,
}
