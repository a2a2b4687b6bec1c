use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: i64,
    pub location: Option<String>,
    pub status: ClassStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClassStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl ClassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassStatus::Scheduled => "Scheduled",
            ClassStatus::Completed => "Completed",
            ClassStatus::Cancelled => "Cancelled",
        }
    }
}

impl FromStr for ClassStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(ClassStatus::Scheduled),
            "Completed" => Ok(ClassStatus::Completed),
            "Cancelled" => Ok(ClassStatus::Cancelled),
            _ => Err(format!("Invalid class status: {}", s)),
        }
    }
}

impl ClassSession {
    pub fn is_scheduled(&self) -> bool {
        self.status == ClassStatus::Scheduled
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.trainer_id == user_id
    }
}

/// Attendee and waitlist membership of one session, both in FIFO order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassRoster {
    pub attendees: Vec<Uuid>,
    pub waitlist: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    #[serde(flatten)]
    pub session: ClassSession,
    pub attendee_count: i64,
    pub waitlist_count: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_class_times"))]
pub struct CreateClassRequest {
    /// Only honoured for admins; trainers always own the classes they create.
    pub trainer_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(range(min = 1, max = 500))]
    pub capacity: i64,
    pub location: Option<String>,
}

fn validate_class_times(req: &CreateClassRequest) -> Result<(), ValidationError> {
    if req.end_time <= req.start_time {
        return Err(ValidationError::new("end_time_before_start_time"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateClassRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 500))]
    pub capacity: Option<i64>,
    pub location: Option<String>,
}
