use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub member_id: Uuid,
    pub class_id: Uuid,
    pub status: BookingStatus,
    pub booked_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub qr_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `Booked` is the only non-terminal state apart from `CheckedIn`, which
/// can still move to `Completed` when the session completes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingStatus {
    Booked,
    CheckedIn,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "Booked",
            BookingStatus::CheckedIn => "CheckedIn",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::NoShow => "NoShow",
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Booked, CheckedIn) | (Booked, Cancelled) | (Booked, NoShow) | (Booked, Completed)
                | (CheckedIn, Completed)
        )
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Booked" => Ok(BookingStatus::Booked),
            "CheckedIn" => Ok(BookingStatus::CheckedIn),
            "Completed" => Ok(BookingStatus::Completed),
            "Cancelled" => Ok(BookingStatus::Cancelled),
            "NoShow" => Ok(BookingStatus::NoShow),
            _ => Err(format!("Invalid booking status: {}", s)),
        }
    }
}

impl Booking {
    pub fn new(member_id: Uuid, class_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id,
            class_id,
            status: BookingStatus::Booked,
            booked_at: now,
            cancelled_at: None,
            cancellation_reason: None,
            qr_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of a booking request. A waitlisted request has no booking row
/// until the member is promoted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BookingOutcome {
    Booked { booking: Booking },
    Waitlisted { class_id: Uuid, position: i64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub promoted: Option<Booking>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CompletionSummary {
    pub completed: u64,
    pub no_shows: u64,
}
