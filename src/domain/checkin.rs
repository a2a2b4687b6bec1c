use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Persisted half of a check-in token. The raw token is never stored; only
/// its keyed hash is.
#[derive(Debug, Clone, Serialize)]
pub struct CheckInToken {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub booking_id: Uuid,
    pub class_id: Uuid,
    pub member_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CheckInToken {
    /// Expiry is inclusive: a token is still valid at exactly `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Returned once to the member when a token is issued.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub booking_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Scannable QR content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QrPayload {
    pub booking_id: Uuid,
    pub token: String,
}

impl From<&IssuedToken> for QrPayload {
    fn from(issued: &IssuedToken) -> Self {
        Self {
            booking_id: issued.booking_id,
            token: issued.token.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckInMethod {
    Qr,
    Manual,
}

impl CheckInMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInMethod::Qr => "Qr",
            CheckInMethod::Manual => "Manual",
        }
    }
}

impl FromStr for CheckInMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Qr" => Ok(CheckInMethod::Qr),
            "Manual" => Ok(CheckInMethod::Manual),
            _ => Err(format!("Invalid check-in method: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendance {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub member_id: Uuid,
    pub class_id: Uuid,
    pub method: CheckInMethod,
    pub checked_in_at: DateTime<Utc>,
    pub checked_in_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ClassAttendanceStats {
    pub total_bookings: usize,
    pub checked_in: usize,
    pub no_shows: usize,
    pub cancelled: usize,
    pub qr_check_ins: usize,
    pub manual_check_ins: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassAttendanceReport {
    pub class_id: Uuid,
    pub attendance: Vec<Attendance>,
    pub stats: ClassAttendanceStats,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MemberAttendanceStats {
    pub total_classes: usize,
    pub qr_check_ins: usize,
    pub manual_check_ins: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberAttendanceReport {
    pub member_id: Uuid,
    pub attendance: Vec<Attendance>,
    pub stats: MemberAttendanceStats,
}
