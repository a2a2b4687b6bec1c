use std::sync::Arc;

use chrono::Duration;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::CheckInPolicy,
    domain::*,
    error::{AppError, Result},
    repository::{BookingRepository, CheckInTokenRepository},
};

type HmacSha256 = Hmac<Sha256>;

/// Issues and redeems one-time check-in tokens. Only the keyed hash of a
/// token is persisted.
pub struct TokenIssuer {
    token_repo: Arc<dyn CheckInTokenRepository>,
    booking_repo: Arc<dyn BookingRepository>,
    clock: Arc<dyn Clock>,
    policy: CheckInPolicy,
}

impl TokenIssuer {
    pub fn new(
        token_repo: Arc<dyn CheckInTokenRepository>,
        booking_repo: Arc<dyn BookingRepository>,
        clock: Arc<dyn Clock>,
        policy: CheckInPolicy,
    ) -> Self {
        Self {
            token_repo,
            booking_repo,
            clock,
            policy,
        }
    }

    pub async fn issue(&self, booking_id: Uuid, requester_id: Uuid) -> Result<IssuedToken> {
        let booking = self.booking_repo.find_by_id(booking_id).await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        if booking.member_id != requester_id {
            return Err(AppError::NotOwner);
        }
        if booking.status != BookingStatus::Booked {
            return Err(AppError::InvalidState(format!(
                "Cannot issue a check-in code for a booking that is {}",
                booking.status.as_str()
            )));
        }

        let now = self.clock.now();
        let revoked = self.token_repo.revoke_unused_for_booking(booking.id, now).await?;
        if revoked > 0 {
            tracing::debug!(booking_id = %booking.id, revoked, "Revoked earlier check-in tokens");
        }

        let raw = generate_token();
        let expires_at = now + Duration::minutes(self.policy.token_expiry_minutes);

        self.token_repo
            .create(CheckInToken {
                id: Uuid::new_v4(),
                token_hash: hash_token(&self.policy.token_secret, &raw)?,
                booking_id: booking.id,
                class_id: booking.class_id,
                member_id: booking.member_id,
                expires_at,
                used: false,
                used_at: None,
                revoked_at: None,
                created_at: now,
            })
            .await?;
        self.booking_repo.set_qr_expiry(booking.id, expires_at).await?;

        tracing::info!(booking_id = %booking.id, %expires_at, "Check-in token issued");
        Ok(IssuedToken {
            booking_id: booking.id,
            token: raw,
            expires_at,
        })
    }

    /// Consumes a token. Of any number of concurrent redemptions of the same
    /// token, exactly one succeeds.
    pub async fn redeem(&self, raw: &str, booking_id: Uuid) -> Result<CheckInToken> {
        let token_hash = hash_token(&self.policy.token_secret, raw)?;
        let token = self.token_repo.find_by_hash(&token_hash, booking_id).await?
            .ok_or(AppError::TokenNotFound)?;

        if token.used {
            return Err(AppError::TokenAlreadyUsed);
        }

        let now = self.clock.now();
        if token.is_expired(now) {
            return Err(AppError::TokenExpired);
        }

        if !self.token_repo.mark_used(token.id, now).await? {
            return Err(AppError::TokenAlreadyUsed);
        }

        Ok(CheckInToken {
            used: true,
            used_at: Some(now),
            ..token
        })
    }
}

fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(secret: &str, raw: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid token secret: {}", e)))?;
    mac.update(raw.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
