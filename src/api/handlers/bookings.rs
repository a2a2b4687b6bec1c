use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use qrcode::{render::svg, QrCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{Booking, BookingOutcome, CancellationOutcome, QrPayload},
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub class_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub booking_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub payload: QrPayload,
    /// SVG rendering of the JSON-encoded payload.
    pub qr_svg: String,
}

/// 201 with the booking, or 202 when the member was put on the waitlist.
pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Response> {
    let outcome = state.service_context.booking_service
        .book(&current.user, req.class_id)
        .await?;

    Ok(match outcome {
        BookingOutcome::Booked { booking } => (StatusCode::CREATED, Json(booking)).into_response(),
        BookingOutcome::Waitlisted { class_id, position } => (
            StatusCode::ACCEPTED,
            Json(json!({
                "waitlisted": true,
                "class_id": class_id,
                "position": position,
            })),
        )
            .into_response(),
    })
}

pub async fn mine(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Booking>>> {
    let bookings = state.service_context.booking_service
        .list_for_member(current.user.id)
        .await?;
    Ok(Json(bookings))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelBookingRequest>>,
) -> Result<Json<CancellationOutcome>> {
    let reason = body.and_then(|Json(req)| req.reason);
    let outcome = state.service_context.booking_service
        .cancel(id, current.user.id, reason)
        .await?;
    Ok(Json(outcome))
}

pub async fn issue_qr(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<QrResponse>> {
    let issued = state.service_context.token_issuer
        .issue(id, current.user.id)
        .await?;

    let payload = QrPayload::from(&issued);
    let encoded = serde_json::to_string(&payload)
        .map_err(|e| AppError::Internal(format!("Failed to encode QR payload: {}", e)))?;
    let code = QrCode::new(encoded.as_bytes())
        .map_err(|e| AppError::Internal(format!("Failed to build QR code: {}", e)))?;
    let qr_svg = code
        .render::<svg::Color>()
        .min_dimensions(240, 240)
        .build();

    Ok(Json(QrResponse {
        booking_id: issued.booking_id,
        expires_at: issued.expires_at,
        payload,
        qr_svg,
    }))
}
