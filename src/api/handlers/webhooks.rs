use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};

use crate::{
    api::state::AppState,
    error::{AppError, Result},
    payments::WebhookAck,
};

/// Stripe needs the untouched body to check the signature, so this takes
/// the raw string rather than a `Json` extractor.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>> {
    let stripe_client = state.stripe_client.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("Payment processing is not configured".to_string())
    })?;

    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    let event = stripe_client.verify_webhook(&body, signature)?;
    tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Stripe webhook received");

    let ack = state.service_context.subscription_sync.handle_event(event).await;
    Ok(Json(ack))
}
