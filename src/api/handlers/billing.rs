use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{CreatePaymentIntentRequest, Payment, PaymentIntentCreated, Plan, Subscription},
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<Plan>>> {
    Ok(Json(state.service_context.billing_service.list_plans(false).await?))
}

pub async fn checkout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let checkout_url = state.service_context.billing_service
        .start_checkout(&current.user, req.plan_id)
        .await?;
    Ok(Json(CheckoutResponse { checkout_url }))
}

pub async fn my_subscriptions(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Subscription>>> {
    let subscriptions = state.service_context.billing_service
        .subscriptions_for(current.user.id)
        .await?;
    Ok(Json(subscriptions))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Subscription>> {
    let subscription = state.service_context.billing_service
        .cancel_subscription(&current.user, id)
        .await?;
    Ok(Json(subscription))
}

pub async fn my_payments(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Payment>>> {
    let payments = state.service_context.billing_service
        .payments_for(current.user.id)
        .await?;
    Ok(Json(payments))
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreatePaymentIntentRequest>,
) -> Result<(StatusCode, Json<PaymentIntentCreated>)> {
    let created = state.service_context.billing_service
        .create_payment_intent(&current.user, req)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}
