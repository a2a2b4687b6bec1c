use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{
        AuditEntry, CreatePlanRequest, CreateUserRequest, GrantSubscriptionRequest, ManualPaymentRequest,
        MarkPaidRequest, Payment, Plan, RefundRequest, Subscription, UpdatePlanRequest, UpdateUserRequest, User,
    },
    error::Result,
    jobs::ReconciliationSummary,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

// Users

pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<User>>> {
    let users = state.service_context.user_repo
        .list(params.limit.clamp(1, 500), params.offset.max(0))
        .await?;
    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    req.validate()?;
    let user = state.service_context.user_repo.create(req).await?;

    tracing::info!(user_id = %user.id, role = %user.role.kind(), created_by = %current.user.id, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    let deactivating = req.is_active == Some(false);
    let user = state.service_context.user_repo.update(id, req).await?;

    if deactivating {
        let dropped = state.service_context.auth_service.invalidate_user_sessions(user.id).await?;
        tracing::info!(user_id = %user.id, sessions = dropped, "User deactivated");
    }
    Ok(Json(user))
}

pub async fn grant_subscription(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<GrantSubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>)> {
    let subscription = state.service_context.billing_service
        .grant_subscription(&current.user, id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

// Plans

pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<Plan>>> {
    Ok(Json(state.service_context.billing_service.list_plans(true).await?))
}

pub async fn create_plan(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<Plan>)> {
    let plan = state.service_context.billing_service
        .create_plan(&current.user, req)
        .await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePlanRequest>,
) -> Result<Json<Plan>> {
    let plan = state.service_context.billing_service
        .update_plan(&current.user, id, req)
        .await?;
    Ok(Json(plan))
}

pub async fn deactivate_plan(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Plan>> {
    let plan = state.service_context.billing_service
        .deactivate_plan(&current.user, id)
        .await?;
    Ok(Json(plan))
}

// Payments

pub async fn list_payments(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Payment>>> {
    let payments = state.service_context.billing_service
        .list_payments(params.limit.clamp(1, 500), params.offset.max(0))
        .await?;
    Ok(Json(payments))
}

pub async fn manual_payment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ManualPaymentRequest>,
) -> Result<(StatusCode, Json<Payment>)> {
    let payment = state.service_context.billing_service
        .record_manual_payment(&current.user, req)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<RefundRequest>>,
) -> Result<Json<Payment>> {
    let reason = body.and_then(|Json(req)| req.reason);
    let payment = state.service_context.billing_service
        .refund_payment(&current.user, id, reason)
        .await?;
    Ok(Json(payment))
}

pub async fn mark_payment_paid(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<MarkPaidRequest>>,
) -> Result<Json<Payment>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let payment = state.service_context.billing_service
        .mark_payment_paid(&current.user, id, req)
        .await?;
    Ok(Json(payment))
}

pub async fn audit_log(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AuditEntry>>> {
    let entries = state.service_context.billing_service
        .audit_log(params.limit.clamp(1, 500))
        .await?;
    Ok(Json(entries))
}

// Jobs

pub async fn run_reconciliation(State(state): State<AppState>) -> Result<Json<ReconciliationSummary>> {
    Ok(Json(state.service_context.reconciler.run_once().await?))
}
