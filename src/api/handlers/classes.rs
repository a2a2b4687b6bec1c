use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{ClassRoster, ClassSession, ClassSummary, CompletionSummary, CreateClassRequest, UpdateClassRequest},
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ClassSummary>>> {
    let classes = state.service_context.class_service
        .list_upcoming(params.limit.clamp(1, 200))
        .await?;
    Ok(Json(classes))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClassSummary>> {
    Ok(Json(state.service_context.class_service.get(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateClassRequest>,
) -> Result<(StatusCode, Json<ClassSession>)> {
    let session = state.service_context.class_service
        .create(&current.user, req)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateClassRequest>,
) -> Result<Json<ClassSession>> {
    let session = state.service_context.class_service
        .update(&current.user, id, req)
        .await?;
    Ok(Json(session))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClassSession>> {
    let session = state.service_context.class_service
        .cancel(&current.user, id)
        .await?;
    Ok(Json(session))
}

pub async fn complete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionSummary>> {
    let summary = state.service_context.booking_service
        .complete_session(id, current.user.id)
        .await?;
    Ok(Json(summary))
}

pub async fn roster(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClassRoster>> {
    let roster = state.service_context.class_service
        .roster(&current.user, id)
        .await?;
    Ok(Json(roster))
}

pub async fn mine(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<ClassSession>>> {
    let classes = state.service_context.class_service
        .list_for_trainer(current.user.id)
        .await?;
    Ok(Json(classes))
}

pub async fn leave_waitlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.service_context.booking_service
        .leave_waitlist(id, current.user.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
