use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{Attendance, ClassAttendanceReport, MemberAttendanceReport},
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub booking_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ManualCheckInRequest {
    pub class_id: Uuid,
    pub member_id: Uuid,
}

pub async fn check_in(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CheckInRequest>,
) -> Result<(StatusCode, Json<Attendance>)> {
    let attendance = state.service_context.attendance_service
        .check_in_with_token(current.user.id, req.booking_id, req.token.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(attendance)))
}

pub async fn manual_check_in(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ManualCheckInRequest>,
) -> Result<(StatusCode, Json<Attendance>)> {
    let attendance = state.service_context.attendance_service
        .manual_check_in(&current.user, req.class_id, req.member_id)
        .await?;
    Ok((StatusCode::CREATED, Json(attendance)))
}

pub async fn class_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClassAttendanceReport>> {
    let report = state.service_context.attendance_service
        .class_report(&current.user, id)
        .await?;
    Ok(Json(report))
}

pub async fn member_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<MemberAttendanceReport>> {
    let report = state.service_context.attendance_service
        .member_report(&current.user, id)
        .await?;
    Ok(Json(report))
}
