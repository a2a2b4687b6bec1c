use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::Notification,
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn feed(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<Notification>>> {
    let notifications = state.service_context.notifications
        .feed(current.user.id, params.limit.clamp(1, 200))
        .await?;
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if !state.service_context.notifications.mark_read(id, current.user.id).await? {
        return Err(AppError::NotFound("Notification not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
