use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::{
        middleware::auth::{session_token, CurrentUser},
        state::AppState,
    },
    auth::AuthService,
    domain::{CreateUserRequest, MemberProfile, Role, User},
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Also usable as a Bearer token by non-browser clients.
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub phone: Option<String>,
    pub fitness_goals: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    req.validate()?;

    let user = state.service_context.user_repo
        .create(CreateUserRequest {
            email: req.email,
            full_name: req.full_name,
            password: req.password,
            phone: req.phone,
            role: Role::Member(MemberProfile {
                fitness_goals: req.fitness_goals,
                health_notes: None,
            }),
        })
        .await?;

    tracing::info!(user_id = %user.id, "Member registered");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let auth_service = &state.service_context.auth_service;
    let user = auth_service.authenticate(&req.email, &req.password).await?;

    let hours = state.settings.auth.session_duration_hours;
    let (_session, token) = auth_service.create_session(user.id, hours).await?;
    let cookie = auth_service.create_session_cookie(&token, state.settings.auth.secure_cookies, hours);

    tracing::info!(user_id = %user.id, "User logged in");
    Ok((jar.add(cookie), Json(LoginResponse { token, user })))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, StatusCode)> {
    if let Some(token) = session_token(&jar, &headers) {
        if let Err(e) = state.service_context.auth_service.invalidate_session(&token).await {
            tracing::warn!("Failed to invalidate session: {}", e);
        }
    }

    Ok((jar.add(AuthService::create_logout_cookie()), StatusCode::NO_CONTENT))
}

pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<User> {
    Json(current.user)
}
