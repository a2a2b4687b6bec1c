use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::{
    api::state::AppState,
    auth::SESSION_COOKIE,
    domain::User,
    error::{AppError, Result},
};

#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
}

/// The session token from the `session` cookie, or failing that from an
/// `Authorization: Bearer` header.
pub fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

async fn resolve_user(state: &AppState, jar: &CookieJar, headers: &HeaderMap) -> Result<User> {
    let token = session_token(jar, headers).ok_or(AppError::Unauthorized)?;

    let user = state.service_context.auth_service
        .validate_session(&token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.is_active {
        return Err(AppError::Forbidden);
    }
    Ok(user)
}

pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = resolve_user(&state, &jar, request.headers()).await?;

    request.extensions_mut().insert(CurrentUser { user });
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = resolve_user(&state, &jar, request.headers()).await?;

    if !user.is_admin() {
        return Err(AppError::Forbidden);
    }

    request.extensions_mut().insert(CurrentUser { user });
    Ok(next.run(request).await)
}
