use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Gymdesk API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Class booking, check-in and billing for fitness clubs",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "auth": "/auth/login",
            "classes": "/api/classes",
            "bookings": "/api/bookings",
            "attendance": "/api/attendance",
            "plans": "/api/plans",
            "admin": "/admin"
        }
    }))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match sqlx::query("SELECT 1")
        .execute(&state.service_context.db_pool)
        .await
    {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!("Health check database probe failed: {}", e);
            "unavailable"
        }
    };

    let status = if database == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database == "ok" { "healthy" } else { "degraded" },
            "database": database,
            "timestamp": state.service_context.clock.now().to_rfc3339()
        })),
    )
}
