use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("External service error: {0}")]
    External(String),

    #[error("You already have a booking for this class")]
    DuplicateBooking,

    #[error("Class is not available for booking")]
    ClassUnavailable,

    #[error("Not the owner of this resource")]
    NotOwner,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Bookings must be cancelled at least {hours} hours before class start")]
    CutoffExceeded { hours: i64 },

    #[error("Invalid token or booking ID")]
    TokenNotFound,

    #[error("Token has already been used")]
    TokenAlreadyUsed,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Already checked in")]
    AlreadyCheckedIn,

    #[error("Active subscription required to access this feature")]
    SubscriptionRequired,
}

impl AppError {
    /// True for errors caused by the caller (bad input or a violated
    /// precondition) as opposed to infrastructure failures.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::NotOwner | AppError::SubscriptionRequired => {
                StatusCode::FORBIDDEN
            }
            AppError::BadRequest(_)
            | AppError::CutoffExceeded { .. }
            | AppError::TokenNotFound
            | AppError::TokenAlreadyUsed
            | AppError::TokenExpired => StatusCode::BAD_REQUEST,
            AppError::Conflict(_)
            | AppError::DuplicateBooking
            | AppError::ClassUnavailable
            | AppError::InvalidState(_)
            | AppError::AlreadyCheckedIn => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::External(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match self {
            AppError::Database(ref msg) => {
                tracing::error!("Database error: {}", msg);
                "Database error occurred".to_string()
            }
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::External(ref msg) => {
                tracing::error!("External service error: {}", msg);
                msg.clone()
            }
            AppError::NotFound(ref msg)
            | AppError::BadRequest(ref msg)
            | AppError::Conflict(ref msg)
            | AppError::Validation(ref msg)
            | AppError::ServiceUnavailable(ref msg) => msg.clone(),
            ref other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// True when a sqlx error is a UNIQUE constraint violation. Several
/// invariants (one attendance per booking, one active booking per member and
/// class) are enforced by unique indexes, so callers translate this into the
/// matching domain error.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_message_names_the_window() {
        let err = AppError::CutoffExceeded { hours: 2 };
        assert_eq!(
            err.to_string(),
            "Bookings must be cancelled at least 2 hours before class start"
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn domain_errors_are_client_errors() {
        for err in [
            AppError::DuplicateBooking,
            AppError::ClassUnavailable,
            AppError::NotOwner,
            AppError::TokenExpired,
            AppError::AlreadyCheckedIn,
            AppError::SubscriptionRequired,
        ] {
            assert!(err.is_client_error(), "{err:?} should be a client error");
        }
        assert!(!AppError::External("stripe down".into()).is_client_error());
    }
}
