use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug, Clone)]
pub enum AppError {
    /// Store or network call failed. The core never retries these itself.
    TransientIo(String),
    /// A snapshot arrived for a scope that has been torn down. Internal only.
    StaleScope(String),
    /// More than one edge exists for the same logical (user, target) pair.
    InvariantViolation(String),
    NotFound(String),
    Validation(String),
    Forbidden(String),
    SessionClosed(String),
    Configuration(String),
    Internal(String),
}

impl AppError {
    /// Whether the UI should offer a retry affordance for this failure
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientIo(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::TransientIo(msg) => write!(f, "Transient I/O error: {}", msg),
            AppError::StaleScope(msg) => write!(f, "Stale scope: {}", msg),
            AppError::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::SessionClosed(msg) => write!(f, "Session closed: {}", msg),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::TransientIo(msg) => {
                tracing::error!("Store error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Store temporarily unavailable".to_string())
            }
            AppError::StaleScope(msg) | AppError::InvariantViolation(msg) | AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::SessionClosed(msg) => (StatusCode::GONE, msg.clone()),
            AppError::Configuration(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::TransientIo(other.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::TransientIo("timeout".into()).is_transient());
        assert!(!AppError::Forbidden("not yours".into()).is_transient());
    }

    #[test]
    fn test_status_mapping() {
        let resp = AppError::TransientIo("down".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = AppError::NotFound("post p9".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = AppError::SessionClosed("thread p1".into()).into_response();
        assert_eq!(resp.status(), StatusCode::GONE);
    }
}
