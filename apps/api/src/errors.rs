use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::{Medium, Platform};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Mismatched posting times, no eligible combos, no templates. Raised before
    /// anything is persisted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No eligible social media profile for {platform} {medium}")]
    EligibilityExhausted { platform: Platform, medium: Medium },

    #[error("Tracking link provisioning failed: {0}")]
    Provisioning(String),

    #[error("Could not retire previously generated messages: {0}")]
    Retirement(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Configuration(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CONFIGURATION_ERROR",
                msg.clone(),
            ),
            AppError::EligibilityExhausted { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ELIGIBILITY_EXHAUSTED",
                self.to_string(),
            ),
            AppError::Provisioning(msg) => {
                tracing::error!("Provisioning error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PROVISIONING_FAILURE",
                    "The tracking link service failed; regenerate to reach a consistent state"
                        .to_string(),
                )
            }
            AppError::Retirement(msg) => {
                tracing::error!("Retirement error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RETIREMENT_FAILURE",
                    "Previously generated messages could not be removed".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
