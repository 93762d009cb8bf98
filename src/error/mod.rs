use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::queue::QueueBackendError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("message with this uuid already exists in sub-queue '{0}'")]
    DuplicateMessage(String),

    #[error("no message found for this identifier")]
    NotFound,

    #[error("already assigned to {0}")]
    AlreadyAssigned(String),

    #[error("not currently assigned to the requesting owner")]
    AssignmentMismatch,

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] QueueBackendError),

    #[error("no authentication token supplied")]
    AuthMissing,

    #[error("authentication token is invalid or expired")]
    AuthInvalid,

    #[error("authentication header is malformed")]
    AuthFormat,

    #[error("not authorized for sub-queue '{0}'")]
    NotAuthorized(String),

    #[error("sub-queue name '{0}' is reserved")]
    Reserved(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::DuplicateMessage(_) => (StatusCode::CONFLICT, "DUPLICATE_MESSAGE"),
            AppError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::AlreadyAssigned(_) => (StatusCode::CONFLICT, "ALREADY_ASSIGNED"),
            AppError::AssignmentMismatch => (StatusCode::CONFLICT, "ASSIGNMENT_MISMATCH"),
            AppError::UpdateFailed(_) => (StatusCode::CONFLICT, "UPDATE_FAILED"),
            AppError::Backend(_) => (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_ERROR"),
            AppError::AuthMissing => (StatusCode::UNAUTHORIZED, "AUTH_MISSING"),
            AppError::AuthInvalid => (StatusCode::UNAUTHORIZED, "AUTH_INVALID"),
            AppError::AuthFormat => (StatusCode::BAD_REQUEST, "AUTH_FORMAT"),
            AppError::NotAuthorized(_) => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED"),
            AppError::Reserved(_) => (StatusCode::FORBIDDEN, "RESERVED"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let log_message = self.to_string();
        let client_message = match (&self, is_production()) {
            (AppError::Config(_) | AppError::Internal(_) | AppError::Backend(_), true) => {
                "an internal error occurred".to_string()
            }
            _ => log_message.clone(),
        };

        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "request failed"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
