use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use crate::engine::{OrderError, ValidationErrors};
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    /// Transient contention; the client should retry the whole request.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::InternalServerError(msg) => {
                error!(message = %msg, "Internal error");
            }
            other => {
                warn!(error = ?other, "Request rejected");
            }
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(errors) => AppError::Validation(errors),
            OrderError::LockTimeout(timeout) => AppError::Conflict(timeout.to_string()),
            OrderError::NotFound(what) => AppError::NotFound(what.to_string()),
            OrderError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Validation problems are passed through in full so the client can
        // fix every position at once; everything else stays high-level.
        let (message, details) = match &self {
            AppError::Validation(errors) => (
                "The order could not be created".to_string(),
                serde_json::to_value(errors).ok(),
            ),
            AppError::Conflict(msg) | AppError::NotFound(msg) => (msg.clone(), None),
            AppError::InternalServerError(_) => {
                ("An internal error occurred".to_string(), None::<Value>)
            }
        };

        error_response(code, message, details, status)
    }
}
