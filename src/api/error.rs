use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::response::ApiResponse;
use crate::optimizer::OptimizationError;
use crate::repo::StoreError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Optimization error: {0}")]
    OptimizationError(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::DatabaseError(_) | ApiError::OptimizationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::Conflict(_) => "Conflict",
            ApiError::DatabaseError(_) => "DatabaseError",
            ApiError::OptimizationError(_) => "OptimizationError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "API error occurred");
            "An internal error occurred".to_string()
        } else {
            tracing::debug!(error = %self, "Client error");
            self.to_string()
        };

        (status, Json(ApiResponse::failure(error_type, message))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast_ref::<StoreError>() {
            Some(e @ StoreError::NotFound { .. }) => ApiError::NotFound(e.to_string()),
            Some(e @ StoreError::DuplicateName { .. }) => ApiError::Conflict(e.to_string()),
            // Flows are never client input: a dangling reference means a record
            // was deleted while a run was materialising.
            Some(e @ StoreError::UnknownReference { .. }) => ApiError::Conflict(e.to_string()),
            None => ApiError::DatabaseError(format!("{error:#}")),
        }
    }
}

impl From<OptimizationError> for ApiError {
    fn from(error: OptimizationError) -> Self {
        match error {
            OptimizationError::Persistence(source) => ApiError::from(source),
            e if e.is_user_facing() => ApiError::BadRequest(e.to_string()),
            e => ApiError::OptimizationError(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}
