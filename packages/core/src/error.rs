use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::care::error::CareError;

/// Unified application error.
///
/// Every layer (config, care core, storage) fails into this type, and the
/// HTTP layer turns it into a status code plus `{"error": "..."}`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CareError> for AppError {
    fn from(err: CareError) -> Self {
        match err {
            CareError::Validation { message } => AppError::Validation(message),
            err @ CareError::NotFound { .. } => AppError::NotFound(err.to_string()),
            CareError::Storage(err) => AppError::Storage(err),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_) | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn care_errors_map_to_http_statuses() {
        let validation: AppError = CareError::validation("pain_score out of range").into();
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            validation.to_string(),
            "Validation error: pain_score out of range"
        );

        let missing: AppError = CareError::not_found("care plan", 4).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_string(), "care plan not found: 4");

        let storage: AppError = CareError::Storage(sqlx::Error::RowNotFound).into();
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn config_error_is_server_error() {
        assert_eq!(
            AppError::Config("DATABASE_URL is required".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
