//! # API Error Types
//!
//! Unified error handling for the dashboard service.

use async_graphql::{Error as GraphQLError, ErrorExtensions};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use commerce_analytics::AnalyticsError;
use commerce_domain::DomainError;
use thiserror::Error;

/// API-level errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid argument: {0}")]
    Domain(#[from] DomainError),

    #[error("Dataset unavailable: {0}")]
    DatasetUnavailable(String),

    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Domain(_) => StatusCode::BAD_REQUEST,
            Self::DatasetUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Analytics(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get error code for GraphQL extensions
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Domain(_) => "INVALID_INPUT",
            Self::DatasetUnavailable(_) => "DATASET_UNAVAILABLE",
            Self::Analytics(_) => "ANALYTICS_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> GraphQLError {
        GraphQLError::new(self.to_string()).extend_with(|_, e| {
            e.set("code", self.error_code());
            e.set("status", self.status_code().as_u16());
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        }

        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "code": self.error_code(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
