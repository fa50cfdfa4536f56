//! Error types and handling for the proxy.
//!
//! [`AppError`] covers everything the proxy itself can answer with. Upstream
//! 429s and non-retryable statuses are not errors; they are relayed as-is.

use crate::core::config::ApiType;
use crate::core::error_types::error_body;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// No registered provider matches the inbound path
    #[error("No provider route matches path: {0}")]
    RouteNotFound(String),

    /// Provider is missing, has no keys, or has an unusable base URL
    #[error("Provider not configured: {0}")]
    ProviderUnconfigured(String),

    /// Every attempt failed at the network layer
    #[error("Upstream request failed")]
    UpstreamTransport,

    /// Client provided invalid data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Authentication failures on the admin API
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration-related errors (file not found, parse errors, etc.)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::RouteNotFound(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ProviderUnconfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamTransport | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Render the error using the envelope of the given upstream family.
    pub fn into_family_response(self, api_type: Option<ApiType>) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", message);
        } else {
            tracing::debug!(status = status.as_u16(), "{}", message);
        }

        let body = error_body(api_type, status.as_u16(), &message);
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_family_response(None)
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
