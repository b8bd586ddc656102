//! Mapping protocol errors onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};
use wopi_host::WopiError;

/// Response wrapper carrying a [`WopiError`] out of a handler.
#[derive(Debug)]
pub struct ApiError(pub WopiError);

impl From<WopiError> for ApiError {
    fn from(err: WopiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_integrity_violation() {
            // security event: content failed its integrity contract
            error!(error = %self.0, "integrity violation while serving content");
        } else if self.0.is_programming_error() {
            error!(error = %self.0, "contract violation in request handling");
        } else {
            warn!(error = %self.0, "request failed");
        }

        let status = match &self.0 {
            WopiError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            WopiError::ExpiredAccessToken => StatusCode::UNAUTHORIZED,
            WopiError::NotSafeToShare { .. } => StatusCode::CONFLICT,
            WopiError::VersionMismatch { .. }
            | WopiError::ContentHashMismatch { .. } => StatusCode::BAD_GATEWAY,
            WopiError::Validation { .. } => StatusCode::BAD_REQUEST,
            WopiError::EmptyDocument
            | WopiError::EmptyOperation
            | WopiError::Cancelled
            | WopiError::Storage { .. }
            | WopiError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.0.to_string()).into_response()
    }
}
