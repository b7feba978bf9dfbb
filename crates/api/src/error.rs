//! API error responses
//!
//! Every error renders as `{error, errorMessage}`. Partial failures add a
//! `remediation` object so the caller can hand it to support.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use offseason_conversion::{ConversionError, ErrorClass};
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Certificate code is required")]
    MissingCertificate,

    /// Request body or query could not be parsed
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCertificate | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conversion(err) => match err {
                ConversionError::CertificateNotFound { .. } => StatusCode::NOT_FOUND,
                ConversionError::ConversionInProgress(_) => StatusCode::CONFLICT,
                ConversionError::UpstreamUnavailable(_)
                | ConversionError::MalformedResponse(_)
                | ConversionError::ValidationFailed(_)
                | ConversionError::StripeApi(_)
                | ConversionError::PartialFailure(_) => StatusCode::BAD_GATEWAY,
                other => match other.class() {
                    ErrorClass::Client => StatusCode::BAD_REQUEST,
                    ErrorClass::Operational => StatusCode::INTERNAL_SERVER_ERROR,
                },
            },
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            ApiError::MissingCertificate => "missing_certificate",
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::Conversion(err) => err.error_code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.error_code().to_string();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, error_code = %code, error = %message, "Request failed");
        } else {
            tracing::debug!(status = %status, error_code = %code, error = %message, "Request rejected");
        }

        let mut body = json!({
            "error": code,
            "errorMessage": message,
        });

        if let ApiError::Conversion(err) = &self {
            if let Some(Ok(record)) = err.partial_failure().map(serde_json::to_value) {
                body["remediation"] = record;
            }
        }

        (status, Json(body)).into_response()
    }
}
