//! Conversion error types

use thiserror::Error;

use crate::coordinator::PartialFailure;

pub type ConversionResult<T> = Result<T, ConversionError>;

/// How an error should be presented to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input or a certificate that cannot be converted (4xx)
    Client,
    /// Upstream or internal failure (5xx)
    Operational,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{0}")]
    Validation(String),

    /// Upstream reported the certificate does not exist
    #[error("{message}")]
    CertificateNotFound { code: String, message: String },

    /// Either upstream reported no uses left, or the product is unknown and
    /// the offseason balance is zero
    #[error("{message}")]
    NoRemainingSessions { code: String, message: String },

    #[error("{message}")]
    WrongCertificateType { code: String, message: String },

    /// Any other upstream 4xx, passed through with its own code
    #[error("{message}")]
    CertificateRejected { code: String, message: String },

    #[error("No pricing tier matches {0}")]
    TierResolution(String),

    #[error("No product ID found for {0} sessions")]
    InvalidBalance(u32),

    #[error("No price found for lookup key: {0}")]
    PriceNotFound(String),

    #[error("Payment not completed for checkout session {0}")]
    PaymentNotCompleted(String),

    #[error("A conversion is already in progress for certificate {0}")]
    ConversionInProgress(String),

    /// Transport failure, timeout, 429 or 5xx from an upstream
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Certificate lookup could not be completed
    #[error("{0}")]
    ValidationFailed(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The old certificate was deleted and the replacement was not created
    #[error("Certificate {} was deleted but its replacement was not created: {}", .0.code, .0.upstream_error)]
    PartialFailure(Box<PartialFailure>),
}

impl ConversionError {
    /// Stable snake_case code returned to API callers
    pub fn error_code(&self) -> &str {
        match self {
            ConversionError::Validation(_) => "validation_error",
            ConversionError::CertificateNotFound { code, .. }
            | ConversionError::NoRemainingSessions { code, .. }
            | ConversionError::WrongCertificateType { code, .. }
            | ConversionError::CertificateRejected { code, .. } => code,
            ConversionError::TierResolution(_) => "tier_resolution_failed",
            ConversionError::InvalidBalance(_) => "invalid_balance",
            ConversionError::PriceNotFound(_) => "price_not_found",
            ConversionError::PaymentNotCompleted(_) => "payment_not_completed",
            ConversionError::ConversionInProgress(_) => "conversion_in_progress",
            ConversionError::UpstreamUnavailable(_) => "upstream_unavailable",
            ConversionError::MalformedResponse(_) => "malformed_response",
            ConversionError::ValidationFailed(_) => "validation_failed",
            ConversionError::StripeApi(_) => "payment_provider_error",
            ConversionError::Config(_) => "configuration_error",
            ConversionError::PartialFailure(_) => "partial_failure",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ConversionError::Validation(_)
            | ConversionError::CertificateNotFound { .. }
            | ConversionError::NoRemainingSessions { .. }
            | ConversionError::WrongCertificateType { .. }
            | ConversionError::CertificateRejected { .. }
            | ConversionError::TierResolution(_)
            | ConversionError::InvalidBalance(_)
            | ConversionError::PaymentNotCompleted(_)
            | ConversionError::ConversionInProgress(_) => ErrorClass::Client,
            ConversionError::PriceNotFound(_)
            | ConversionError::UpstreamUnavailable(_)
            | ConversionError::MalformedResponse(_)
            | ConversionError::ValidationFailed(_)
            | ConversionError::StripeApi(_)
            | ConversionError::Config(_)
            | ConversionError::PartialFailure(_) => ErrorClass::Operational,
        }
    }

    /// Whether a read that failed with this error may be attempted again.
    /// Writes are never retried regardless of this value.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConversionError::UpstreamUnavailable(_))
    }

    pub fn is_partial_failure(&self) -> bool {
        matches!(self, ConversionError::PartialFailure(_))
    }

    /// Remediation record, present only for partial failures
    pub fn partial_failure(&self) -> Option<&PartialFailure> {
        match self {
            ConversionError::PartialFailure(record) => Some(record),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ConversionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ConversionError::MalformedResponse(err.to_string())
        } else {
            ConversionError::UpstreamUnavailable(err.to_string())
        }
    }
}

impl From<stripe::StripeError> for ConversionError {
    fn from(err: stripe::StripeError) -> Self {
        match &err {
            stripe::StripeError::Stripe(request_error)
                if request_error.http_status == 429 || request_error.http_status >= 500 =>
            {
                ConversionError::UpstreamUnavailable(err.to_string())
            }
            stripe::StripeError::Timeout => ConversionError::UpstreamUnavailable(err.to_string()),
            _ => ConversionError::StripeApi(err.to_string()),
        }
    }
}
