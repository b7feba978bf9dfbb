//! Acuity Scheduling certificate API
//!
//! Acuity has no way to change a certificate's balance. Conversions
//! therefore delete the old certificate and create a new one, see
//! [`crate::coordinator`].

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};

use crate::certificate::CertificateCode;
use crate::config::AcuityConfig;
use crate::error::{ConversionError, ConversionResult};

/// Remaining session counts keyed by appointment type id
pub type RemainingCounts = HashMap<String, u32>;

/// Certificate as reported by the offseason-restricted lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateLookup {
    pub product_id: u64,
    pub remaining_counts: RemainingCounts,
    /// Acuity's own id, needed to delete the certificate
    pub external_id: String,
}

/// Replacement certificate to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCertificate {
    pub code: String,
    pub product_id: u64,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub code: String,
    pub remaining_counts: RemainingCounts,
}

/// Upstream credit tracking service
#[async_trait]
pub trait CreditService: Send + Sync {
    /// Look a certificate up, restricted to the offseason appointment type
    async fn check_certificate(&self, code: &CertificateCode) -> ConversionResult<CertificateLookup>;

    /// Delete a certificate. Cannot be undone.
    async fn delete_certificate(&self, external_id: &str) -> ConversionResult<()>;

    async fn create_certificate(&self, certificate: &NewCertificate)
        -> ConversionResult<IssuedCertificate>;
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(rename = "productID")]
    product_id: u64,
    #[serde(rename = "remainingCounts", default)]
    remaining_counts: Option<RemainingCounts>,
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "remainingCounts", default)]
    remaining_counts: Option<RemainingCounts>,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    certificate: &'a str,
    #[serde(rename = "productID")]
    product_id: u64,
    email: &'a str,
}

/// Acuity error body: `{status, error, message}`
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    message: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected certificate id, found {}",
            other
        ))),
    }
}

/// Map a failed Acuity response onto the error taxonomy.
///
/// Known certificate errors keep Acuity's code and message.
fn upstream_error(status: StatusCode, body: &str, context: &str) -> ConversionError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return ConversionError::UpstreamUnavailable(format!("{}: HTTP {}", context, status));
    }

    let parsed: ErrorResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => {
            return ConversionError::MalformedResponse(format!(
                "{}: HTTP {} {}",
                context,
                status,
                body.chars().take(200).collect::<String>()
            ))
        }
    };

    let ErrorResponse { error: code, message } = parsed;
    match code.as_str() {
        "invalid_certificate" => ConversionError::CertificateNotFound { code, message },
        "certificate_uses" => ConversionError::NoRemainingSessions { code, message },
        "invalid_certificate_type" => ConversionError::WrongCertificateType { code, message },
        _ => ConversionError::CertificateRejected { code, message },
    }
}

/// HTTP client for the Acuity certificate endpoints
#[derive(Clone)]
pub struct AcuityClient {
    http: Client,
    config: AcuityConfig,
}

impl AcuityClient {
    pub fn new(config: AcuityConfig) -> ConversionResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConversionError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AcuityConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .basic_auth(&self.config.user_id, Some(&self.config.api_key))
            .header(header::ACCEPT, "application/json")
    }

    async fn read_body(response: Response) -> ConversionResult<(StatusCode, String)> {
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl CreditService for AcuityClient {
    async fn check_certificate(&self, code: &CertificateCode) -> ConversionResult<CertificateLookup> {
        let response = self
            .authorized(self.http.get(self.url("/certificates/check")))
            .query(&[
                ("certificate", code.as_str()),
                (
                    "appointmentTypeID",
                    self.config.offseason_appointment_type_id.as_str(),
                ),
            ])
            .send()
            .await?;
        let (status, body) = Self::read_body(response).await?;

        tracing::debug!(code = %code, status = %status, body = %body, "Acuity certificate check response");

        if !status.is_success() {
            return Err(upstream_error(status, &body, "certificate check"));
        }

        let parsed: CheckResponse = serde_json::from_str(&body).map_err(|e| {
            ConversionError::MalformedResponse(format!("certificate check: {}", e))
        })?;

        Ok(CertificateLookup {
            product_id: parsed.product_id,
            remaining_counts: parsed.remaining_counts.unwrap_or_default(),
            external_id: parsed.id,
        })
    }

    async fn delete_certificate(&self, external_id: &str) -> ConversionResult<()> {
        tracing::info!(external_id = %external_id, "Deleting Acuity certificate");

        let response = self
            .authorized(self.http.delete(self.url(&format!("/certificates/{}", external_id))))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let (status, body) = Self::read_body(response).await?;
        tracing::error!(
            external_id = %external_id,
            status = %status,
            body = %body,
            "Acuity certificate delete failed"
        );
        Err(upstream_error(status, &body, "failed to delete certificate"))
    }

    async fn create_certificate(
        &self,
        certificate: &NewCertificate,
    ) -> ConversionResult<IssuedCertificate> {
        tracing::info!(
            code = %certificate.code,
            product_id = certificate.product_id,
            "Creating Acuity certificate"
        );

        let response = self
            .authorized(self.http.post(self.url("/certificates")))
            .json(&CreateRequest {
                certificate: &certificate.code,
                product_id: certificate.product_id,
                email: &certificate.email,
            })
            .send()
            .await?;
        let (status, body) = Self::read_body(response).await?;

        if !status.is_success() {
            tracing::error!(
                code = %certificate.code,
                status = %status,
                body = %body,
                "Acuity certificate create failed"
            );
            return Err(upstream_error(status, &body, "failed to create certificate"));
        }

        let parsed: CreateResponse = serde_json::from_str(&body).map_err(|e| {
            ConversionError::MalformedResponse(format!("certificate create: {}", e))
        })?;

        Ok(IssuedCertificate {
            code: certificate.code.clone(),
            remaining_counts: parsed.remaining_counts.unwrap_or_default(),
        })
    }
}
