//! Conversion coordinator
//!
//! Acuity certificates cannot be edited, so a conversion is a replace:
//! delete the offseason certificate, then create a winter certificate with
//! the same code. The two writes are not atomic. When the delete succeeds
//! and the create fails, the customer has no certificate at all and an
//! operator must re-issue it by hand from the [`PartialFailure`] record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::acuity::{CreditService, IssuedCertificate, NewCertificate};
use crate::balance::{final_balance, ConversionType};
use crate::certificate::CertificateCode;
use crate::error::{ConversionError, ConversionResult};
use crate::lease::CodeLeases;
use crate::products::WinterProductTable;

/// A customer's chosen conversion, as submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub conversion_type: ConversionType,
    #[serde(rename = "certificateCode")]
    pub code: String,
    /// Acuity id of the certificate being replaced
    #[serde(rename = "certificateId")]
    pub external_id: String,
    pub email: String,
    pub current_balance: u32,
    pub adjusted_balance: u32,
    #[serde(default)]
    pub other_remaining_balance: u32,
}

impl ConversionRequest {
    /// Check the request before anything is sent upstream
    pub fn validate(&self) -> ConversionResult<CertificateCode> {
        let code = CertificateCode::parse(&self.code)?;

        if self.external_id.trim().is_empty() {
            return Err(ConversionError::Validation(
                "Certificate ID is required".to_string(),
            ));
        }
        if !is_valid_email(&self.email) {
            return Err(ConversionError::Validation(format!(
                "Invalid email address: {}",
                self.email
            )));
        }
        if self.adjusted_balance > self.current_balance {
            return Err(ConversionError::Validation(format!(
                "Adjusted balance {} exceeds current balance {}",
                self.adjusted_balance, self.current_balance
            )));
        }

        Ok(code)
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Outcome of a completed conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReceipt {
    pub code: String,
    /// Winter sessions on the new certificate
    pub final_balance: u32,
}

/// Everything an operator needs to re-issue a certificate by hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialFailure {
    pub conversion_id: Uuid,
    pub code: String,
    /// Acuity id of the deleted certificate
    pub external_id: String,
    pub target_product_id: u64,
    pub email: String,
    pub final_balance: u32,
    pub upstream_error: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

// Replace protocol states. Each step consumes the previous state, so a
// create can only follow a successful delete.

struct Pending {
    conversion_id: Uuid,
    code: CertificateCode,
    external_id: String,
    email: String,
    target_product_id: u64,
    final_balance: u32,
}

struct Deleted(Pending);

struct Created {
    issued: IssuedCertificate,
}

impl Pending {
    async fn delete(self, credits: &dyn CreditService) -> ConversionResult<Deleted> {
        credits.delete_certificate(&self.external_id).await?;
        tracing::info!(
            conversion_id = %self.conversion_id,
            code = %self.code,
            external_id = %self.external_id,
            "Offseason certificate deleted"
        );
        Ok(Deleted(self))
    }
}

impl Deleted {
    async fn create(self, credits: &dyn CreditService) -> Result<Created, PartialFailure> {
        let pending = self.0;
        let certificate = NewCertificate {
            code: pending.code.as_str().to_string(),
            product_id: pending.target_product_id,
            email: pending.email.clone(),
        };

        match credits.create_certificate(&certificate).await {
            Ok(issued) => Ok(Created { issued }),
            Err(e) => Err(PartialFailure {
                conversion_id: pending.conversion_id,
                code: pending.code.as_str().to_string(),
                external_id: pending.external_id,
                target_product_id: pending.target_product_id,
                email: pending.email,
                final_balance: pending.final_balance,
                upstream_error: e.to_string(),
                occurred_at: OffsetDateTime::now_utc(),
            }),
        }
    }
}

/// Runs the delete-then-create replace for one certificate at a time
pub struct ConversionCoordinator {
    credits: Arc<dyn CreditService>,
    winter_products: WinterProductTable,
    winter_bucket: String,
    leases: CodeLeases,
}

impl ConversionCoordinator {
    pub fn new(
        credits: Arc<dyn CreditService>,
        winter_products: WinterProductTable,
        winter_bucket: &str,
    ) -> Self {
        Self {
            credits,
            winter_products,
            winter_bucket: winter_bucket.to_string(),
            leases: CodeLeases::new(),
        }
    }

    pub fn leases(&self) -> &CodeLeases {
        &self.leases
    }

    pub async fn convert(&self, request: &ConversionRequest) -> ConversionResult<ConversionReceipt> {
        let code = request.validate()?;
        let _lease = self.leases.try_acquire(code.as_str())?;

        let balance = final_balance(
            request.conversion_type,
            request.current_balance,
            request.adjusted_balance,
            request.other_remaining_balance,
        )?;

        let target_product_id = self.winter_products.product_for(balance).inspect_err(|_| {
            tracing::warn!(
                code = %code,
                final_balance = balance,
                conversion_type = %request.conversion_type,
                "No winter product for final balance"
            );
        })?;

        let pending = Pending {
            conversion_id: Uuid::new_v4(),
            code,
            external_id: request.external_id.trim().to_string(),
            email: request.email.trim().to_string(),
            target_product_id,
            final_balance: balance,
        };

        tracing::info!(
            conversion_id = %pending.conversion_id,
            code = %pending.code,
            conversion_type = %request.conversion_type,
            final_balance = balance,
            target_product_id = target_product_id,
            "Starting certificate conversion"
        );

        let deleted = pending.delete(self.credits.as_ref()).await?;

        let created = deleted
            .create(self.credits.as_ref())
            .await
            .map_err(|record| {
                tracing::error!(
                    conversion_id = %record.conversion_id,
                    code = %record.code,
                    external_id = %record.external_id,
                    target_product_id = record.target_product_id,
                    email = %record.email,
                    final_balance = record.final_balance,
                    upstream_error = %record.upstream_error,
                    "PARTIAL FAILURE: certificate deleted but replacement not created, manual re-issue required"
                );
                ConversionError::PartialFailure(Box::new(record))
            })?;

        let new_balance = created
            .issued
            .remaining_counts
            .get(&self.winter_bucket)
            .copied()
            .unwrap_or(0);

        tracing::info!(
            code = %created.issued.code,
            final_balance = new_balance,
            "Certificate converted"
        );

        Ok(ConversionReceipt {
            code: created.issued.code,
            final_balance: new_balance,
        })
    }
}
