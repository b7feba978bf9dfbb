//! Certificate validation and pricing

use std::sync::Arc;

use serde::Serialize;

use crate::acuity::{CertificateLookup, CreditService};
use crate::balance::{BalanceQuote, ConversionType};
use crate::coordinator::ConversionRequest;
use crate::error::{ConversionError, ConversionResult};
use crate::retry::{retry_read, RetryPolicy};
use crate::tiers::TierTable;

pub const CERTIFICATE_CODE_LEN: usize = 8;

/// Normalized certificate code: 8 alphanumeric characters, upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CertificateCode(String);

impl CertificateCode {
    pub fn parse(raw: &str) -> ConversionResult<Self> {
        let code = raw.trim().to_ascii_uppercase();
        if code.chars().count() != CERTIFICATE_CODE_LEN {
            return Err(ConversionError::Validation(format!(
                "Certificate code must be exactly {} characters",
                CERTIFICATE_CODE_LEN
            )));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConversionError::Validation(
                "Certificate code may only contain letters and digits".to_string(),
            ));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CertificateCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Certificate with every conversion option priced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedCertificate {
    pub code: CertificateCode,
    /// Acuity id, required for conversion
    pub id: String,
    /// Offseason sessions left
    pub remaining_balance: u32,
    pub product_id: u64,
    pub tier: String,
    pub cost_per_session: u32,
    #[serde(rename = "totalCost")]
    pub total_upgrade_cost: u64,
    pub adjusted_balance: u32,
    /// Sessions held under non-offseason appointment types
    pub other_remaining_balance: u32,
}

impl PricedCertificate {
    /// Conversion request matching this priced view
    pub fn conversion_request(
        &self,
        conversion_type: ConversionType,
        email: &str,
    ) -> ConversionRequest {
        ConversionRequest {
            conversion_type,
            code: self.code.as_str().to_string(),
            external_id: self.id.clone(),
            email: email.to_string(),
            current_balance: self.remaining_balance,
            adjusted_balance: self.adjusted_balance,
            other_remaining_balance: self.other_remaining_balance,
        }
    }

    /// Reject a request whose figures no longer match the certificate
    pub fn confirm(&self, request: &ConversionRequest) -> ConversionResult<()> {
        let matches = request.external_id == self.id
            && request.current_balance == self.remaining_balance
            && request.adjusted_balance == self.adjusted_balance
            && request.other_remaining_balance == self.other_remaining_balance;

        if matches {
            Ok(())
        } else {
            tracing::warn!(
                code = %self.code,
                requested_id = %request.external_id,
                current_id = %self.id,
                requested_balance = request.current_balance,
                current_balance = self.remaining_balance,
                "Conversion request does not match certificate"
            );
            Err(ConversionError::Validation(
                "Certificate balance has changed, please check the certificate again".to_string(),
            ))
        }
    }
}

/// Looks certificates up and prices their conversion options
pub struct CertificateValidator {
    credits: Arc<dyn CreditService>,
    tiers: TierTable,
    offseason_bucket: String,
    retry: RetryPolicy,
}

impl CertificateValidator {
    pub fn new(
        credits: Arc<dyn CreditService>,
        tiers: TierTable,
        offseason_bucket: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            credits,
            tiers,
            offseason_bucket: offseason_bucket.to_string(),
            retry,
        }
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub async fn validate(&self, raw_code: &str) -> ConversionResult<PricedCertificate> {
        let code = CertificateCode::parse(raw_code)?;

        let lookup = retry_read(&self.retry, "certificate_check", || {
            self.credits.check_certificate(&code)
        })
        .await
        .map_err(|e| match e {
            ConversionError::UpstreamUnavailable(msg) | ConversionError::MalformedResponse(msg) => {
                tracing::error!(code = %code, error = %msg, "Certificate validation failed");
                ConversionError::ValidationFailed(msg)
            }
            other => other,
        })?;

        self.price(code, lookup)
    }

    /// Price a looked-up certificate
    pub fn price(
        &self,
        code: CertificateCode,
        lookup: CertificateLookup,
    ) -> ConversionResult<PricedCertificate> {
        let remaining_balance = lookup
            .remaining_counts
            .get(&self.offseason_bucket)
            .copied()
            .unwrap_or(0);

        let other_remaining_balance = lookup
            .remaining_counts
            .iter()
            .filter(|(bucket, _)| **bucket != self.offseason_bucket)
            .fold(0u32, |sum, (_, count)| sum.saturating_add(*count));

        let tier = self.tiers.resolve(lookup.product_id, remaining_balance)?;
        let quote = BalanceQuote::for_tier(tier, remaining_balance);

        tracing::info!(
            code = %code,
            product_id = lookup.product_id,
            tier = %tier.name,
            remaining_balance = remaining_balance,
            other_remaining_balance = other_remaining_balance,
            "Certificate priced"
        );

        Ok(PricedCertificate {
            code,
            id: lookup.external_id,
            remaining_balance,
            product_id: lookup.product_id,
            tier: tier.name.clone(),
            cost_per_session: quote.cost_per_session,
            total_upgrade_cost: quote.total_upgrade_cost,
            adjusted_balance: quote.adjusted_balance,
            other_remaining_balance,
        })
    }
}
