// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Offseason Conversion Engine
//!
//! Converts offseason session credits on Acuity certificates into winter
//! credits.
//!
//! ## Features
//!
//! - **Validation**: Look a certificate up and price both conversion options
//! - **Upgrade**: Pay the tier's price difference and keep every session
//! - **Adjustment**: Keep the winter-rate equivalent of the balance for free
//! - **Checkout**: Stripe checkout sessions for upgrades, and payment confirmation
//! - **Replace protocol**: Delete-then-create with partial failure records

pub mod acuity;
pub mod balance;
pub mod certificate;
pub mod checkout;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lease;
pub mod products;
pub mod retry;
pub mod tiers;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;


use std::sync::Arc;

// Acuity
pub use acuity::{AcuityClient, CertificateLookup, CreditService, IssuedCertificate, NewCertificate};

// Balance
pub use balance::{BalanceQuote, ConversionType};

// Certificate
pub use certificate::{CertificateCode, CertificateValidator, PricedCertificate};

// Checkout
pub use checkout::{CheckoutBridge, CheckoutResponse, PaymentGateway, StripeGateway};

// Client
pub use client::{StripeClient, StripeConfig};

// Config
pub use config::{AcuityConfig, EngineConfig};

// Coordinator
pub use coordinator::{ConversionCoordinator, ConversionReceipt, ConversionRequest, PartialFailure};

// Error
pub use error::{ConversionError, ConversionResult, ErrorClass};

// Products
pub use products::WinterProductTable;

// Retry
pub use retry::RetryPolicy;

// Tiers
pub use tiers::{PricingTier, TierTable};

/// Main conversion service that combines validation, checkout and conversion
pub struct ConversionService {
    pub validator: CertificateValidator,
    pub checkout: CheckoutBridge,
    pub coordinator: ConversionCoordinator,
    pub require_paid_upgrade: bool,
}

impl ConversionService {
    /// Create the service against the live Acuity and Stripe APIs
    pub fn from_config(config: EngineConfig) -> ConversionResult<Self> {
        let credits = Arc::new(AcuityClient::new(config.acuity.clone())?);
        let gateway = Arc::new(StripeGateway::new(StripeClient::new(config.stripe.clone())));
        Ok(Self::new(config, credits, gateway))
    }

    /// Create the service with explicit upstream clients
    pub fn new(
        config: EngineConfig,
        credits: Arc<dyn CreditService>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let EngineConfig {
            acuity,
            stripe,
            tiers,
            winter_products,
            read_retry,
            require_paid_upgrade,
        } = config;

        Self {
            validator: CertificateValidator::new(
                credits.clone(),
                tiers.clone(),
                &acuity.offseason_appointment_type_id,
                read_retry,
            ),
            checkout: CheckoutBridge::new(gateway, tiers, &stripe.app_base_url, read_retry),
            coordinator: ConversionCoordinator::new(
                credits,
                winter_products,
                &acuity.winter_appointment_type_id,
            ),
            require_paid_upgrade,
        }
    }

    /// Convert a certificate after checking it against Acuity again and,
    /// for upgrades, confirming the checkout session was paid at the
    /// certificate's tier
    pub async fn convert(
        &self,
        request: &ConversionRequest,
        checkout_session_id: Option<&str>,
    ) -> ConversionResult<ConversionReceipt> {
        request.validate()?;

        let current = self.validator.validate(&request.code).await?;
        current.confirm(request)?;

        if request.conversion_type == ConversionType::Upgrade && self.require_paid_upgrade {
            self.checkout
                .confirm_payment(
                    checkout_session_id.unwrap_or_default(),
                    &request.code,
                    &current.tier,
                )
                .await?;
        }

        self.coordinator.convert(request).await
    }
}
