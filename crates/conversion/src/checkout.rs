//! Stripe checkout for paid upgrades
//!
//! Each tier has one active Stripe price, found by its lookup key. The
//! checkout session carries the certificate code in its metadata and in
//! both callback URLs so the convert step can confirm payment.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use stripe::{
    CheckoutSession, CheckoutSessionId, CheckoutSessionMode, CheckoutSessionPaymentStatus,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, ListPrices, Price,
};

use crate::certificate::CertificateCode;
use crate::client::StripeClient;
use crate::coordinator::is_valid_email;
use crate::error::{ConversionError, ConversionResult};
use crate::retry::{retry_read, RetryPolicy};
use crate::tiers::TierTable;

pub const METADATA_CERTIFICATE_CODE: &str = "certificateCode";
pub const METADATA_TIER: &str = "tier";

/// Parameters for a hosted checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub price_id: String,
    pub customer_email: String,
    pub client_reference_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub id: String,
    pub paid: bool,
    pub metadata: HashMap<String, String>,
}

/// Payment provider operations used by the checkout bridge
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ids of active prices carrying `lookup_key`
    async fn find_active_prices(&self, lookup_key: &str) -> ConversionResult<Vec<String>>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> ConversionResult<HostedSession>;

    async fn retrieve_checkout_session(&self, session_id: &str) -> ConversionResult<SessionStatus>;
}

/// [`PaymentGateway`] backed by the Stripe API
pub struct StripeGateway {
    stripe: StripeClient,
}

impl StripeGateway {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    fn timeout(&self) -> Duration {
        self.stripe.config().timeout
    }
}

async fn with_timeout<T, Fut>(timeout: Duration, operation: &str, call: Fut) -> ConversionResult<T>
where
    Fut: Future<Output = Result<T, stripe::StripeError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(|e| {
            tracing::error!(operation = operation, error = %e, "Stripe request failed");
            ConversionError::from(e)
        }),
        Err(_) => Err(ConversionError::UpstreamUnavailable(format!(
            "Stripe {} timed out after {}s",
            operation,
            timeout.as_secs()
        ))),
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn find_active_prices(&self, lookup_key: &str) -> ConversionResult<Vec<String>> {
        let mut params = ListPrices::new();
        params.active = Some(true);
        params.lookup_keys = Some(vec![lookup_key.to_string()]);

        let prices = with_timeout(
            self.timeout(),
            "list_prices",
            Price::list(self.stripe.inner(), &params),
        )
        .await?;

        Ok(prices.data.into_iter().map(|price| price.id.to_string()).collect())
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> ConversionResult<HostedSession> {
        let params = CreateCheckoutSession {
            mode: Some(CheckoutSessionMode::Payment),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(request.price_id.clone()),
                quantity: Some(1),
                ..Default::default()
            }]),
            customer_email: Some(&request.customer_email),
            client_reference_id: Some(&request.client_reference_id),
            success_url: Some(&request.success_url),
            cancel_url: Some(&request.cancel_url),
            metadata: Some(request.metadata.clone()),
            ..Default::default()
        };

        let session = with_timeout(
            self.timeout(),
            "create_checkout_session",
            CheckoutSession::create(self.stripe.inner(), params),
        )
        .await?;

        let url = session.url.ok_or_else(|| {
            ConversionError::MalformedResponse(format!(
                "checkout session {} has no redirect URL",
                session.id
            ))
        })?;

        Ok(HostedSession {
            id: session.id.to_string(),
            url,
        })
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> ConversionResult<SessionStatus> {
        let id = session_id.parse::<CheckoutSessionId>().map_err(|e| {
            ConversionError::Validation(format!("Invalid checkout session id: {}", e))
        })?;

        let session = with_timeout(
            self.timeout(),
            "retrieve_checkout_session",
            CheckoutSession::retrieve(self.stripe.inner(), &id, &[]),
        )
        .await?;

        Ok(SessionStatus {
            id: session.id.to_string(),
            paid: session.payment_status == CheckoutSessionPaymentStatus::Paid,
            metadata: session.metadata.unwrap_or_default(),
        })
    }
}

/// Redirect target for the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

/// Starts and confirms upgrade payments
pub struct CheckoutBridge {
    gateway: Arc<dyn PaymentGateway>,
    tiers: TierTable,
    app_base_url: String,
    retry: RetryPolicy,
}

impl CheckoutBridge {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        tiers: TierTable,
        app_base_url: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            tiers,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
            retry,
        }
    }

    /// Create a checkout session for upgrading `code` and return its URL
    pub async fn create_session(
        &self,
        tier: &str,
        code: &str,
        email: &str,
    ) -> ConversionResult<CheckoutResponse> {
        let tier = self.tiers.find_by_name(tier)?;
        let code = CertificateCode::parse(code)?;
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(ConversionError::Validation(format!(
                "Invalid email address: {}",
                email
            )));
        }

        let lookup_key = tier.lookup_key();
        let prices = retry_read(&self.retry, "list_prices", || {
            self.gateway.find_active_prices(&lookup_key)
        })
        .await?;

        let price_id = match prices.as_slice() {
            [only] => only.clone(),
            [] => {
                tracing::error!(lookup_key = %lookup_key, "No active price for lookup key");
                return Err(ConversionError::PriceNotFound(lookup_key));
            }
            _ => {
                tracing::error!(
                    lookup_key = %lookup_key,
                    matches = prices.len(),
                    "Lookup key matches more than one active price"
                );
                return Err(ConversionError::PriceNotFound(lookup_key));
            }
        };

        let mut metadata = HashMap::new();
        metadata.insert(METADATA_CERTIFICATE_CODE.to_string(), code.as_str().to_string());
        metadata.insert(METADATA_TIER.to_string(), tier.name.clone());

        let request = CheckoutSessionRequest {
            price_id,
            customer_email: email.to_string(),
            client_reference_id: code.as_str().to_string(),
            success_url: format!(
                "{}/success?session_id={{CHECKOUT_SESSION_ID}}&certificate={}",
                self.app_base_url, code
            ),
            cancel_url: format!(
                "{}?canceled=true&session_id={{CHECKOUT_SESSION_ID}}&certificate={}",
                self.app_base_url, code
            ),
            metadata,
        };

        tracing::info!(
            code = %code,
            tier = %tier.name,
            price_id = %request.price_id,
            "Creating upgrade checkout session"
        );

        // Not retried: a retry after a lost response would open a second session
        let session = self.gateway.create_checkout_session(&request).await?;

        tracing::info!(code = %code, session_id = %session.id, "Created upgrade checkout session");

        Ok(CheckoutResponse { url: session.url })
    }

    /// Succeeds only if `session_id` is a paid checkout for `code` at `tier`
    pub async fn confirm_payment(
        &self,
        session_id: &str,
        code: &str,
        tier: &str,
    ) -> ConversionResult<()> {
        let code = CertificateCode::parse(code)?;
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(ConversionError::PaymentNotCompleted(
                "missing checkout session".to_string(),
            ));
        }

        let status = retry_read(&self.retry, "retrieve_checkout_session", || {
            self.gateway.retrieve_checkout_session(session_id)
        })
        .await?;

        let paid_for = status.metadata.get(METADATA_CERTIFICATE_CODE).map(String::as_str);
        let paid_tier = status.metadata.get(METADATA_TIER).map(String::as_str);
        if !status.paid || paid_for != Some(code.as_str()) || paid_tier != Some(tier) {
            tracing::warn!(
                code = %code,
                tier = %tier,
                session_id = %status.id,
                paid = status.paid,
                paid_for = ?paid_for,
                paid_tier = ?paid_tier,
                "Checkout session does not cover this certificate"
            );
            return Err(ConversionError::PaymentNotCompleted(status.id));
        }

        tracing::info!(code = %code, session_id = %status.id, "Upgrade payment confirmed");
        Ok(())
    }
}
