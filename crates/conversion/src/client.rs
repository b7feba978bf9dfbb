//! Stripe client wrapper

use std::time::Duration;

use stripe::Client;

/// Stripe configuration
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Public base URL of the upgrade site, used for checkout callbacks
    pub app_base_url: String,
    /// Per-request timeout for Stripe calls
    pub timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("app_base_url", &self.app_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Shared Stripe API client
#[derive(Clone)]
pub struct StripeClient {
    inner: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = Client::new(config.secret_key.clone());
        Self { inner, config }
    }

    /// Raw async-stripe client for API calls
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
