//! Engine configuration
//!
//! Built once at startup. Missing credentials fail here rather than on the
//! first upstream call.

use std::time::Duration;

use crate::client::StripeConfig;
use crate::error::{ConversionError, ConversionResult};
use crate::products::WinterProductTable;
use crate::retry::RetryPolicy;
use crate::tiers::TierTable;

pub const DEFAULT_ACUITY_BASE_URL: &str = "https://acuityscheduling.com/api/v1";
pub const DEFAULT_OFFSEASON_APPOINTMENT_TYPE_ID: &str = "32116738";
pub const DEFAULT_WINTER_APPOINTMENT_TYPE_ID: &str = "25250022";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Acuity Scheduling connection settings
#[derive(Clone)]
pub struct AcuityConfig {
    pub base_url: String,
    pub user_id: String,
    pub api_key: String,
    /// Bucket holding offseason session counts
    pub offseason_appointment_type_id: String,
    /// Bucket holding winter session counts on new certificates
    pub winter_appointment_type_id: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for AcuityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcuityConfig")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .field("api_key", &"[REDACTED]")
            .field("offseason_appointment_type_id", &self.offseason_appointment_type_id)
            .field("winter_appointment_type_id", &self.winter_appointment_type_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Everything the conversion engine needs to run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub acuity: AcuityConfig,
    pub stripe: StripeConfig,
    pub tiers: TierTable,
    pub winter_products: WinterProductTable,
    pub read_retry: RetryPolicy,
    /// Upgrades must present a paid checkout session before converting
    pub require_paid_upgrade: bool,
}

impl EngineConfig {
    pub fn from_env() -> ConversionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> ConversionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| ConversionError::Config(format!("{} must be set", key)))
        };

        let timeout_secs = match get("UPSTREAM_TIMEOUT_SECS") {
            Some(v) => v.parse::<u64>().map_err(|e| {
                ConversionError::Config(format!("UPSTREAM_TIMEOUT_SECS '{}': {}", v, e))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(ConversionError::Config(
                "UPSTREAM_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        let timeout = Duration::from_secs(timeout_secs);

        let max_attempts = match get("READ_RETRY_ATTEMPTS") {
            Some(v) => v.parse::<u32>().map_err(|e| {
                ConversionError::Config(format!("READ_RETRY_ATTEMPTS '{}': {}", v, e))
            })?,
            None => RetryPolicy::default().max_attempts,
        }
        .max(1);

        let require_paid_upgrade = match get("REQUIRE_PAID_UPGRADE") {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                ConversionError::Config(format!("REQUIRE_PAID_UPGRADE '{}' is not a boolean", v))
            })?,
            None => true,
        };

        let acuity = AcuityConfig {
            base_url: get("ACUITY_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ACUITY_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            user_id: require("ACUITY_USER_ID")?,
            api_key: require("ACUITY_API_KEY")?,
            offseason_appointment_type_id: get("ACUITY_OFFSEASON_APPOINTMENT_TYPE_ID")
                .unwrap_or_else(|| DEFAULT_OFFSEASON_APPOINTMENT_TYPE_ID.to_string()),
            winter_appointment_type_id: get("ACUITY_WINTER_APPOINTMENT_TYPE_ID")
                .unwrap_or_else(|| DEFAULT_WINTER_APPOINTMENT_TYPE_ID.to_string()),
            timeout,
        };

        let stripe = StripeConfig {
            secret_key: require("STRIPE_SECRET_KEY")?,
            app_base_url: require("APP_BASE_URL")?.trim_end_matches('/').to_string(),
            timeout,
        };

        let winter_products: WinterProductTable = require("WINTER_PRODUCT_IDS")?.parse()?;

        Ok(Self {
            acuity,
            stripe,
            tiers: TierTable::standard(),
            winter_products,
            read_retry: RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
            require_paid_upgrade,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        vars(&[
            ("ACUITY_USER_ID", "12345"),
            ("ACUITY_API_KEY", "acuity-secret"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("APP_BASE_URL", "https://upgrade.example.com/"),
            ("WINTER_PRODUCT_IDS", "1:1800001,2:1800002"),
        ])
    }

    #[test]
    fn test_defaults_applied() {
        let env = complete();
        let config = EngineConfig::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.acuity.base_url, DEFAULT_ACUITY_BASE_URL);
        assert_eq!(config.acuity.offseason_appointment_type_id, "32116738");
        assert_eq!(config.acuity.winter_appointment_type_id, "25250022");
        assert_eq!(config.acuity.timeout, Duration::from_secs(10));
        assert_eq!(config.stripe.app_base_url, "https://upgrade.example.com");
        assert_eq!(config.read_retry.max_attempts, 3);
        assert!(config.require_paid_upgrade);
        assert_eq!(config.winter_products.len(), 2);
    }

    #[test]
    fn test_missing_acuity_credentials_fail_fast() {
        for key in ["ACUITY_USER_ID", "ACUITY_API_KEY"] {
            let mut env = complete();
            env.remove(key);
            let err = EngineConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
            assert!(matches!(err, ConversionError::Config(_)));
            assert!(err.to_string().contains(key), "{}", err);
        }
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let mut env = complete();
        env.insert("STRIPE_SECRET_KEY".to_string(), "   ".to_string());
        let err = EngineConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("STRIPE_SECRET_KEY"));
    }

    #[test]
    fn test_overrides() {
        let mut env = complete();
        env.insert("UPSTREAM_TIMEOUT_SECS".into(), "3".into());
        env.insert("READ_RETRY_ATTEMPTS".into(), "0".into());
        env.insert("REQUIRE_PAID_UPGRADE".into(), "false".into());
        env.insert("ACUITY_API_BASE_URL".into(), "http://localhost:9999/api/v1/".into());

        let config = EngineConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.acuity.timeout, Duration::from_secs(3));
        assert_eq!(config.read_retry.max_attempts, 1);
        assert!(!config.require_paid_upgrade);
        assert_eq!(config.acuity.base_url, "http://localhost:9999/api/v1");
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let mut env = complete();
        env.insert("UPSTREAM_TIMEOUT_SECS".into(), "0".into());
        assert!(EngineConfig::from_lookup(|k| env.get(k).cloned()).is_err());

        let mut env = complete();
        env.insert("REQUIRE_PAID_UPGRADE".into(), "maybe".into());
        assert!(EngineConfig::from_lookup(|k| env.get(k).cloned()).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let env = complete();
        let config = EngineConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("acuity-secret"));
        assert!(!debug.contains("sk_test_123"));
        assert!(debug.contains("[REDACTED]"));
    }
}
