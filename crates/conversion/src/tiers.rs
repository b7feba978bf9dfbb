//! Pricing tiers
//!
//! Every offseason product belongs to exactly one tier. A tier fixes the
//! per-session rate paid for an offseason credit and the full winter rate,
//! which together drive the upgrade cost and the free reduced balance.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{ConversionError, ConversionResult};

/// Tier used when a certificate with remaining sessions carries a product
/// that no tier lists.
pub const DEFAULT_TIER_NAME: &str = "TIER_1";

/// A pricing bracket of offseason products sharing one rate pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTier {
    pub name: String,
    pub product_ids: Vec<u64>,
    /// Per-session rate paid for an offseason credit
    pub offseason_rate: u32,
    /// Per-session rate of a non-expiring winter credit
    pub winter_rate: u32,
}

impl PricingTier {
    pub fn new(name: &str, product_ids: &[u64], offseason_rate: u32, winter_rate: u32) -> Self {
        Self {
            name: name.to_string(),
            product_ids: product_ids.to_vec(),
            offseason_rate,
            winter_rate,
        }
    }

    pub fn contains(&self, product_id: u64) -> bool {
        self.product_ids.contains(&product_id)
    }

    /// Stripe price lookup key for upgrading a credit in this tier
    pub fn lookup_key(&self) -> String {
        format!("OFFSEASON_UPGRADE_{}", self.name)
    }
}

/// Ordered, validated tier table
#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: Vec<PricingTier>,
    default_index: usize,
}

impl TierTable {
    /// Build a table, rejecting overlapping product ids, rate pairs where the
    /// winter rate does not exceed the offseason rate, and a default tier name
    /// that is not in the table.
    pub fn new(tiers: Vec<PricingTier>, default_tier: &str) -> ConversionResult<Self> {
        let mut seen = HashSet::new();
        for tier in &tiers {
            if tier.winter_rate <= tier.offseason_rate {
                return Err(ConversionError::Config(format!(
                    "{}: winter rate {} must exceed offseason rate {}",
                    tier.name, tier.winter_rate, tier.offseason_rate
                )));
            }
            for product_id in &tier.product_ids {
                if !seen.insert(*product_id) {
                    return Err(ConversionError::Config(format!(
                        "product {} is listed in more than one tier",
                        product_id
                    )));
                }
            }
        }

        let default_index = tiers
            .iter()
            .position(|t| t.name == default_tier)
            .ok_or_else(|| {
                ConversionError::Config(format!("default tier {} is not defined", default_tier))
            })?;

        Ok(Self {
            tiers,
            default_index,
        })
    }

    /// The production tier table
    pub fn standard() -> Self {
        Self {
            tiers: vec![
                PricingTier::new(
                    "TIER_1",
                    &[
                        1268093, 1728941, 1728943, 1728945, 1728946, 1728947, 1742285, 1742301,
                        1742312,
                    ],
                    110,
                    165,
                ),
                PricingTier::new(
                    "TIER_2",
                    &[
                        1268102, 1268103, 1750655, 1742289, 1742291, 1742304, 1742306, 1742313,
                        1742315, 1742361, 1742362,
                    ],
                    100,
                    145,
                ),
                PricingTier::new(
                    "TIER_3",
                    &[
                        1268104, 1268105, 1742293, 1742298, 1742307, 1742310, 1742317, 1742321,
                        1742365, 1742368, 1742370, 1742372, 1742374, 1742375,
                    ],
                    90,
                    130,
                ),
            ],
            default_index: 0,
        }
    }

    pub fn tiers(&self) -> &[PricingTier] {
        &self.tiers
    }

    pub fn default_tier(&self) -> &PricingTier {
        &self.tiers[self.default_index]
    }

    /// First tier listing the product, if any
    pub fn find(&self, product_id: u64) -> Option<&PricingTier> {
        self.tiers.iter().find(|t| t.contains(product_id))
    }

    /// Resolve the tier for a certificate.
    ///
    /// An unlisted product still resolves to the default tier while the
    /// certificate has offseason sessions left; with none left it is
    /// `NoRemainingSessions`.
    pub fn resolve(&self, product_id: u64, remaining_balance: u32) -> ConversionResult<&PricingTier> {
        if let Some(tier) = self.find(product_id) {
            return Ok(tier);
        }

        if remaining_balance > 0 {
            let tier = self.default_tier();
            tracing::warn!(
                product_id = product_id,
                remaining_balance = remaining_balance,
                default_tier = %tier.name,
                "No tier lists this product, falling back to default tier"
            );
            return Ok(tier);
        }

        Err(ConversionError::NoRemainingSessions {
            code: "no_remaining_sessions".to_string(),
            message: "No remaining sessions found for certificate".to_string(),
        })
    }

    /// Look a tier up by name. Accepts `TIER_2`, `tier_2` or the bare `2`.
    pub fn find_by_name(&self, name: &str) -> ConversionResult<&PricingTier> {
        let trimmed = name.trim();
        let normalized = if trimmed.chars().all(|c| c.is_ascii_digit()) && !trimmed.is_empty() {
            format!("TIER_{}", trimmed)
        } else {
            trimmed.to_ascii_uppercase()
        };

        self.tiers
            .iter()
            .find(|t| t.name == normalized)
            .ok_or_else(|| ConversionError::TierResolution(format!("tier {}", name)))
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_is_valid() {
        let standard = TierTable::standard();
        let rebuilt = TierTable::new(standard.tiers().to_vec(), DEFAULT_TIER_NAME);
        assert!(rebuilt.is_ok(), "standard table must pass validation");
        assert_eq!(standard.default_tier().name, DEFAULT_TIER_NAME);
    }

    #[test]
    fn test_every_product_resolves_to_exactly_one_tier() {
        let table = TierTable::standard();
        for tier in table.tiers() {
            for product_id in &tier.product_ids {
                let owners: Vec<_> = table
                    .tiers()
                    .iter()
                    .filter(|t| t.contains(*product_id))
                    .collect();
                assert_eq!(owners.len(), 1, "product {} has {} owners", product_id, owners.len());
                assert_eq!(table.resolve(*product_id, 0).unwrap().name, tier.name);
            }
        }
    }

    #[test]
    fn test_overlapping_products_rejected() {
        let tiers = vec![
            PricingTier::new("TIER_1", &[1, 2], 110, 165),
            PricingTier::new("TIER_2", &[2, 3], 100, 145),
        ];
        let err = TierTable::new(tiers, "TIER_1").unwrap_err();
        assert!(err.to_string().contains("product 2"));
    }

    #[test]
    fn test_non_increasing_rates_rejected() {
        let tiers = vec![PricingTier::new("TIER_1", &[1], 150, 150)];
        assert!(matches!(
            TierTable::new(tiers, "TIER_1"),
            Err(ConversionError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_default_rejected() {
        let tiers = vec![PricingTier::new("TIER_1", &[1], 110, 165)];
        assert!(TierTable::new(tiers, "TIER_9").is_err());
    }

    #[test]
    fn test_resolve_known_products() {
        let table = TierTable::standard();
        assert_eq!(table.resolve(1742301, 3).unwrap().name, "TIER_1");
        assert_eq!(table.resolve(1750655, 3).unwrap().name, "TIER_2");
        assert_eq!(table.resolve(1742375, 3).unwrap().name, "TIER_3");
    }

    #[test]
    fn test_unknown_product_with_balance_uses_default() {
        let table = TierTable::standard();
        let tier = table.resolve(999_999, 4).unwrap();
        assert_eq!(tier.name, "TIER_1");
        assert_eq!(tier.offseason_rate, 110);
        assert_eq!(tier.winter_rate, 165);
    }

    #[test]
    fn test_unknown_product_without_balance_fails() {
        let table = TierTable::standard();
        let err = table.resolve(999_999, 0).unwrap_err();
        assert_eq!(err.error_code(), "no_remaining_sessions");
        assert_eq!(err.to_string(), "No remaining sessions found for certificate");
    }

    #[test]
    fn test_find_by_name_variants() {
        let table = TierTable::standard();
        assert_eq!(table.find_by_name("TIER_2").unwrap().name, "TIER_2");
        assert_eq!(table.find_by_name("tier_3").unwrap().name, "TIER_3");
        assert_eq!(table.find_by_name(" 1 ").unwrap().name, "TIER_1");
        assert!(matches!(
            table.find_by_name("4"),
            Err(ConversionError::TierResolution(_))
        ));
        assert!(table.find_by_name("").is_err());
    }

    #[test]
    fn test_lookup_key() {
        let table = TierTable::standard();
        assert_eq!(
            table.find_by_name("2").unwrap().lookup_key(),
            "OFFSEASON_UPGRADE_TIER_2"
        );
    }
}
