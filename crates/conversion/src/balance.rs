//! Balance arithmetic
//!
//! Pure functions, no I/O. Rates are whole currency units per session.

use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, ConversionResult};
use crate::tiers::PricingTier;

/// What the customer chose to do with their offseason credits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionType {
    /// Paid: every offseason credit becomes a winter credit
    Upgrade,
    /// Free: the balance is reduced to the winter-rate equivalent
    Adjustment,
}

impl ConversionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionType::Upgrade => "upgrade",
            ConversionType::Adjustment => "adjustment",
        }
    }
}

impl std::fmt::Display for ConversionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Price difference for upgrading one offseason session
pub fn cost_per_session(tier: &PricingTier) -> u32 {
    tier.winter_rate.saturating_sub(tier.offseason_rate)
}

pub fn total_upgrade_cost(tier: &PricingTier, remaining_balance: u32) -> u64 {
    u64::from(cost_per_session(tier)) * u64::from(remaining_balance)
}

/// Winter sessions worth the same as the offseason balance, rounded half
/// away from zero. A single remaining session is never kept for free.
pub fn adjusted_balance(tier: &PricingTier, remaining_balance: u32) -> u32 {
    if remaining_balance == 1 || tier.winter_rate == 0 {
        return 0;
    }

    let numerator = u64::from(tier.offseason_rate) * u64::from(remaining_balance);
    let denominator = u64::from(tier.winter_rate);
    let rounded = (2 * numerator + denominator) / (2 * denominator);

    // winter_rate > offseason_rate keeps this within remaining_balance
    u32::try_from(rounded)
        .unwrap_or(remaining_balance)
        .min(remaining_balance)
}

/// Winter balance the replacement certificate must carry
pub fn final_balance(
    conversion_type: ConversionType,
    current_balance: u32,
    adjusted_balance: u32,
    other_remaining_balance: u32,
) -> ConversionResult<u32> {
    let kept = match conversion_type {
        ConversionType::Upgrade => current_balance,
        ConversionType::Adjustment => adjusted_balance,
    };

    kept.checked_add(other_remaining_balance).ok_or_else(|| {
        ConversionError::Validation(format!(
            "Balance {} plus {} other sessions is out of range",
            kept, other_remaining_balance
        ))
    })
}

/// Every priced figure derived from a tier and a remaining balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceQuote {
    pub cost_per_session: u32,
    pub total_upgrade_cost: u64,
    pub adjusted_balance: u32,
}

impl BalanceQuote {
    pub fn for_tier(tier: &PricingTier, remaining_balance: u32) -> Self {
        Self {
            cost_per_session: cost_per_session(tier),
            total_upgrade_cost: total_upgrade_cost(tier, remaining_balance),
            adjusted_balance: adjusted_balance(tier, remaining_balance),
        }
    }
}
