//! Winter package products
//!
//! The replacement certificate is issued under the winter product whose
//! package size equals the final balance. Sizes without a product cannot be
//! issued.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{ConversionError, ConversionResult};

/// Sparse mapping from session count to winter product id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WinterProductTable {
    by_sessions: BTreeMap<u32, u64>,
}

impl WinterProductTable {
    pub fn new(entries: impl IntoIterator<Item = (u32, u64)>) -> ConversionResult<Self> {
        let mut by_sessions = BTreeMap::new();
        for (sessions, product_id) in entries {
            if sessions == 0 {
                return Err(ConversionError::Config(
                    "winter packages must hold at least one session".to_string(),
                ));
            }
            if by_sessions.insert(sessions, product_id).is_some() {
                return Err(ConversionError::Config(format!(
                    "duplicate winter product for {} sessions",
                    sessions
                )));
            }
        }
        Ok(Self { by_sessions })
    }

    /// Winter product holding exactly `sessions` sessions
    pub fn product_for(&self, sessions: u32) -> ConversionResult<u64> {
        self.by_sessions
            .get(&sessions)
            .copied()
            .ok_or(ConversionError::InvalidBalance(sessions))
    }

    /// Largest package on offer
    pub fn max_sessions(&self) -> Option<u32> {
        self.by_sessions.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.by_sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sessions.is_empty()
    }
}

/// Parses `sessions:product_id` pairs separated by commas, e.g. `1:1800001,2:1800002`
impl FromStr for WinterProductTable {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (sessions, product_id) = pair.split_once(':').ok_or_else(|| {
                ConversionError::Config(format!(
                    "winter product entry '{}' is not sessions:product_id",
                    pair
                ))
            })?;
            let sessions: u32 = sessions.trim().parse().map_err(|e| {
                ConversionError::Config(format!("invalid session count '{}': {}", sessions, e))
            })?;
            let product_id: u64 = product_id.trim().parse().map_err(|e| {
                ConversionError::Config(format!("invalid product id '{}': {}", product_id, e))
            })?;
            entries.push((sessions, product_id));
        }

        let table = Self::new(entries)?;
        if table.is_empty() {
            return Err(ConversionError::Config(
                "at least one winter product is required".to_string(),
            ));
        }
        Ok(table)
    }
}
