//! Application state

use std::sync::Arc;

use offseason_conversion::{ConversionResult, ConversionService};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub conversion: Arc<ConversionService>,
}

impl AppState {
    /// Connect to the live upstream services
    pub fn from_config(config: &Config) -> ConversionResult<Self> {
        let service = ConversionService::from_config(config.engine.clone())?;
        Ok(Self::new(service))
    }

    pub fn new(conversion: ConversionService) -> Self {
        Self {
            conversion: Arc::new(conversion),
        }
    }
}
