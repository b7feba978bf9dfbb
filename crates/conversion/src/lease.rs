//! Per-certificate conversion leases
//!
//! At most one conversion may run for a given code in this process. A second
//! attempt fails immediately instead of queueing behind the first.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ConversionError, ConversionResult};

#[derive(Debug, Default, Clone)]
pub struct CodeLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

impl CodeLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn try_acquire(&self, code: &str) -> ConversionResult<Lease> {
        if !self.lock().insert(code.to_string()) {
            tracing::warn!(code = %code, "Conversion already in progress");
            return Err(ConversionError::ConversionInProgress(code.to_string()));
        }
        Ok(Lease {
            leases: self.clone(),
            code: code.to_string(),
        })
    }

    pub fn is_held(&self, code: &str) -> bool {
        self.lock().contains(code)
    }
}

/// Released when dropped, on every exit path
#[derive(Debug)]
pub struct Lease {
    leases: CodeLeases,
    code: String,
}

impl Lease {
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.leases.lock().remove(&self.code);
    }
}
