//! In-memory fakes for the upstream seams
//!
//! Compiled for this crate's tests and, behind the `test-util` feature, for
//! dependent crates.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::acuity::{CertificateLookup, CreditService, IssuedCertificate, NewCertificate};
use crate::certificate::CertificateCode;
use crate::checkout::{
    CheckoutSessionRequest, HostedSession, PaymentGateway, SessionStatus, METADATA_CERTIFICATE_CODE,
    METADATA_TIER,
};
use crate::config::DEFAULT_WINTER_APPOINTMENT_TYPE_ID;
use crate::error::{ConversionError, ConversionResult};

/// Scriptable [`CreditService`] that records every write
#[derive(Default)]
pub struct FakeCreditService {
    lookup: Option<CertificateLookup>,
    check_failures: AtomicU32,
    checks: AtomicU32,
    issued_balance: Option<u32>,
    delete_error: Mutex<Option<ConversionError>>,
    create_error: Mutex<Option<ConversionError>>,
    delete_gate: Option<Arc<Notify>>,
    deleted: Mutex<Vec<String>>,
    created: Mutex<Vec<NewCertificate>>,
}

impl FakeCreditService {
    pub fn with_lookup(lookup: CertificateLookup) -> Self {
        Self {
            lookup: Some(lookup),
            ..Self::default()
        }
    }

    /// Fail the next `n` lookups with a retryable error
    pub fn failing_checks(self, n: u32) -> Self {
        self.check_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Winter sessions reported on created certificates
    pub fn issuing(mut self, sessions: u32) -> Self {
        self.issued_balance = Some(sessions);
        self
    }

    pub fn failing_delete(self, err: ConversionError) -> Self {
        *self.delete_error.lock().unwrap() = Some(err);
        self
    }

    pub fn failing_create(self, err: ConversionError) -> Self {
        *self.create_error.lock().unwrap() = Some(err);
        self
    }

    /// Hold every delete until `gate` is notified
    pub fn gated_delete(mut self, gate: Arc<Notify>) -> Self {
        self.delete_gate = Some(gate);
        self
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<NewCertificate> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl CreditService for FakeCreditService {
    async fn check_certificate(&self, _code: &CertificateCode) -> ConversionResult<CertificateLookup> {
        self.checks.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .check_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ConversionError::UpstreamUnavailable(
                "certificate check: HTTP 503".to_string(),
            ));
        }

        self.lookup
            .clone()
            .ok_or_else(|| ConversionError::CertificateNotFound {
                code: "invalid_certificate".to_string(),
                message: "Certificate not found".to_string(),
            })
    }

    async fn delete_certificate(&self, external_id: &str) -> ConversionResult<()> {
        if let Some(gate) = &self.delete_gate {
            gate.notified().await;
        }
        if let Some(err) = self.delete_error.lock().unwrap().take() {
            return Err(err);
        }
        self.deleted.lock().unwrap().push(external_id.to_string());
        Ok(())
    }

    async fn create_certificate(
        &self,
        certificate: &NewCertificate,
    ) -> ConversionResult<IssuedCertificate> {
        self.created.lock().unwrap().push(certificate.clone());
        if let Some(err) = self.create_error.lock().unwrap().take() {
            return Err(err);
        }

        let mut remaining_counts = HashMap::new();
        if let Some(sessions) = self.issued_balance {
            remaining_counts.insert(DEFAULT_WINTER_APPOINTMENT_TYPE_ID.to_string(), sessions);
        }
        Ok(IssuedCertificate {
            code: certificate.code.clone(),
            remaining_counts,
        })
    }
}

/// Scriptable [`PaymentGateway`]
#[derive(Default)]
pub struct FakeGateway {
    prices: HashMap<String, Vec<String>>,
    price_failures: AtomicU32,
    price_lookups: AtomicU32,
    fail_session_create: bool,
    sessions: Mutex<Vec<CheckoutSessionRequest>>,
    statuses: HashMap<String, SessionStatus>,
}

impl FakeGateway {
    pub fn with_price(mut self, lookup_key: &str, price_id: &str) -> Self {
        self.prices
            .entry(lookup_key.to_string())
            .or_default()
            .push(price_id.to_string());
        self
    }

    pub fn failing_price_lookups(self, n: u32) -> Self {
        self.price_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_session_create(mut self) -> Self {
        self.fail_session_create = true;
        self
    }

    /// Existing checkout session paid (or not) for `code` at `tier`
    pub fn with_session(mut self, session_id: &str, paid: bool, code: &str, tier: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_CERTIFICATE_CODE.to_string(), code.to_string());
        metadata.insert(METADATA_TIER.to_string(), tier.to_string());
        self.statuses.insert(
            session_id.to_string(),
            SessionStatus {
                id: session_id.to_string(),
                paid,
                metadata,
            },
        );
        self
    }

    pub fn price_lookups(&self) -> u32 {
        self.price_lookups.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> Vec<CheckoutSessionRequest> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn find_active_prices(&self, lookup_key: &str) -> ConversionResult<Vec<String>> {
        self.price_lookups.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .price_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ConversionError::UpstreamUnavailable(
                "list prices: HTTP 500".to_string(),
            ));
        }

        Ok(self.prices.get(lookup_key).cloned().unwrap_or_default())
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> ConversionResult<HostedSession> {
        let n = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.push(request.clone());
            sessions.len()
        };
        if self.fail_session_create {
            return Err(ConversionError::UpstreamUnavailable(
                "create checkout session: HTTP 500".to_string(),
            ));
        }

        let id = format!("cs_test_{}", n);
        Ok(HostedSession {
            url: format!("https://checkout.stripe.com/c/pay/{}", id),
            id,
        })
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> ConversionResult<SessionStatus> {
        self.statuses.get(session_id).cloned().ok_or_else(|| {
            ConversionError::StripeApi(format!("No such checkout.session: {}", session_id))
        })
    }
}
