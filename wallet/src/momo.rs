//! Mobile-money and card-processor provider traits.
//!
//! The real HTTP clients live with the process owner; the core sees two
//! narrow traits whose calls carry an idempotency reference, so a retried
//! call is equivalent to the first. The mocks here drive the test suite
//! and development.

use crate::error::{Result, WalletError};
use serde::{Deserialize, Serialize};
use sokoni_core::Money;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Provider acknowledgement of an initiated operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReceipt {
    /// Provider-side transaction reference.
    pub provider_reference: String,
}

/// Mobile-money collection and disbursement.
///
/// Both calls are fire-and-confirm: the provider accepts the request and
/// later reports the outcome through the webhook. `reference` is the
/// idempotency key — presenting it twice must not move money twice.
pub trait MobileMoneyProvider: Send + Sync {
    /// Initiate a collection (user pays in).
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` when the provider cannot be reached.
    fn collect(
        &self,
        msisdn: &str,
        amount: Money,
        currency: &str,
        reference: &str,
    ) -> impl Future<Output = Result<ProviderReceipt>> + Send;

    /// Initiate a disbursement (user cashes out).
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` when the provider cannot be reached.
    fn disburse(
        &self,
        msisdn: &str,
        amount: Money,
        currency: &str,
        reference: &str,
    ) -> impl Future<Output = Result<ProviderReceipt>> + Send;
}

/// Card processing against a tokenized instrument.
pub trait PaymentProcessor: Send + Sync {
    /// Charge a decrypted instrument. The payload is opaque bytes to this
    /// trait; only the processor parses it.
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` when the processor cannot be reached.
    fn charge(
        &self,
        instrument: &[u8],
        amount: Money,
        currency: &str,
        reference: &str,
    ) -> impl Future<Output = Result<ProviderReceipt>> + Send;
}

/// Recorded mock call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// `collect`, `disburse`, or `charge`.
    pub operation: String,

    /// Idempotency reference presented.
    pub reference: String,

    /// Amount requested.
    pub amount: Money,
}

/// In-memory provider mock. Replays the same receipt for a repeated
/// reference, mirroring real idempotency-key behavior, and can be toggled
/// unavailable to exercise retry paths.
#[derive(Debug, Clone, Default)]
pub struct MockMomoProvider {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    receipts: HashMap<String, ProviderReceipt>,
    unavailable: bool,
}

impl MockMomoProvider {
    /// Create a healthy mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle the outage flag.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = unavailable;
        }
    }

    /// Calls observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    fn call(&self, operation: &str, reference: &str, amount: Money) -> Result<ProviderReceipt> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| WalletError::Internal("mock lock poisoned".into()))?;
        if state.unavailable {
            return Err(WalletError::ProviderUnavailable("mock outage".into()));
        }
        state.calls.push(MockCall {
            operation: operation.to_string(),
            reference: reference.to_string(),
            amount,
        });
        let receipt = state
            .receipts
            .entry(reference.to_string())
            .or_insert_with(|| ProviderReceipt {
                provider_reference: format!("mm-{}", uuid::Uuid::new_v4()),
            })
            .clone();
        Ok(receipt)
    }
}

impl MobileMoneyProvider for MockMomoProvider {
    async fn collect(
        &self,
        _msisdn: &str,
        amount: Money,
        _currency: &str,
        reference: &str,
    ) -> Result<ProviderReceipt> {
        self.call("collect", reference, amount)
    }

    async fn disburse(
        &self,
        _msisdn: &str,
        amount: Money,
        _currency: &str,
        reference: &str,
    ) -> Result<ProviderReceipt> {
        self.call("disburse", reference, amount)
    }
}

impl PaymentProcessor for MockMomoProvider {
    async fn charge(
        &self,
        _instrument: &[u8],
        amount: Money,
        _currency: &str,
        reference: &str,
    ) -> Result<ProviderReceipt> {
        self.call("charge", reference, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_repeated_reference_replays_receipt() {
        let mock = MockMomoProvider::new();
        let a = mock
            .collect("+231770000001", Money::from_minor(100), "LRD", "ref-1")
            .await
            .unwrap();
        let b = mock
            .collect("+231770000001", Money::from_minor(100), "LRD", "ref-1")
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_outage_is_provider_unavailable() {
        let mock = MockMomoProvider::new();
        mock.set_unavailable(true);
        let err = mock
            .disburse("+231770000001", Money::from_minor(50), "LRD", "ref-2")
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::ProviderUnavailable(_)));
        assert!(err.is_retryable());
    }
}
