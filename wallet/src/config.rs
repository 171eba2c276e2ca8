//! Wallet configuration.

use chrono::Duration;
use sokoni_core::config::{env_parse, load_secret};
use sokoni_core::{ConfigError, Environment, SecretKey};

/// Wallet and payment tuning.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Deployment environment; gates fail-closed secret handling.
    pub environment: Environment,

    /// AES-256-GCM key for the encrypted ledger mirror.
    pub encryption_key: SecretKey,

    /// AES-256-GCM key for the payment token vault. Kept separate from
    /// the mirror key so PCI scope stays confined to the vault.
    pub payment_encryption_key: SecretKey,

    /// Default currency for wallets.
    ///
    /// Default: `LRD`
    pub currency: String,

    /// Outbound provider call budget.
    ///
    /// Default: 30 seconds
    pub provider_timeout: Duration,

    /// How long a revoked token's payload is retained before purge.
    ///
    /// Default: 7 days
    pub settlement_window: Duration,
}

impl WalletConfig {
    /// Configuration with generated keys, for development and tests.
    #[must_use]
    pub fn for_development() -> Self {
        Self {
            environment: Environment::Development,
            encryption_key: SecretKey::generate(),
            payment_encryption_key: SecretKey::generate(),
            currency: "LRD".to_string(),
            provider_timeout: Duration::seconds(30),
            settlement_window: Duration::days(7),
        }
    }

    /// Load from the environment, failing closed on missing keys in
    /// production and staging.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when keys are missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();
        Ok(Self {
            environment,
            encryption_key: load_secret("ENCRYPTION_KEY", environment)?,
            payment_encryption_key: load_secret("PAYMENT_ENCRYPTION_KEY", environment)?,
            currency: std::env::var("WALLET_CURRENCY").unwrap_or_else(|_| "LRD".to_string()),
            provider_timeout: Duration::seconds(env_parse("PROVIDER_TIMEOUT", 30)),
            settlement_window: Duration::days(env_parse("SETTLEMENT_WINDOW_DAYS", 7)),
        })
    }

    /// Set the default currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_defaults() {
        let config = WalletConfig::for_development();
        assert_eq!(config.currency, "LRD");
        assert_eq!(config.provider_timeout, Duration::seconds(30));
        // The two keys must never coincide.
        assert_ne!(
            config.encryption_key.as_bytes(),
            config.payment_encryption_key.as_bytes()
        );
    }
}
