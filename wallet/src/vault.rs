//! Payment tokenization vault.
//!
//! The vault is the only code that ever sees a cleartext payment
//! instrument. It validates, masks, seals with the dedicated payment key,
//! and stores the envelope; the cleartext is zeroized the moment sealing
//! completes. Nothing here logs or audits PAN or CVV — only brand and
//! last four ever leave the function.

use crate::config::WalletConfig;
use crate::crypto::Cipher;
use crate::error::{Result, WalletError};
use crate::momo::{PaymentProcessor, ProviderReceipt};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sokoni_core::audit::{AuditAction, AuditActor, AuditEntry, AuditResource};
use sokoni_core::ids::{PaymentTokenId, UserId};
use sokoni_core::model::{PaymentToken, PaymentTokenStatus};
use sokoni_core::repository::{AuditStore, PaymentTokenStore};
use sokoni_core::{AuditRecorder, Money, RepoError};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Cleartext payment instrument. Zeroized on drop; `Debug` is redacted.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SensitiveInstrument {
    /// Primary account number.
    pub pan: String,

    /// Card verification value.
    pub cvv: String,

    /// Expiry month (1-12).
    pub expiry_month: u8,

    /// Expiry year (four digits).
    pub expiry_year: u16,

    /// Cardholder name.
    pub holder_name: String,
}

impl std::fmt::Debug for SensitiveInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SensitiveInstrument(..)")
    }
}

impl SensitiveInstrument {
    /// Validate shape: Luhn-valid PAN of 12-19 digits, 3-4 digit CVV,
    /// plausible expiry.
    ///
    /// # Errors
    ///
    /// `InvalidInput` naming the failed rule (never echoing the value).
    pub fn validate(&self) -> Result<()> {
        if self.pan.len() < 12
            || self.pan.len() > 19
            || !self.pan.chars().all(|c| c.is_ascii_digit())
        {
            return Err(WalletError::InvalidInput("card number is malformed".into()));
        }
        if !luhn_valid(&self.pan) {
            return Err(WalletError::InvalidInput("card number is malformed".into()));
        }
        if self.cvv.len() < 3 || self.cvv.len() > 4 || !self.cvv.chars().all(|c| c.is_ascii_digit())
        {
            return Err(WalletError::InvalidInput("cvv is malformed".into()));
        }
        if self.expiry_month == 0 || self.expiry_month > 12 {
            return Err(WalletError::InvalidInput("expiry month out of range".into()));
        }
        if self.expiry_year < 2000 || self.expiry_year > 2100 {
            return Err(WalletError::InvalidInput("expiry year out of range".into()));
        }
        Ok(())
    }

    /// Display-safe last four digits.
    #[must_use]
    pub fn last4(&self) -> String {
        self.pan.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect()
    }

    /// Brand from the issuer prefix.
    #[must_use]
    pub fn brand(&self) -> &'static str {
        match self.pan.as_bytes() {
            [b'4', ..] => "visa",
            [b'5', b'1'..=b'5', ..] | [b'2', b'2'..=b'7', ..] => "mastercard",
            [b'3', b'4' | b'7', ..] => "amex",
            _ => "card",
        }
    }
}

/// Luhn checksum.
fn luhn_valid(pan: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in pan.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

/// The PCI-scope token vault.
#[derive(Clone)]
pub struct TokenVault<T, P, A>
where
    T: PaymentTokenStore + Clone,
    P: PaymentProcessor + Clone,
    A: AuditStore + Clone,
{
    tokens: T,
    processor: P,
    cipher: Cipher,
    audit: AuditRecorder<A>,
    config: WalletConfig,
}

impl<T, P, A> TokenVault<T, P, A>
where
    T: PaymentTokenStore + Clone,
    P: PaymentProcessor + Clone,
    A: AuditStore + Clone,
{
    /// Wire the vault. The cipher is keyed from
    /// `config.payment_encryption_key` — never the mirror key.
    pub fn new(config: WalletConfig, tokens: T, processor: P, audit: AuditRecorder<A>) -> Self {
        let cipher = Cipher::new(&config.payment_encryption_key);
        Self {
            tokens,
            processor,
            cipher,
            audit,
            config,
        }
    }

    /// Tokenize an instrument: validate, seal, store, return the handle.
    /// The cleartext is zeroized before this function returns.
    ///
    /// # Errors
    ///
    /// `InvalidInput` / `EncryptionFailure` / store failures.
    pub async fn tokenize(
        &self,
        owner_id: UserId,
        instrument: SensitiveInstrument,
    ) -> Result<PaymentToken> {
        instrument.validate()?;
        let masked_last4 = instrument.last4();
        let brand = instrument.brand().to_string();

        let plaintext = Zeroizing::new(
            serde_json::to_vec(&instrument).map_err(|_| WalletError::EncryptionFailure)?,
        );
        let encrypted_payload = self.cipher.encrypt(&plaintext)?;
        drop(instrument);

        let now = Utc::now();
        let token = PaymentToken {
            id: PaymentTokenId::new(),
            owner_id,
            masked_last4: masked_last4.clone(),
            brand: brand.clone(),
            encrypted_payload,
            status: PaymentTokenStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let token = self.tokens.create(&token).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::TokenizeInstrument, AuditResource::PaymentToken)
                    .actor(AuditActor {
                        user_id: Some(owner_id),
                        email: None,
                        role: None,
                    })
                    .resource_id(token.id.to_string())
                    .detail("brand", brand)
                    .detail("last4", masked_last4)
                    .build(),
            )
            .await;

        Ok(token)
    }

    /// Charge a stored token through the external processor.
    ///
    /// # Errors
    ///
    /// `InvalidToken` / `TokenRevoked` / `ProviderUnavailable` /
    /// `EncryptionFailure`.
    pub async fn process(
        &self,
        token_id: PaymentTokenId,
        amount: Money,
        currency: &str,
    ) -> Result<ProviderReceipt> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidInput("amount must be positive".into()));
        }
        let token = match self.tokens.get(token_id).await {
            Ok(t) => t,
            Err(RepoError::NotFound) => return Err(WalletError::InvalidToken),
            Err(e) => return Err(e.into()),
        };
        if token.status == PaymentTokenStatus::Revoked {
            return Err(WalletError::TokenRevoked);
        }

        let instrument = Zeroizing::new(self.cipher.decrypt(&token.encrypted_payload)?);
        let reference = format!("psp-{}", uuid::Uuid::new_v4());
        let receipt = self
            .processor
            .charge(&instrument, amount, currency, &reference)
            .await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::PaymentProcess, AuditResource::PaymentToken)
                    .actor(AuditActor {
                        user_id: Some(token.owner_id),
                        email: None,
                        role: None,
                    })
                    .resource_id(token.id.to_string())
                    .detail("amount", amount.minor())
                    .detail("currency", currency)
                    .detail("provider_reference", receipt.provider_reference.clone())
                    .build(),
            )
            .await;

        Ok(receipt)
    }

    /// Revoke a token. The sealed payload is retained through the
    /// settlement window (chargeback defense), then purged by the
    /// owner's retention job.
    ///
    /// # Errors
    ///
    /// `InvalidToken` when the token does not exist or belongs to someone
    /// else.
    pub async fn delete(&self, token_id: PaymentTokenId, owner_id: UserId) -> Result<PaymentToken> {
        let token = match self.tokens.mark_revoked(token_id, owner_id).await {
            Ok(t) => t,
            Err(RepoError::NotFound) => return Err(WalletError::InvalidToken),
            Err(e) => return Err(e.into()),
        };
        let purge_after = Utc::now() + self.config.settlement_window;

        self.audit
            .record(
                AuditEntry::builder(
                    AuditAction::PaymentTokenDeleted,
                    AuditResource::PaymentToken,
                )
                .actor(AuditActor {
                    user_id: Some(owner_id),
                    email: None,
                    role: None,
                })
                .resource_id(token.id.to_string())
                .detail("purge_after", purge_after.to_rfc3339())
                .build(),
            )
            .await;

        Ok(token)
    }

    /// List a user's tokens (display metadata only is meaningful to
    /// callers; envelopes stay sealed).
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list(&self, owner_id: UserId) -> Result<Vec<PaymentToken>> {
        Ok(self.tokens.list_for_owner(owner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument() -> SensitiveInstrument {
        SensitiveInstrument {
            pan: "4242424242424242".into(),
            cvv: "123".into(),
            expiry_month: 9,
            expiry_year: 2030,
            holder_name: "AMA KOLLIE".into(),
        }
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4242424242424242"));
        assert!(luhn_valid("5555555555554444"));
        assert!(!luhn_valid("4242424242424241"));
        assert!(!luhn_valid("not-digits"));
    }

    #[test]
    fn test_masking_and_brand() {
        let i = instrument();
        assert_eq!(i.last4(), "4242");
        assert_eq!(i.brand(), "visa");

        let mut mc = instrument();
        mc.pan = "5555555555554444".into();
        assert_eq!(mc.brand(), "mastercard");
    }

    #[test]
    fn test_validation_rejects_bad_shapes() {
        let mut bad_pan = instrument();
        bad_pan.pan = "1234".into();
        assert!(bad_pan.validate().is_err());

        let mut bad_cvv = instrument();
        bad_cvv.cvv = "12".into();
        assert!(bad_cvv.validate().is_err());

        let mut bad_month = instrument();
        bad_month.expiry_month = 13;
        assert!(bad_month.validate().is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let i = instrument();
        let shown = format!("{i:?}");
        assert!(!shown.contains("4242"));
        assert!(!shown.contains("123"));
    }
}
