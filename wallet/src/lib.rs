//! # Sokoni Wallet & Payments
//!
//! Append-only double-entry ledger with escrow, webhook-driven
//! settlement, an AES-GCM encrypted system-of-record mirror, and a
//! PCI-scope payment token vault.
//!
//! ## Money movement
//!
//! ```text
//! Topup    ──► provider collect ──► pending credit ──► webhook settles
//! Pay      ──► completed escrow hold (available → pending_held)
//! Complete ──► payment debit (payer) + release credit (recipient)
//! Cancel   ──► escrow-flagged release credit back to the payer
//! Withdraw ──► provider disburse ──► pending debit ──► webhook settles
//! ```
//!
//! Balances are never stored authoritatively: every query folds the
//! user's entry log ([`sokoni_core::repository::fold_balances`]). The
//! `(user, reference, type)` uniqueness constraint makes retried calls
//! and replayed webhooks land on their original rows.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod mirror;
pub mod momo;
pub mod service;
pub mod vault;

pub use config::WalletConfig;
pub use error::{Result, WalletError};
pub use mirror::{LedgerMirror, MemoryMirrorStore, MirrorExport, MirrorStore};
pub use momo::{MobileMoneyProvider, MockMomoProvider, PaymentProcessor, ProviderReceipt};
pub use service::{MomoWebhook, WalletCore, WebhookAck, WebhookDisposition, WebhookOutcome};
pub use vault::{SensitiveInstrument, TokenVault};
