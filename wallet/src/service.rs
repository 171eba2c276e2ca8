//! Wallet ledger core: topup, escrow pay, withdraw, balances, and
//! webhook-driven settlement.

use crate::config::WalletConfig;
use crate::crypto::Cipher;
use crate::error::{Result, WalletError};
use crate::mirror::{LedgerMirror, MirrorExport, MirrorStore};
use crate::momo::MobileMoneyProvider;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sokoni_core::audit::{AuditAction, AuditActor, AuditEntry, AuditResource};
use sokoni_core::ids::{EntryId, UserId};
use sokoni_core::model::{EntryDirection, EntryStatus, EntryType, LedgerEntry};
use sokoni_core::repository::{AuditStore, LedgerStore, UserStore};
use sokoni_core::{AuditRecorder, Balances, Money};

/// Outcome reported by the mobile-money provider in a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookOutcome {
    /// The collection or disbursement went through.
    Success,

    /// The provider rejected it.
    Failure,
}

/// Webhook payload from the mobile-money provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomoWebhook {
    /// External reference the operation was initiated with.
    pub reference: String,

    /// Reported outcome.
    pub outcome: WebhookOutcome,

    /// Provider-side transaction reference, when included.
    pub provider_reference: Option<String>,
}

/// How a webhook was handled. Every variant maps to HTTP 200 at the
/// binding layer — the provider must not retry semantically-recognized
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookDisposition {
    /// The entry transitioned.
    Settled,

    /// Same (reference, outcome) seen again; nothing changed.
    Duplicate,

    /// No entry carries the reference; logged and acknowledged.
    Orphan,

    /// The entry settled differently earlier; logged and acknowledged.
    Conflicting,
}

/// Acknowledgement returned to the webhook binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookAck {
    /// Echoed reference.
    pub reference: String,

    /// What happened.
    pub disposition: WebhookDisposition,
}

/// The wallet ledger core.
#[derive(Clone)]
pub struct WalletCore<L, U, P, MR, A>
where
    L: LedgerStore + Clone,
    U: UserStore + Clone,
    P: MobileMoneyProvider + Clone,
    MR: MirrorStore + Clone,
    A: AuditStore + Clone,
{
    ledger: L,
    users: U,
    provider: P,
    mirror: LedgerMirror<MR>,
    audit: AuditRecorder<A>,
    config: WalletConfig,
}

impl<L, U, P, MR, A> WalletCore<L, U, P, MR, A>
where
    L: LedgerStore + Clone,
    U: UserStore + Clone,
    P: MobileMoneyProvider + Clone,
    MR: MirrorStore + Clone,
    A: AuditStore + Clone,
{
    /// Wire the core together. The mirror cipher is keyed from
    /// `config.encryption_key`.
    pub fn new(
        config: WalletConfig,
        ledger: L,
        users: U,
        provider: P,
        mirror_store: MR,
        audit: AuditRecorder<A>,
    ) -> Self {
        let mirror = LedgerMirror::new(mirror_store, Cipher::new(&config.encryption_key));
        Self {
            ledger,
            users,
            provider,
            mirror,
            audit,
            config,
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Topup
    // ═══════════════════════════════════════════════════════════

    /// Initiate a mobile-money topup: call the provider with an
    /// idempotency reference, then append a pending credit. The webhook
    /// settles it later.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on a non-positive amount, `ProviderUnavailable`
    /// when the collection call fails (nothing is appended).
    pub async fn topup(
        &self,
        user_id: UserId,
        amount: Money,
        currency: &str,
        msisdn: &str,
        client_reference: Option<String>,
    ) -> Result<LedgerEntry> {
        require_positive(amount)?;
        let user = self.users.get(user_id).await?;

        let reference =
            client_reference.unwrap_or_else(|| format!("top-{}", uuid::Uuid::new_v4()));
        let receipt = self
            .provider
            .collect(msisdn, amount, currency, &reference)
            .await?;

        let entry = new_entry(
            user_id,
            EntryType::Topup,
            EntryDirection::Credit,
            amount,
            currency,
            EntryStatus::Pending,
            false,
            &reference,
            "Mobile money topup",
        );
        let appended = {
            let mut e = entry;
            e.provider_reference = Some(receipt.provider_reference);
            self.ledger.append(&e).await?
        };
        if appended.deduplicated {
            tracing::info!(reference = %reference, "Topup replayed; returning prior entry");
            return Ok(appended.entry);
        }
        self.mirror.record(&appended.entry).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::WalletTopup, AuditResource::LedgerEntry)
                    .actor(AuditActor::user(user.id, &user.email, user.role))
                    .resource_id(appended.entry.id.to_string())
                    .detail("amount", appended.entry.amount.minor())
                    .detail("currency", currency)
                    .build(),
            )
            .await;

        Ok(appended.entry)
    }

    // ═══════════════════════════════════════════════════════════
    // Webhook settlement
    // ═══════════════════════════════════════════════════════════

    /// Reconcile a provider webhook against the ledger.
    ///
    /// Orphans, duplicates, and conflicting outcomes are acknowledged (the
    /// provider must not retry); only the first webhook per (reference,
    /// outcome) moves the entry.
    ///
    /// # Errors
    ///
    /// Store failures only — unknown references are an [`WebhookAck`],
    /// not an error.
    pub async fn handle_momo_webhook(&self, payload: MomoWebhook) -> Result<WebhookAck> {
        let Some(entry) = self.ledger.find_by_reference(&payload.reference).await? else {
            tracing::warn!(reference = %payload.reference, "Webhook for unknown reference");
            self.audit
                .record(
                    AuditEntry::builder(AuditAction::WebhookOrphan, AuditResource::Webhook)
                        .resource_id(payload.reference.clone())
                        .failed("no ledger entry for reference")
                        .build(),
                )
                .await;
            return Ok(WebhookAck {
                reference: payload.reference,
                disposition: WebhookDisposition::Orphan,
            });
        };

        let target = match payload.outcome {
            WebhookOutcome::Success => EntryStatus::Completed,
            WebhookOutcome::Failure => EntryStatus::Failed,
        };

        if entry.status == target {
            // Same (reference, outcome) delivered again.
            return Ok(WebhookAck {
                reference: payload.reference,
                disposition: WebhookDisposition::Duplicate,
            });
        }
        if entry.status != EntryStatus::Pending {
            tracing::warn!(
                reference = %payload.reference,
                stored = ?entry.status,
                reported = ?target,
                "Webhook outcome conflicts with settled entry; ignoring"
            );
            return Ok(WebhookAck {
                reference: payload.reference,
                disposition: WebhookDisposition::Conflicting,
            });
        }

        let settled = self
            .ledger
            .update_status(
                entry.id,
                EntryStatus::Pending,
                target,
                payload.provider_reference.as_deref(),
            )
            .await?;
        self.mirror.record(&settled).await?;
        self.refresh_snapshot(settled.user_id).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::WebhookSettled, AuditResource::LedgerEntry)
                    .resource_id(settled.id.to_string())
                    .detail("reference", payload.reference.clone())
                    .detail("outcome", match payload.outcome {
                        WebhookOutcome::Success => "success",
                        WebhookOutcome::Failure => "failure",
                    })
                    .build(),
            )
            .await;

        Ok(WebhookAck {
            reference: payload.reference,
            disposition: WebhookDisposition::Settled,
        })
    }

    // ═══════════════════════════════════════════════════════════
    // Escrow
    // ═══════════════════════════════════════════════════════════

    /// Place an escrow hold: verify cover, then append a completed
    /// escrow-flagged debit. The amount moves from `available` to
    /// `pending_held` immediately.
    ///
    /// # Errors
    ///
    /// `InsufficientFunds` when `available < amount`; `InvalidInput` on a
    /// non-positive amount or empty reference.
    pub async fn pay(&self, user_id: UserId, amount: Money, reference: &str) -> Result<LedgerEntry> {
        require_positive(amount)?;
        if reference.is_empty() {
            return Err(WalletError::InvalidInput(
                "escrow reference is required".into(),
            ));
        }
        let user = self.users.get(user_id).await?;

        let balances = self.balances(user_id).await?;
        if balances.available < amount {
            return Err(WalletError::InsufficientFunds);
        }

        let entry = new_entry(
            user_id,
            EntryType::EscrowHold,
            EntryDirection::Debit,
            amount,
            &self.config.currency,
            EntryStatus::Completed,
            true,
            reference,
            "Escrow hold",
        );
        let appended = self.ledger.append(&entry).await?;
        if appended.deduplicated {
            return Ok(appended.entry);
        }
        self.mirror.record(&appended.entry).await?;
        self.refresh_snapshot(user_id).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::WalletPay, AuditResource::LedgerEntry)
                    .actor(AuditActor::user(user.id, &user.email, user.role))
                    .resource_id(appended.entry.id.to_string())
                    .detail("amount", amount.minor())
                    .detail("reference", reference)
                    .build(),
            )
            .await;

        Ok(appended.entry)
    }

    /// Complete an escrow: settle the payer with a plain payment debit
    /// and credit the recipient. Net effect: payer `available` down,
    /// recipient `available` up, payer `pending_held` cleared.
    ///
    /// # Errors
    ///
    /// `NotFound` when no hold carries the reference; `InvalidInput` when
    /// the escrow was already cancelled. Re-completing is idempotent.
    pub async fn complete_escrow(
        &self,
        payer: UserId,
        reference: &str,
        recipient: UserId,
    ) -> Result<LedgerEntry> {
        let hold = self
            .ledger
            .find_by_user_reference(payer, reference, EntryType::EscrowHold)
            .await?
            .ok_or(WalletError::NotFound)?;

        if let Some(prior) = self
            .ledger
            .find_by_user_reference(payer, reference, EntryType::Payment)
            .await?
        {
            return Ok(prior);
        }
        if self
            .ledger
            .find_by_user_reference(payer, reference, EntryType::EscrowRelease)
            .await?
            .is_some()
        {
            return Err(WalletError::InvalidInput(
                "escrow was already cancelled".into(),
            ));
        }

        let payment = new_entry(
            payer,
            EntryType::Payment,
            EntryDirection::Debit,
            hold.amount,
            &hold.currency,
            EntryStatus::Completed,
            false,
            reference,
            "Escrow completion",
        );
        let payment = self.ledger.append(&payment).await?.entry;
        self.mirror.record(&payment).await?;

        let release = new_entry(
            recipient,
            EntryType::EscrowRelease,
            EntryDirection::Credit,
            hold.amount,
            &hold.currency,
            EntryStatus::Completed,
            false,
            reference,
            "Escrow release",
        );
        let release = self.ledger.append(&release).await?.entry;
        self.mirror.record(&release).await?;

        self.refresh_snapshot(payer).await?;
        self.refresh_snapshot(recipient).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::WalletEscrowRelease, AuditResource::LedgerEntry)
                    .resource_id(release.id.to_string())
                    .detail("reference", reference)
                    .detail("payer", payer.to_string())
                    .detail("recipient", recipient.to_string())
                    .build(),
            )
            .await;

        Ok(payment)
    }

    /// Cancel an escrow: refund the payer with an escrow-flagged release
    /// credit, restoring `available` without double-counting.
    ///
    /// # Errors
    ///
    /// `NotFound` when no hold carries the reference; `InvalidInput` when
    /// the escrow already completed. Re-cancelling is idempotent.
    pub async fn cancel_escrow(&self, payer: UserId, reference: &str) -> Result<LedgerEntry> {
        let hold = self
            .ledger
            .find_by_user_reference(payer, reference, EntryType::EscrowHold)
            .await?
            .ok_or(WalletError::NotFound)?;

        if let Some(prior) = self
            .ledger
            .find_by_user_reference(payer, reference, EntryType::EscrowRelease)
            .await?
        {
            return Ok(prior);
        }
        if self
            .ledger
            .find_by_user_reference(payer, reference, EntryType::Payment)
            .await?
            .is_some()
        {
            return Err(WalletError::InvalidInput(
                "escrow already completed".into(),
            ));
        }

        let refund = new_entry(
            payer,
            EntryType::EscrowRelease,
            EntryDirection::Credit,
            hold.amount,
            &hold.currency,
            EntryStatus::Completed,
            true,
            reference,
            "Escrow cancellation refund",
        );
        let refund = self.ledger.append(&refund).await?.entry;
        self.mirror.record(&refund).await?;
        self.refresh_snapshot(payer).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::WalletEscrowRelease, AuditResource::LedgerEntry)
                    .resource_id(refund.id.to_string())
                    .detail("reference", reference)
                    .detail("cancelled", true)
                    .build(),
            )
            .await;

        Ok(refund)
    }

    // ═══════════════════════════════════════════════════════════
    // Withdraw
    // ═══════════════════════════════════════════════════════════

    /// Initiate a mobile-money withdrawal: verify cover, call the
    /// disbursement API, append a pending debit. The webhook settles it;
    /// a failure flips it to `failed` with no balance effect.
    ///
    /// # Errors
    ///
    /// `InsufficientFunds` / `InvalidInput` / `ProviderUnavailable`.
    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: Money,
        msisdn: &str,
        client_reference: Option<String>,
    ) -> Result<LedgerEntry> {
        require_positive(amount)?;
        let user = self.users.get(user_id).await?;

        let balances = self.balances(user_id).await?;
        if balances.available < amount {
            return Err(WalletError::InsufficientFunds);
        }

        let reference = client_reference.unwrap_or_else(|| format!("wd-{}", uuid::Uuid::new_v4()));
        let receipt = self
            .provider
            .disburse(msisdn, amount, &self.config.currency, &reference)
            .await?;

        let mut entry = new_entry(
            user_id,
            EntryType::Withdraw,
            EntryDirection::Debit,
            amount,
            &self.config.currency,
            EntryStatus::Pending,
            false,
            &reference,
            "Mobile money withdrawal",
        );
        entry.provider_reference = Some(receipt.provider_reference);
        let appended = self.ledger.append(&entry).await?;
        if appended.deduplicated {
            return Ok(appended.entry);
        }
        self.mirror.record(&appended.entry).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::WalletWithdraw, AuditResource::LedgerEntry)
                    .actor(AuditActor::user(user.id, &user.email, user.role))
                    .resource_id(appended.entry.id.to_string())
                    .detail("amount", amount.minor())
                    .build(),
            )
            .await;

        Ok(appended.entry)
    }

    // ═══════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════

    /// Balance fold for a user.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn balances(&self, user_id: UserId) -> Result<Balances> {
        Ok(self.ledger.balances(user_id, &self.config.currency).await?)
    }

    /// A user's most recent ledger entries.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_entries(&self, user_id: UserId, limit: usize) -> Result<Vec<LedgerEntry>> {
        Ok(self.ledger.list_for_user(user_id, limit).await?)
    }

    /// One entry by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn get_entry(&self, entry_id: EntryId) -> Result<LedgerEntry> {
        Ok(self.ledger.get(entry_id).await?)
    }

    /// Decrypted compliance export from the encrypted mirror.
    ///
    /// # Errors
    ///
    /// `EncryptionFailure` on undecryptable rows.
    pub async fn export_mirror(&self, user_id: UserId) -> Result<Vec<MirrorExport>> {
        self.mirror.export(user_id).await
    }

    /// Recompute the fold and refresh the cached projection on the user
    /// row. The fold stays authoritative; this is display state.
    async fn refresh_snapshot(&self, user_id: UserId) -> Result<()> {
        let balances = self.balances(user_id).await?;
        self.users
            .set_wallet_snapshot(user_id, balances.available, &balances.currency, None)
            .await?;
        Ok(())
    }
}

fn require_positive(amount: Money) -> Result<()> {
    if !amount.is_positive() {
        return Err(WalletError::InvalidInput(
            "amount must be positive".into(),
        ));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn new_entry(
    user_id: UserId,
    entry_type: EntryType,
    direction: EntryDirection,
    amount: Money,
    currency: &str,
    status: EntryStatus,
    is_escrow: bool,
    reference: &str,
    description: &str,
) -> LedgerEntry {
    let now = Utc::now();
    LedgerEntry {
        id: EntryId::new(),
        user_id,
        entry_type,
        direction,
        amount,
        currency: currency.to_string(),
        status,
        is_escrow,
        reference: reference.to_string(),
        provider_reference: None,
        description: description.to_string(),
        created_at: now,
        updated_at: now,
    }
}
