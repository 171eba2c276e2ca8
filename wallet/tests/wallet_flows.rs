//! End-to-end wallet and payment flows against the in-memory stores.

use sokoni_core::ids::UserId;
use sokoni_core::memory::{
    MemoryAuditStore, MemoryLedgerStore, MemoryPaymentTokenStore, MemoryUserStore,
};
use sokoni_core::model::{EntryStatus, UserRole};
use sokoni_core::repository::{fold_balances, LedgerStore, UserStore};
use sokoni_core::{AuditRecorder, Money};
use sokoni_wallet::config::WalletConfig;
use sokoni_wallet::error::WalletError;
use sokoni_wallet::momo::MockMomoProvider;
use sokoni_wallet::service::{MomoWebhook, WalletCore, WebhookDisposition, WebhookOutcome};
use sokoni_wallet::vault::{SensitiveInstrument, TokenVault};
use sokoni_wallet::MemoryMirrorStore;

type TestCore = WalletCore<
    MemoryLedgerStore,
    MemoryUserStore,
    MockMomoProvider,
    MemoryMirrorStore,
    MemoryAuditStore,
>;

struct Harness {
    core: TestCore,
    ledger: MemoryLedgerStore,
    users: MemoryUserStore,
    momo: MockMomoProvider,
    audit: MemoryAuditStore,
}

async fn harness() -> (Harness, UserId) {
    let ledger = MemoryLedgerStore::new();
    let users = MemoryUserStore::new();
    let momo = MockMomoProvider::new();
    let audit = MemoryAuditStore::new();

    let now = chrono::Utc::now();
    let user = sokoni_core::model::User {
        id: UserId::new(),
        email: "wallet@example.com".into(),
        phone: "+231770000003".into(),
        first_name: "Joe".into(),
        last_name: "Nagbe".into(),
        password_hash: "$2b$12$x".into(),
        role: UserRole::Customer,
        email_verified: true,
        profile_image: None,
        address: None,
        wallet_balance: Money::ZERO,
        wallet_currency: "LRD".into(),
        last_sync_at: None,
        is_offline: false,
        version: 1,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    let user = users.create(&user).await.unwrap();

    let core = WalletCore::new(
        WalletConfig::for_development(),
        ledger.clone(),
        users.clone(),
        momo.clone(),
        MemoryMirrorStore::new(),
        AuditRecorder::new(audit.clone()),
    );
    (
        Harness {
            core,
            ledger,
            users,
            momo,
            audit,
        },
        user.id,
    )
}

/// Seed a settled topup so the user has spendable funds.
async fn fund(h: &Harness, user: UserId, amount: i64, reference: &str) {
    h.core
        .topup(user, Money::from_minor(amount), "LRD", "+231770000003", Some(reference.into()))
        .await
        .unwrap();
    h.core
        .handle_momo_webhook(MomoWebhook {
            reference: reference.into(),
            outcome: WebhookOutcome::Success,
            provider_reference: Some("mm-seed".into()),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn topup_webhook_settles_and_replays_safely() {
    let (h, user) = harness().await;

    let entry = h
        .core
        .topup(user, Money::from_minor(100), "LRD", "+231770000003", Some("ref-1".into()))
        .await
        .unwrap();
    assert_eq!(entry.status, EntryStatus::Pending);
    assert_eq!(entry.reference, "ref-1");

    // Pending credit does not move the balance.
    assert_eq!(h.core.balances(user).await.unwrap().available, Money::ZERO);

    let ack = h
        .core
        .handle_momo_webhook(MomoWebhook {
            reference: "ref-1".into(),
            outcome: WebhookOutcome::Success,
            provider_reference: Some("mm-77".into()),
        })
        .await
        .unwrap();
    assert_eq!(ack.disposition, WebhookDisposition::Settled);
    assert_eq!(
        h.core.balances(user).await.unwrap().available,
        Money::from_minor(100)
    );

    // Replay: same (reference, outcome) is a no-op success.
    for _ in 0..3 {
        let replay = h
            .core
            .handle_momo_webhook(MomoWebhook {
                reference: "ref-1".into(),
                outcome: WebhookOutcome::Success,
                provider_reference: Some("mm-77".into()),
            })
            .await
            .unwrap();
        assert_eq!(replay.disposition, WebhookDisposition::Duplicate);
    }
    assert_eq!(
        h.core.balances(user).await.unwrap().available,
        Money::from_minor(100)
    );

    // The settled entry carries the provider reference.
    let settled = h.core.get_entry(entry.id).await.unwrap();
    assert_eq!(settled.status, EntryStatus::Completed);
    assert_eq!(settled.provider_reference.as_deref(), Some("mm-77"));

    // The cached snapshot followed the fold.
    let stored = h.users.get(user).await.unwrap();
    assert_eq!(stored.wallet_balance, Money::from_minor(100));
}

#[tokio::test]
async fn duplicate_topup_reference_returns_the_first_entry() {
    let (h, user) = harness().await;
    let first = h
        .core
        .topup(user, Money::from_minor(100), "LRD", "+231770000003", Some("ref-dup".into()))
        .await
        .unwrap();
    let second = h
        .core
        .topup(user, Money::from_minor(100), "LRD", "+231770000003", Some("ref-dup".into()))
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(h.ledger.list_for_user(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn orphan_webhook_is_acknowledged_and_audited() {
    let (h, _) = harness().await;
    let ack = h
        .core
        .handle_momo_webhook(MomoWebhook {
            reference: "never-seen".into(),
            outcome: WebhookOutcome::Success,
            provider_reference: None,
        })
        .await
        .unwrap();
    assert_eq!(ack.disposition, WebhookDisposition::Orphan);

    let entries = h.audit.all().unwrap();
    assert!(entries.iter().any(|e| e.action.as_str() == "webhook_orphan"));
}

#[tokio::test]
async fn failed_topup_never_credits() {
    let (h, user) = harness().await;
    h.core
        .topup(user, Money::from_minor(100), "LRD", "+231770000003", Some("ref-f".into()))
        .await
        .unwrap();
    let ack = h
        .core
        .handle_momo_webhook(MomoWebhook {
            reference: "ref-f".into(),
            outcome: WebhookOutcome::Failure,
            provider_reference: None,
        })
        .await
        .unwrap();
    assert_eq!(ack.disposition, WebhookDisposition::Settled);
    assert_eq!(h.core.balances(user).await.unwrap().available, Money::ZERO);

    // A success arriving after the failure settled is conflicting, not
    // applied.
    let late = h
        .core
        .handle_momo_webhook(MomoWebhook {
            reference: "ref-f".into(),
            outcome: WebhookOutcome::Success,
            provider_reference: None,
        })
        .await
        .unwrap();
    assert_eq!(late.disposition, WebhookDisposition::Conflicting);
    assert_eq!(h.core.balances(user).await.unwrap().available, Money::ZERO);
}

#[tokio::test]
async fn escrow_hold_and_cancel_restore_balance() {
    let (h, user) = harness().await;
    fund(&h, user, 500, "seed-1").await;

    h.core.pay(user, Money::from_minor(200), "ord-9").await.unwrap();
    let held = h.core.balances(user).await.unwrap();
    assert_eq!(held.available, Money::from_minor(300));
    assert_eq!(held.pending_held, Money::from_minor(200));
    assert_eq!(held.total, Money::from_minor(500));

    h.core.cancel_escrow(user, "ord-9").await.unwrap();
    let restored = h.core.balances(user).await.unwrap();
    assert_eq!(restored.available, Money::from_minor(500));
    assert_eq!(restored.pending_held, Money::ZERO);

    // Cancelling again is idempotent.
    h.core.cancel_escrow(user, "ord-9").await.unwrap();
    assert_eq!(
        h.core.balances(user).await.unwrap().available,
        Money::from_minor(500)
    );
}

#[tokio::test]
async fn escrow_completion_pays_the_recipient() {
    let (h, payer) = harness().await;
    fund(&h, payer, 500, "seed-1").await;

    let now = chrono::Utc::now();
    let recipient = h
        .users
        .create(&sokoni_core::model::User {
            id: UserId::new(),
            email: "provider@example.com".into(),
            phone: "+231770000004".into(),
            first_name: "Mercy".into(),
            last_name: "Karnga".into(),
            password_hash: "$2b$12$x".into(),
            role: UserRole::Provider,
            email_verified: true,
            profile_image: None,
            address: None,
            wallet_balance: Money::ZERO,
            wallet_currency: "LRD".into(),
            last_sync_at: None,
            is_offline: false,
            version: 1,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    h.core.pay(payer, Money::from_minor(200), "ord-10").await.unwrap();
    h.core.complete_escrow(payer, "ord-10", recipient.id).await.unwrap();

    let payer_b = h.core.balances(payer).await.unwrap();
    assert_eq!(payer_b.available, Money::from_minor(300));
    assert_eq!(payer_b.pending_held, Money::ZERO);

    let recipient_b = h.core.balances(recipient.id).await.unwrap();
    assert_eq!(recipient_b.available, Money::from_minor(200));

    // Completing again is idempotent; cancelling afterwards is refused.
    h.core.complete_escrow(payer, "ord-10", recipient.id).await.unwrap();
    assert_eq!(
        h.core.balances(recipient.id).await.unwrap().available,
        Money::from_minor(200)
    );
    assert!(matches!(
        h.core.cancel_escrow(payer, "ord-10").await.unwrap_err(),
        WalletError::InvalidInput(_)
    ));
}

#[tokio::test]
async fn insufficient_funds_refused() {
    let (h, user) = harness().await;
    fund(&h, user, 100, "seed-1").await;

    assert_eq!(
        h.core.pay(user, Money::from_minor(150), "ord-x").await.unwrap_err(),
        WalletError::InsufficientFunds
    );
    assert_eq!(
        h.core
            .withdraw(user, Money::from_minor(150), "+231770000003", None)
            .await
            .unwrap_err(),
        WalletError::InsufficientFunds
    );
}

#[tokio::test]
async fn withdraw_failure_leaves_balance_intact() {
    let (h, user) = harness().await;
    fund(&h, user, 300, "seed-1").await;

    let entry = h
        .core
        .withdraw(user, Money::from_minor(120), "+231770000003", Some("wd-1".into()))
        .await
        .unwrap();
    assert_eq!(entry.status, EntryStatus::Pending);

    // Pending debits are not subtracted from available.
    assert_eq!(
        h.core.balances(user).await.unwrap().available,
        Money::from_minor(300)
    );

    h.core
        .handle_momo_webhook(MomoWebhook {
            reference: "wd-1".into(),
            outcome: WebhookOutcome::Failure,
            provider_reference: None,
        })
        .await
        .unwrap();
    assert_eq!(
        h.core.balances(user).await.unwrap().available,
        Money::from_minor(300)
    );

    // A successful retry under a fresh reference settles and debits.
    h.core
        .withdraw(user, Money::from_minor(120), "+231770000003", Some("wd-2".into()))
        .await
        .unwrap();
    h.core
        .handle_momo_webhook(MomoWebhook {
            reference: "wd-2".into(),
            outcome: WebhookOutcome::Success,
            provider_reference: None,
        })
        .await
        .unwrap();
    assert_eq!(
        h.core.balances(user).await.unwrap().available,
        Money::from_minor(180)
    );
}

#[tokio::test]
async fn provider_outage_appends_nothing() {
    let (h, user) = harness().await;
    h.momo.set_unavailable(true);
    let err = h
        .core
        .topup(user, Money::from_minor(50), "LRD", "+231770000003", Some("out-1".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::ProviderUnavailable(_)));
    assert!(h.ledger.list_for_user(user, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn balance_fold_matches_independent_computation() {
    let (h, user) = harness().await;
    fund(&h, user, 1000, "seed-1").await;
    h.core.pay(user, Money::from_minor(250), "ord-1").await.unwrap();
    h.core.pay(user, Money::from_minor(100), "ord-2").await.unwrap();
    h.core.cancel_escrow(user, "ord-2").await.unwrap();
    h.core
        .withdraw(user, Money::from_minor(300), "+231770000003", Some("wd-1".into()))
        .await
        .unwrap();
    h.core
        .handle_momo_webhook(MomoWebhook {
            reference: "wd-1".into(),
            outcome: WebhookOutcome::Success,
            provider_reference: None,
        })
        .await
        .unwrap();

    let reported = h.core.balances(user).await.unwrap();

    // Recompute independently from the raw entry log.
    let raw = h.ledger.list_for_user(user, 100).await.unwrap();
    let independent = fold_balances(user, &raw, "LRD");
    assert_eq!(reported, independent);
    assert_eq!(reported.available, Money::from_minor(450));
    assert_eq!(reported.pending_held, Money::from_minor(250));
}

#[tokio::test]
async fn mirror_export_reflects_the_ledger() {
    let (h, user) = harness().await;
    fund(&h, user, 200, "seed-1").await;

    let export = h.core.export_mirror(user).await.unwrap();
    // One row for the pending append, one for the settlement.
    assert_eq!(export.len(), 2);
    assert!(export.iter().all(|r| r.reference == "seed-1"));
    assert!(export.iter().any(|r| r.status == "completed"));
}

// ═══════════════════════════════════════════════════════════
// Tokenization vault
// ═══════════════════════════════════════════════════════════

type TestVault = TokenVault<MemoryPaymentTokenStore, MockMomoProvider, MemoryAuditStore>;

fn vault() -> (TestVault, MemoryPaymentTokenStore, MemoryAuditStore) {
    let tokens = MemoryPaymentTokenStore::new();
    let audit = MemoryAuditStore::new();
    let vault = TokenVault::new(
        WalletConfig::for_development(),
        tokens.clone(),
        MockMomoProvider::new(),
        AuditRecorder::new(audit.clone()),
    );
    (vault, tokens, audit)
}

fn instrument() -> SensitiveInstrument {
    SensitiveInstrument {
        pan: "4242424242424242".into(),
        cvv: "123".into(),
        expiry_month: 9,
        expiry_year: 2030,
        holder_name: "JOE NAGBE".into(),
    }
}

#[tokio::test]
async fn tokenize_process_delete_lifecycle() {
    let (vault, _, _) = vault();
    let owner = UserId::new();

    let token = vault.tokenize(owner, instrument()).await.unwrap();
    assert_eq!(token.masked_last4, "4242");
    assert_eq!(token.brand, "visa");

    let receipt = vault
        .process(token.id, Money::from_minor(5000), "USD")
        .await
        .unwrap();
    assert!(receipt.provider_reference.starts_with("mm-"));

    vault.delete(token.id, owner).await.unwrap();
    assert_eq!(
        vault
            .process(token.id, Money::from_minor(100), "USD")
            .await
            .unwrap_err(),
        WalletError::TokenRevoked
    );
}

#[tokio::test]
async fn deleting_someone_elses_token_is_invalid() {
    let (vault, _, _) = vault();
    let owner = UserId::new();
    let token = vault.tokenize(owner, instrument()).await.unwrap();
    assert_eq!(
        vault.delete(token.id, UserId::new()).await.unwrap_err(),
        WalletError::InvalidToken
    );
}

#[tokio::test]
async fn pan_and_cvv_never_persisted_nor_audited() {
    let (vault, tokens, audit) = vault();
    let owner = UserId::new();
    let token = vault.tokenize(owner, instrument()).await.unwrap();
    vault
        .process(token.id, Money::from_minor(100), "USD")
        .await
        .unwrap();

    // Stored row: only the masked tail is visible anywhere.
    let stored = sokoni_core::repository::PaymentTokenStore::get(&tokens, token.id)
        .await
        .unwrap();
    let row_json = serde_json::to_string(&stored).unwrap();
    assert!(!row_json.contains("4242424242424242"));
    assert!(!row_json.contains("\"123\""));
    let envelope_text = String::from_utf8_lossy(&stored.encrypted_payload).into_owned();
    assert!(!envelope_text.contains("4242424242424242"));

    // Audit trail: brand and last4 only.
    let trail = serde_json::to_string(&audit.all().unwrap()).unwrap();
    assert!(!trail.contains("4242424242424242"));
    assert!(trail.contains("\"last4\""));
}

#[tokio::test]
async fn malformed_instruments_are_rejected() {
    let (vault, tokens, _) = vault();
    let owner = UserId::new();
    let mut bad = instrument();
    bad.pan = "4242424242424241".into(); // Luhn-invalid
    assert!(matches!(
        vault.tokenize(owner, bad).await.unwrap_err(),
        WalletError::InvalidInput(_)
    ));
    assert!(
        sokoni_core::repository::PaymentTokenStore::list_for_owner(&tokens, owner)
            .await
            .unwrap()
            .is_empty()
    );
}
