//! End-to-end authentication flows against the in-memory stores.

use chrono::{Duration, Utc};
use sokoni_auth::biometric::MemoryChallengeStore;
use sokoni_auth::config::AuthConfig;
use sokoni_auth::error::AuthError;
use sokoni_auth::gate::{GatePolicy, MemoryLoginGate};
use sokoni_auth::service::AuthCore;
use sokoni_auth::types::{BiometricUnlockRequest, DeviceInfo, LoginRequest, RegisterRequest};
use sokoni_core::ids::DeviceId;
use sokoni_core::memory::{
    MemoryAuditStore, MemoryOtpStore, MemoryRevocationStore, MemorySessionStore, MemoryUserStore,
};
use sokoni_core::model::{BiometricType, Platform, UserRole};
use sokoni_core::repository::UserStore;
use sokoni_core::AuditRecorder;

type TestCore = AuthCore<
    MemoryUserStore,
    MemorySessionStore,
    MemoryOtpStore,
    MemoryRevocationStore,
    MemoryLoginGate,
    MemoryChallengeStore,
    MemoryAuditStore,
>;

struct Harness {
    core: TestCore,
    users: MemoryUserStore,
    otps: MemoryOtpStore,
    audit: MemoryAuditStore,
}

fn harness() -> Harness {
    // Cost 4 keeps bcrypt fast in tests; production floors at 10 via config.
    let mut config = AuthConfig::for_development();
    config.bcrypt_cost = 4;

    let users = MemoryUserStore::new();
    let otps = MemoryOtpStore::new();
    let audit = MemoryAuditStore::new();
    let gate = MemoryLoginGate::new(GatePolicy::from_config(&config));
    let core = AuthCore::new(
        config,
        users.clone(),
        MemorySessionStore::new(),
        otps.clone(),
        MemoryRevocationStore::new(),
        gate,
        MemoryChallengeStore::new(),
        AuditRecorder::new(audit.clone()),
    );
    Harness {
        core,
        users,
        otps,
        audit,
    }
}

fn device(id: &str) -> DeviceInfo {
    DeviceInfo {
        device_id: DeviceId::new(id),
        device_name: "Tecno Spark 10".into(),
        platform: Platform::Android,
        app_version: Some("2.4.1".into()),
    }
}

fn register_req(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.into(),
        phone: "+231770000001".into(),
        password: "Passw0rd!".into(),
        first_name: "Alice".into(),
        last_name: "Freeman".into(),
        role: UserRole::Customer,
        device: device("dev-alice"),
    }
}

fn login_req(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.into(),
        password: password.into(),
        captcha_token: None,
        device: device("dev-alice"),
    }
}

#[tokio::test]
async fn register_login_refresh_with_replay_detection() {
    let h = harness();

    h.core
        .register(register_req("alice@example.com"), "10.0.0.1", "test-ua")
        .await
        .unwrap();

    let login = h
        .core
        .login(login_req("alice@example.com", "Passw0rd!"), "10.0.0.1", "test-ua")
        .await
        .unwrap();
    let r1 = login.tokens.refresh_token.clone();

    // R1 exchanges for (A2, R2).
    let pair2 = h.core.refresh_token(&r1).await.unwrap();
    assert_ne!(pair2.refresh_token, r1);
    h.core
        .validate_access_token(&pair2.access_token)
        .await
        .unwrap();

    // Using R1 again is a replay: the whole session dies.
    assert_eq!(
        h.core.refresh_token(&r1).await.unwrap_err(),
        AuthError::ReplayDetected
    );

    // A2 referenced the revoked session and stops validating.
    assert_eq!(
        h.core
            .validate_access_token(&pair2.access_token)
            .await
            .unwrap_err(),
        AuthError::TokenInvalid
    );
    // R2 cannot refresh either.
    assert_eq!(
        h.core.refresh_token(&pair2.refresh_token).await.unwrap_err(),
        AuthError::SessionRevoked
    );
}

#[tokio::test]
async fn unknown_and_known_accounts_fail_identically() {
    let h = harness();
    h.core
        .register(register_req("real@example.com"), "10.0.0.1", "ua")
        .await
        .unwrap();

    let missing = h
        .core
        .login(login_req("ghost@example.com", "whatever1"), "10.0.0.1", "ua")
        .await
        .unwrap_err();
    let wrong = h
        .core
        .login(login_req("real@example.com", "wrong-pw1"), "10.0.0.2", "ua")
        .await
        .unwrap_err();

    assert_eq!(missing, AuthError::InvalidCredentials);
    assert_eq!(wrong, AuthError::InvalidCredentials);
}

#[tokio::test]
async fn brute_force_lockout_after_five_failures() {
    let h = harness();
    h.core
        .register(register_req("bob@example.com"), "10.0.0.9", "ua")
        .await
        .unwrap();

    for attempt in 0..5 {
        let mut req = login_req("bob@example.com", "wrong-pw1");
        // Past the captcha threshold the gate wants a solution attached.
        if attempt >= 3 {
            req.captcha_token = Some("solved".into());
        }
        let err = h.core.login(req, "10.0.0.1", "ua").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials, "attempt {attempt}");
    }

    // Sixth attempt is blocked even with the correct password.
    let mut correct = login_req("bob@example.com", "Passw0rd!");
    correct.captcha_token = Some("solved".into());
    match h.core.login(correct, "10.0.0.1", "ua").await.unwrap_err() {
        AuthError::LockedOut { until } => {
            assert!(until >= Utc::now() + Duration::minutes(14));
        }
        other => panic!("expected lockout, got {other:?}"),
    }
}

#[tokio::test]
async fn captcha_demanded_after_three_failures() {
    let h = harness();
    h.core
        .register(register_req("carol@example.com"), "10.0.0.9", "ua")
        .await
        .unwrap();

    for _ in 0..3 {
        let _ = h
            .core
            .login(login_req("carol@example.com", "wrong-pw1"), "10.0.0.1", "ua")
            .await;
    }

    // Without a captcha token the gate refuses outright.
    let err = h
        .core
        .login(login_req("carol@example.com", "Passw0rd!"), "10.0.0.1", "ua")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::CaptchaRequired { remaining: 2 }));

    // With one attached, the correct password gets through and resets the
    // counters.
    let mut req = login_req("carol@example.com", "Passw0rd!");
    req.captcha_token = Some("solved".into());
    h.core.login(req, "10.0.0.1", "ua").await.unwrap();

    h.core
        .login(login_req("carol@example.com", "Passw0rd!"), "10.0.0.1", "ua")
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let h = harness();
    h.core
        .register(register_req("dup@example.com"), "10.0.0.1", "ua")
        .await
        .unwrap();
    assert_eq!(
        h.core
            .register(register_req("dup@example.com"), "10.0.0.1", "ua")
            .await
            .unwrap_err(),
        AuthError::Conflict
    );
}

#[tokio::test]
async fn password_reset_revokes_every_session() {
    let h = harness();
    h.core
        .register(register_req("eve@example.com"), "10.0.0.1", "ua")
        .await
        .unwrap();
    let login = h
        .core
        .login(login_req("eve@example.com", "Passw0rd!"), "10.0.0.1", "ua")
        .await
        .unwrap();

    // Request is uniform for unknown accounts too.
    h.core
        .request_password_reset("nobody@example.com")
        .await
        .unwrap();

    h.core.request_password_reset("eve@example.com").await.unwrap();
    let otp = h.otps.latest_for("eve@example.com").unwrap();

    h.core
        .reset_password("eve@example.com", &otp.code, "N3wPassword!")
        .await
        .unwrap();

    // Old sessions are dead.
    assert_eq!(
        h.core
            .validate_access_token(&login.tokens.access_token)
            .await
            .unwrap_err(),
        AuthError::TokenInvalid
    );
    assert_eq!(
        h.core.refresh_token(&login.tokens.refresh_token).await.unwrap_err(),
        AuthError::SessionRevoked
    );

    // OTP is single-use.
    assert_eq!(
        h.core
            .reset_password("eve@example.com", &otp.code, "An0therPass!")
            .await
            .unwrap_err(),
        AuthError::InvalidCredentials
    );

    // New password works; old does not.
    h.core
        .login(login_req("eve@example.com", "N3wPassword!"), "10.0.0.1", "ua")
        .await
        .unwrap();
    assert_eq!(
        h.core
            .login(login_req("eve@example.com", "Passw0rd!"), "10.0.0.7", "ua")
            .await
            .unwrap_err(),
        AuthError::InvalidCredentials
    );
}

#[tokio::test]
async fn biometric_unlock_roundtrip() {
    let h = harness();
    let reg = h
        .core
        .register(register_req("fay@example.com"), "10.0.0.1", "ua")
        .await
        .unwrap();

    h.core
        .set_session_biometric(reg.user.id, reg.session_id, Some(BiometricType::Fingerprint))
        .await
        .unwrap();

    let device_id = DeviceId::new("dev-alice");
    let challenge = h.core.biometric_challenge(&device_id).await.unwrap();

    let unlock = h
        .core
        .biometric_unlock(BiometricUnlockRequest {
            device_id: device_id.clone(),
            challenge: challenge.challenge.clone(),
            signature: challenge.signature.clone(),
        })
        .await
        .unwrap();
    assert_eq!(unlock.user.id, reg.user.id);
    h.core
        .validate_access_token(&unlock.tokens.access_token)
        .await
        .unwrap();

    // A consumed challenge cannot unlock twice.
    assert_eq!(
        h.core
            .biometric_unlock(BiometricUnlockRequest {
                device_id: device_id.clone(),
                challenge: challenge.challenge.clone(),
                signature: challenge.signature.clone(),
            })
            .await
            .unwrap_err(),
        AuthError::TokenInvalid
    );

    // A forged signature never reaches the challenge store.
    let fresh = h.core.biometric_challenge(&device_id).await.unwrap();
    assert_eq!(
        h.core
            .biometric_unlock(BiometricUnlockRequest {
                device_id,
                challenge: fresh.challenge,
                signature: "AAAA".into(),
            })
            .await
            .unwrap_err(),
        AuthError::InvalidCredentials
    );
}

#[tokio::test]
async fn session_listing_and_targeted_revocation() {
    let h = harness();
    let reg = h
        .core
        .register(register_req("gus@example.com"), "10.0.0.1", "ua")
        .await
        .unwrap();

    // Second device, second session.
    let mut req = login_req("gus@example.com", "Passw0rd!");
    req.device = DeviceInfo {
        device_id: DeviceId::new("dev-tablet"),
        device_name: "Galaxy Tab".into(),
        platform: Platform::Android,
        app_version: None,
    };
    let tablet = h.core.login(req, "10.0.0.2", "ua").await.unwrap();

    let sessions = h.core.list_sessions(reg.user.id).await.unwrap();
    assert_eq!(sessions.iter().filter(|s| s.is_active).count(), 2);

    // Another user cannot revoke it.
    let other = h
        .core
        .register(register_req("mallory@example.com"), "10.0.0.3", "ua")
        .await
        .unwrap();
    assert_eq!(
        h.core
            .revoke_session(other.user.id, tablet.session_id)
            .await
            .unwrap_err(),
        AuthError::PermissionDenied
    );

    h.core
        .revoke_session(reg.user.id, tablet.session_id)
        .await
        .unwrap();
    assert_eq!(
        h.core
            .validate_access_token(&tablet.tokens.access_token)
            .await
            .unwrap_err(),
        AuthError::TokenInvalid
    );

    // The first session is untouched.
    h.core
        .validate_access_token(&reg.tokens.access_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn audit_trail_records_the_story() {
    let h = harness();
    h.core
        .register(register_req("hana@example.com"), "10.0.0.1", "ua")
        .await
        .unwrap();
    let _ = h
        .core
        .login(login_req("hana@example.com", "wrong-pw1"), "10.0.0.1", "ua")
        .await;
    h.core
        .login(login_req("hana@example.com", "Passw0rd!"), "10.0.0.1", "ua")
        .await
        .unwrap();

    let entries = h.audit.all().unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"register"));
    assert!(actions.contains(&"login_failed"));
    assert!(actions.contains(&"login_success"));

    // No password material ever lands in the trail.
    let serialized = serde_json::to_string(&entries).unwrap();
    assert!(!serialized.contains("Passw0rd!"));
    assert!(!serialized.contains("wrong-pw1"));

    // Users store never saw the cleartext either.
    let user = h.users.get_by_email("hana@example.com").await.unwrap();
    assert!(user.password_hash.starts_with("$2"));
    assert_ne!(user.password_hash, "Passw0rd!");
}
