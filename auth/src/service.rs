//! Authentication core.
//!
//! [`AuthCore`] owns every auth flow: registration, the gated login,
//! refresh rotation with theft detection, validation against the
//! revocation list, biometric unlock, password reset, and session
//! management. It depends only on the store traits, so the same code runs
//! against the in-memory stores in tests and PostgreSQL/Redis in
//! production.

use crate::biometric::{self, BiometricChallenge, ChallengeStore};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::gate::{GateDecision, LoginGate};
use crate::password;
use crate::tokens::{hash_refresh_token, Claims, TokenPair, TokenSigner};
use crate::types::{
    AuthResponse, BiometricUnlockRequest, DeviceInfo, LoginRequest, RegisterRequest, SessionInfo,
    UserProfile,
};
use crate::utils;
use chrono::Utc;
use sokoni_core::audit::{AuditAction, AuditActor, AuditEntry, AuditResource};
use sokoni_core::ids::{SessionId, UserId};
use sokoni_core::model::{normalize_email, BiometricType, DeviceSession, OtpPurpose, OtpRecord, User, UserRole};
use sokoni_core::repository::{AuditStore, OtpStore, RevocationStore, SessionStore, UserStore};
use sokoni_core::{AuditRecorder, Money, RepoError};

/// Bounded retries for optimistic-concurrency loops inside the service.
const VERSION_RETRY_LIMIT: usize = 3;

/// The authentication core.
///
/// Generic over its stores; construct once at startup and share (`Clone`
/// is cheap — stores are handles).
#[derive(Clone)]
pub struct AuthCore<U, S, O, R, G, C, A>
where
    U: UserStore + Clone,
    S: SessionStore + Clone,
    O: OtpStore + Clone,
    R: RevocationStore + Clone,
    G: LoginGate + Clone,
    C: ChallengeStore + Clone,
    A: AuditStore + Clone,
{
    users: U,
    sessions: S,
    otps: O,
    revocations: R,
    gate: G,
    challenges: C,
    audit: AuditRecorder<A>,
    signer: TokenSigner,
    config: AuthConfig,
}

impl<U, S, O, R, G, C, A> AuthCore<U, S, O, R, G, C, A>
where
    U: UserStore + Clone,
    S: SessionStore + Clone,
    O: OtpStore + Clone,
    R: RevocationStore + Clone,
    G: LoginGate + Clone,
    C: ChallengeStore + Clone,
    A: AuditStore + Clone,
{
    /// Wire the core together.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AuthConfig,
        users: U,
        sessions: S,
        otps: O,
        revocations: R,
        gate: G,
        challenges: C,
        audit: AuditRecorder<A>,
    ) -> Self {
        let signer = TokenSigner::new(&config);
        Self {
            users,
            sessions,
            otps,
            revocations,
            gate,
            challenges,
            audit,
            signer,
            config,
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Registration and login
    // ═══════════════════════════════════════════════════════════

    /// Register a new account and open its first session.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on validation failures, `Conflict` when the email is
    /// taken.
    pub async fn register(
        &self,
        req: RegisterRequest,
        client_ip: &str,
        user_agent: &str,
    ) -> Result<AuthResponse> {
        utils::validate_email(&req.email)?;
        utils::validate_device_name(&req.device.device_name)?;
        password::validate_password_strength(&req.password)?;
        if req.role == UserRole::Admin {
            return Err(AuthError::PermissionDenied);
        }

        let hash = password::hash_password(&req.password, self.config.bcrypt_cost)?;
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email: normalize_email(&req.email),
            phone: req.phone,
            first_name: req.first_name,
            last_name: req.last_name,
            password_hash: hash,
            role: req.role,
            email_verified: false,
            profile_image: None,
            address: None,
            wallet_balance: Money::ZERO,
            wallet_currency: "LRD".to_string(),
            last_sync_at: None,
            is_offline: false,
            version: 1,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        let created = match self.users.create(&user).await {
            Ok(u) => u,
            Err(RepoError::UniqueViolation) => {
                self.audit
                    .record(
                        AuditEntry::builder(AuditAction::Register, AuditResource::User)
                            .client_ip(client_ip)
                            .user_agent(user_agent)
                            .failed("duplicate email")
                            .build(),
                    )
                    .await;
                return Err(AuthError::Conflict);
            }
            Err(e) => return Err(e.into()),
        };

        let (session, tokens) = self
            .open_session(&created, &req.device, client_ip, user_agent)
            .await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::Register, AuditResource::User)
                    .actor(AuditActor::user(created.id, &created.email, created.role))
                    .resource_id(created.id.to_string())
                    .client_ip(client_ip)
                    .user_agent(user_agent)
                    .detail("platform", req.device.platform.as_str())
                    .build(),
            )
            .await;

        Ok(AuthResponse {
            user: UserProfile::from(&created),
            session_id: session.id,
            tokens,
        })
    }

    /// Authenticate with email and password through the brute-force gate.
    ///
    /// # Errors
    ///
    /// `LockedOut` / `CaptchaRequired` from the gate,
    /// `InvalidCredentials` on any credential failure (uniform timing and
    /// message whether or not the account exists).
    pub async fn login(
        &self,
        req: LoginRequest,
        client_ip: &str,
        user_agent: &str,
    ) -> Result<AuthResponse> {
        let email = normalize_email(&req.email);

        match self.gate.check(&email, client_ip).await? {
            GateDecision::LockedOut { until } => {
                self.audit
                    .record(
                        AuditEntry::builder(AuditAction::LoginBlocked, AuditResource::User)
                            .client_ip(client_ip)
                            .user_agent(user_agent)
                            .failed("locked out")
                            .build(),
                    )
                    .await;
                return Err(AuthError::LockedOut { until });
            }
            GateDecision::CaptchaRequired { remaining } => {
                let solved = req
                    .captcha_token
                    .as_deref()
                    .is_some_and(|t| !t.trim().is_empty());
                if !solved {
                    return Err(AuthError::CaptchaRequired { remaining });
                }
            }
            GateDecision::Allow => {}
        }

        let user = match self.users.get_by_email(&email).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => {
                // Burn a bcrypt compare so a miss costs what a mismatch costs.
                password::burn_dummy_verify(&req.password);
                self.gate.record_failure(&email, client_ip).await?;
                self.record_login_failure(client_ip, user_agent).await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        if password::verify_password(&req.password, &user.password_hash).is_err() {
            self.gate.record_failure(&email, client_ip).await?;
            self.record_login_failure(client_ip, user_agent).await;
            return Err(AuthError::InvalidCredentials);
        }

        self.gate.record_success(&email, client_ip).await?;

        let (session, tokens) = self
            .open_session(&user, &req.device, client_ip, user_agent)
            .await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::LoginSuccess, AuditResource::Session)
                    .actor(AuditActor::user(user.id, &user.email, user.role))
                    .resource_id(session.id.to_string())
                    .client_ip(client_ip)
                    .user_agent(user_agent)
                    .detail("device_id", session.device_id.as_str())
                    .build(),
            )
            .await;

        Ok(AuthResponse {
            user: UserProfile::from(&user),
            session_id: session.id,
            tokens,
        })
    }

    async fn record_login_failure(&self, client_ip: &str, user_agent: &str) {
        self.audit
            .record(
                AuditEntry::builder(AuditAction::LoginFailed, AuditResource::User)
                    .client_ip(client_ip)
                    .user_agent(user_agent)
                    .failed("invalid credentials")
                    .build(),
            )
            .await;
    }

    /// Open a session for a verified user: revoke any prior active session
    /// on the same device, mint a pair, store the refresh hash.
    async fn open_session(
        &self,
        user: &User,
        device: &DeviceInfo,
        client_ip: &str,
        user_agent: &str,
    ) -> Result<(DeviceSession, TokenPair)> {
        if let Some(prior) = self.sessions.find_active_by_device(&device.device_id).await? {
            if prior.user_id == user.id {
                self.sessions.revoke(prior.id).await?;
                self.revocations
                    .revoke(&prior.id.to_string(), self.refresh_ttl_std())
                    .await?;
            }
        }

        let now = Utc::now();
        let session_id = SessionId::new();
        let tokens = self.signer.issue_pair(user.id, session_id, user.role)?;
        let session = DeviceSession {
            id: session_id,
            user_id: user.id,
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            platform: device.platform,
            app_version: device.app_version.clone(),
            ip_address: client_ip.to_string(),
            user_agent: user_agent.to_string(),
            refresh_token_hash: Some(hash_refresh_token(&tokens.refresh_token)),
            is_active: true,
            biometric_enabled: false,
            biometric_type: None,
            last_activity: now,
            created_at: now,
            revoked_at: None,
        };
        let session = self.sessions.create(&session).await?;
        Ok((session, tokens))
    }

    // ═══════════════════════════════════════════════════════════
    // Token lifecycle
    // ═══════════════════════════════════════════════════════════

    /// Exchange a refresh token for a new pair (single-use rotation).
    ///
    /// A second use of the same token loses the compare-and-set, revokes
    /// the whole session, and returns `ReplayDetected` — the theft signal.
    ///
    /// # Errors
    ///
    /// `TokenExpired` / `TokenInvalid` / `SessionRevoked` /
    /// `ReplayDetected`.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.signer.verify_refresh(refresh_token)?;
        let session_id = claims.session_id()?;
        let user_id = claims.user_id()?;

        if self.revocations.is_revoked(&session_id.to_string()).await? {
            return Err(AuthError::SessionRevoked);
        }
        if self.revocations.is_revoked(&claims.jti).await? {
            // The token was already rotated away; treat like any replay.
            return self.handle_replay(session_id, &claims).await;
        }

        let session = match self.sessions.get(session_id).await {
            Ok(s) => s,
            Err(RepoError::NotFound) => return Err(AuthError::TokenInvalid),
            Err(e) => return Err(e.into()),
        };
        if !session.is_active {
            return Err(AuthError::SessionRevoked);
        }

        let role = UserRole::parse(&claims.role).unwrap_or(UserRole::Customer);
        let presented_hash = hash_refresh_token(refresh_token);
        let pair = self.signer.issue_pair(user_id, session_id, role)?;
        let new_hash = hash_refresh_token(&pair.refresh_token);

        match self
            .sessions
            .rotate_refresh_token(session_id, &presented_hash, &new_hash)
            .await
        {
            Ok(_) => {}
            Err(RepoError::VersionConflict) => {
                return self.handle_replay(session_id, &claims).await;
            }
            Err(RepoError::NotFound) => return Err(AuthError::SessionRevoked),
            Err(e) => return Err(e.into()),
        }

        // The old token keeps its signature until natural expiry, so
        // blacklist its jti for exactly that long.
        let remaining = (claims.expires_at() - Utc::now())
            .to_std()
            .unwrap_or_default();
        self.revocations.revoke(&claims.jti, remaining).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::TokenRefresh, AuditResource::Session)
                    .actor(AuditActor {
                        user_id: Some(user_id),
                        email: None,
                        role: UserRole::parse(&claims.role),
                    })
                    .resource_id(session_id.to_string())
                    .build(),
            )
            .await;

        Ok(pair)
    }

    /// A refresh token was presented twice: revoke the session entirely.
    async fn handle_replay(&self, session_id: SessionId, claims: &Claims) -> Result<TokenPair> {
        let _ = self.sessions.revoke(session_id).await;
        self.revocations
            .revoke(&session_id.to_string(), self.refresh_ttl_std())
            .await?;
        tracing::warn!(
            session_id = %session_id,
            "Refresh token replay detected; session revoked"
        );
        self.audit
            .record(
                AuditEntry::builder(AuditAction::TokenReplayDetected, AuditResource::Session)
                    .actor(AuditActor {
                        user_id: claims.user_id().ok(),
                        email: None,
                        role: UserRole::parse(&claims.role),
                    })
                    .resource_id(session_id.to_string())
                    .failed("refresh token reuse")
                    .build(),
            )
            .await;
        Err(AuthError::ReplayDetected)
    }

    /// Validate an access token: signature, expiry, `typ`, revocation list
    /// (jti and session), session liveness, and session TTLs.
    ///
    /// # Errors
    ///
    /// `TokenExpired` / `TokenInvalid`.
    pub async fn validate_access_token(&self, access_token: &str) -> Result<Claims> {
        let claims = self.signer.verify_access(access_token)?;
        let session_id = claims.session_id()?;

        if self.revocations.is_revoked(&claims.jti).await?
            || self.revocations.is_revoked(&session_id.to_string()).await?
        {
            return Err(AuthError::TokenInvalid);
        }

        let session = match self.sessions.get(session_id).await {
            Ok(s) => s,
            Err(RepoError::NotFound) => return Err(AuthError::TokenInvalid),
            Err(e) => return Err(e.into()),
        };
        if !session.is_active {
            return Err(AuthError::TokenInvalid);
        }
        let now = Utc::now();
        if session.is_expired(now, self.config.session_idle_ttl, self.config.session_absolute_ttl)
        {
            return Err(AuthError::TokenExpired);
        }
        self.sessions.touch(session_id, now).await?;
        Ok(claims)
    }

    /// Revoke the session behind a refresh token (logout).
    ///
    /// # Errors
    ///
    /// `TokenInvalid` when the token does not verify.
    pub async fn revoke_token(&self, refresh_token: &str) -> Result<()> {
        let claims = self.signer.verify_refresh(refresh_token)?;
        let session_id = claims.session_id()?;
        let _ = self.sessions.revoke(session_id).await;
        self.revocations
            .revoke(&session_id.to_string(), self.refresh_ttl_std())
            .await?;
        let remaining = (claims.expires_at() - Utc::now())
            .to_std()
            .unwrap_or_default();
        self.revocations.revoke(&claims.jti, remaining).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::Logout, AuditResource::Session)
                    .actor(AuditActor {
                        user_id: claims.user_id().ok(),
                        email: None,
                        role: UserRole::parse(&claims.role),
                    })
                    .resource_id(session_id.to_string())
                    .build(),
            )
            .await;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    // Session management
    // ═══════════════════════════════════════════════════════════

    /// List a user's sessions, newest first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_sessions(&self, user_id: UserId) -> Result<Vec<SessionInfo>> {
        let sessions = self.sessions.list_for_user(user_id).await?;
        Ok(sessions.iter().map(SessionInfo::from).collect())
    }

    /// Revoke one of the caller's sessions.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sessions, `PermissionDenied` for sessions
    /// owned by someone else.
    pub async fn revoke_session(&self, user_id: UserId, session_id: SessionId) -> Result<()> {
        let session = self.sessions.get(session_id).await?;
        if session.user_id != user_id {
            return Err(AuthError::PermissionDenied);
        }
        self.sessions.revoke(session_id).await?;
        self.revocations
            .revoke(&session_id.to_string(), self.refresh_ttl_std())
            .await?;
        self.audit
            .record(
                AuditEntry::builder(AuditAction::SessionRevoked, AuditResource::Session)
                    .actor(AuditActor {
                        user_id: Some(user_id),
                        email: None,
                        role: None,
                    })
                    .resource_id(session_id.to_string())
                    .build(),
            )
            .await;
        Ok(())
    }

    /// Enable or disable biometric unlock on one of the caller's sessions.
    ///
    /// # Errors
    ///
    /// `NotFound` / `PermissionDenied`.
    pub async fn set_session_biometric(
        &self,
        user_id: UserId,
        session_id: SessionId,
        biometric: Option<BiometricType>,
    ) -> Result<SessionInfo> {
        let session = self.sessions.get(session_id).await?;
        if session.user_id != user_id {
            return Err(AuthError::PermissionDenied);
        }
        let updated = self.sessions.set_biometric(session_id, biometric).await?;
        Ok(SessionInfo::from(&updated))
    }

    // ═══════════════════════════════════════════════════════════
    // Password reset
    // ═══════════════════════════════════════════════════════════

    /// Request a password reset. The outcome is identical whether or not
    /// the account exists; when it does, a 6-digit OTP is created for the
    /// out-of-band mailer to deliver.
    ///
    /// # Errors
    ///
    /// Store failures only — never "no such account".
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        match self.users.get_by_email(&email).await {
            Ok(user) => {
                let now = Utc::now();
                let otp = OtpRecord {
                    email: email.clone(),
                    code: generate_otp_code(),
                    purpose: OtpPurpose::PasswordReset,
                    expires_at: now + self.config.otp_ttl,
                    used_at: None,
                    created_at: now,
                };
                self.otps.create(&otp).await?;
                self.audit
                    .record(
                        AuditEntry::builder(AuditAction::PasswordResetRequest, AuditResource::Otp)
                            .actor(AuditActor::user(user.id, &user.email, user.role))
                            .build(),
                    )
                    .await;
            }
            Err(RepoError::NotFound) => {
                // Same response either way; only the audit trail knows.
                self.audit
                    .record(
                        AuditEntry::builder(AuditAction::PasswordResetRequest, AuditResource::Otp)
                            .detail("known_account", false)
                            .build(),
                    )
                    .await;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Confirm a password reset: consume the OTP, re-hash, revoke every
    /// session the user has.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` when the code does not verify,
    /// `InvalidInput` when the new password is weak.
    pub async fn reset_password(&self, email: &str, code: &str, new_password: &str) -> Result<()> {
        password::validate_password_strength(new_password)?;
        let email = normalize_email(email);
        let now = Utc::now();

        self.otps
            .consume(&email, code, OtpPurpose::PasswordReset, now)
            .await
            .map_err(|e| match e {
                RepoError::NotFound => AuthError::InvalidCredentials,
                other => other.into(),
            })?;

        let new_hash = password::hash_password(new_password, self.config.bcrypt_cost)?;

        let mut user = self
            .users
            .get_by_email(&email)
            .await
            .map_err(|e| match e {
                RepoError::NotFound => AuthError::InvalidCredentials,
                other => other.into(),
            })?;
        for attempt in 0.. {
            match self
                .users
                .update_password(user.id, &new_hash, user.version)
                .await
            {
                Ok(_) => break,
                Err(RepoError::VersionConflict) if attempt < VERSION_RETRY_LIMIT => {
                    user = self.users.get(user.id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let revoked = self.sessions.revoke_all_for_user(user.id).await?;
        for session_id in &revoked {
            self.revocations
                .revoke(&session_id.to_string(), self.refresh_ttl_std())
                .await?;
        }

        self.audit
            .record(
                AuditEntry::builder(AuditAction::PasswordResetConfirm, AuditResource::User)
                    .actor(AuditActor::user(user.id, &user.email, user.role))
                    .resource_id(user.id.to_string())
                    .detail("sessions_revoked", revoked.len() as u64)
                    .build(),
            )
            .await;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    // Biometric unlock
    // ═══════════════════════════════════════════════════════════

    /// Issue a biometric challenge for a device.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn biometric_challenge(
        &self,
        device_id: &sokoni_core::ids::DeviceId,
    ) -> Result<BiometricChallenge> {
        let challenge = biometric::generate_challenge();
        let signature =
            biometric::sign_challenge(&self.config.biometric_secret, device_id, &challenge);
        let expires_at = Utc::now() + self.config.challenge_ttl;
        self.challenges.put(device_id, &challenge, expires_at).await?;
        Ok(BiometricChallenge {
            challenge,
            signature,
            expires_at,
        })
    }

    /// Redeem a biometric challenge for a fresh token pair.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` on signature or session mismatch,
    /// `TokenExpired` on a stale challenge, `TokenInvalid` on an unknown
    /// or already-used one.
    pub async fn biometric_unlock(&self, req: BiometricUnlockRequest) -> Result<AuthResponse> {
        if !biometric::verify_signature(
            &self.config.biometric_secret,
            &req.device_id,
            &req.challenge,
            &req.signature,
        ) {
            return Err(AuthError::InvalidCredentials);
        }

        // Single-use: consuming removes the challenge whatever happens next.
        let expires_at = self
            .challenges
            .consume(&req.device_id, &req.challenge)
            .await?
            .ok_or(AuthError::TokenInvalid)?;
        if Utc::now() > expires_at {
            return Err(AuthError::TokenExpired);
        }

        let session = self
            .sessions
            .find_active_by_device(&req.device_id)
            .await?
            .filter(|s| s.biometric_enabled)
            .ok_or(AuthError::InvalidCredentials)?;

        let user = self.users.get(session.user_id).await?;
        let pair = self.signer.issue_pair(user.id, session.id, user.role)?;
        let new_hash = hash_refresh_token(&pair.refresh_token);

        let current_hash = session
            .refresh_token_hash
            .as_deref()
            .ok_or(AuthError::SessionRevoked)?;
        self.sessions
            .rotate_refresh_token(session.id, current_hash, &new_hash)
            .await
            .map_err(|e| match e {
                RepoError::VersionConflict => AuthError::VersionConflict,
                RepoError::NotFound => AuthError::SessionRevoked,
                other => other.into(),
            })?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::BiometricUnlock, AuditResource::Session)
                    .actor(AuditActor::user(user.id, &user.email, user.role))
                    .resource_id(session.id.to_string())
                    .detail("device_id", req.device_id.as_str())
                    .build(),
            )
            .await;

        Ok(AuthResponse {
            user: UserProfile::from(&user),
            session_id: session.id,
            tokens: pair,
        })
    }

    fn refresh_ttl_std(&self) -> std::time::Duration {
        self.config.refresh_ttl.to_std().unwrap_or_default()
    }
}

/// Generate a 6-digit OTP code with leading zeros preserved.
fn generate_otp_code() -> String {
    use rand::Rng as _;
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}
