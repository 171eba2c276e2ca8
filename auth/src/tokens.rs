//! Access and refresh token issuance and verification.
//!
//! Two-token scheme, both HMAC-SHA-256 (`jsonwebtoken` HS256) but signed
//! with **different** secrets: a short-lived access token and a long-lived
//! refresh token bound to one device session. Refresh tokens are stored
//! only as SHA-256 hashes; the cleartext exists client-side and in flight.

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sokoni_core::{SessionId, UserId};
use sokoni_core::model::UserRole;
use uuid::Uuid;

/// `typ` claim value for access tokens.
pub const TYP_ACCESS: &str = "access";

/// `typ` claim value for refresh tokens.
pub const TYP_REFRESH: &str = "refresh";

/// Signed claims carried by both token kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id.
    pub sub: String,

    /// Session id the token is bound to.
    pub sid: String,

    /// Role snapshot at issuance.
    pub role: String,

    /// Issued-at, seconds since epoch.
    pub iat: i64,

    /// Expiry, seconds since epoch.
    pub exp: i64,

    /// Unique token id, used for revocation.
    pub jti: String,

    /// Token kind: `access` or `refresh`.
    pub typ: String,
}

impl Claims {
    /// Parse the subject claim.
    ///
    /// # Errors
    ///
    /// `TokenInvalid` when the claim is not a UUID.
    pub fn user_id(&self) -> Result<UserId> {
        Uuid::parse_str(&self.sub)
            .map(UserId::from_uuid)
            .map_err(|_| AuthError::TokenInvalid)
    }

    /// Parse the session claim.
    ///
    /// # Errors
    ///
    /// `TokenInvalid` when the claim is not a UUID.
    pub fn session_id(&self) -> Result<SessionId> {
        Uuid::parse_str(&self.sid)
            .map(SessionId::from_uuid)
            .map_err(|_| AuthError::TokenInvalid)
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Signed access token.
    pub access_token: String,

    /// Signed refresh token.
    pub refresh_token: String,

    /// Access token expiry.
    pub access_expires_at: DateTime<Utc>,

    /// Refresh token expiry.
    pub refresh_expires_at: DateTime<Utc>,

    /// `jti` of the access token.
    pub access_jti: String,

    /// `jti` of the refresh token.
    pub refresh_jti: String,
}

/// Issues and verifies the two token kinds with their distinct secrets.
#[derive(Clone)]
pub struct TokenSigner {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl TokenSigner {
    /// Build from config; the two signing secrets are distinct by
    /// construction of [`AuthConfig`].
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Issue a fresh access/refresh pair bound to `(user, session)`.
    ///
    /// # Errors
    ///
    /// `Internal` when signing fails.
    pub fn issue_pair(
        &self,
        user_id: UserId,
        session_id: SessionId,
        role: UserRole,
    ) -> Result<TokenPair> {
        let now = Utc::now();
        let access_exp = now + self.access_ttl;
        let refresh_exp = now + self.refresh_ttl;
        let access_jti = Uuid::new_v4().to_string();
        let refresh_jti = Uuid::new_v4().to_string();

        let access = Claims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            jti: access_jti.clone(),
            typ: TYP_ACCESS.to_string(),
        };
        let refresh = Claims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            jti: refresh_jti.clone(),
            typ: TYP_REFRESH.to_string(),
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = jsonwebtoken::encode(&header, &access, &self.access_encoding)
            .map_err(|e| AuthError::Internal(format!("sign access token: {e}")))?;
        let refresh_token = jsonwebtoken::encode(&header, &refresh, &self.refresh_encoding)
            .map_err(|e| AuthError::Internal(format!("sign refresh token: {e}")))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at: access_exp,
            refresh_expires_at: refresh_exp,
            access_jti,
            refresh_jti,
        })
    }

    /// Verify an access token: signature, expiry, `typ=access`.
    ///
    /// # Errors
    ///
    /// `TokenExpired` / `TokenInvalid`.
    pub fn verify_access(&self, token: &str) -> Result<Claims> {
        let claims = self.verify(token, &self.access_decoding)?;
        if claims.typ != TYP_ACCESS {
            return Err(AuthError::TokenInvalid);
        }
        Ok(claims)
    }

    /// Verify a refresh token: signature, expiry, `typ=refresh`.
    ///
    /// # Errors
    ///
    /// `TokenExpired` / `TokenInvalid`.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims> {
        let claims = self.verify(token, &self.refresh_decoding)?;
        if claims.typ != TYP_REFRESH {
            return Err(AuthError::TokenInvalid);
        }
        Ok(claims)
    }

    fn verify(&self, token: &str, key: &DecodingKey) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        jsonwebtoken::decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }
}

/// SHA-256 hex of a refresh token: what the session row stores, and what
/// the rotation compare-and-set operates on.
#[must_use]
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write as _;
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn signer() -> TokenSigner {
        TokenSigner::new(&AuthConfig::for_development())
    }

    #[test]
    fn test_issue_and_verify_pair() {
        let signer = signer();
        let user = UserId::new();
        let session = SessionId::new();
        let pair = signer.issue_pair(user, session, UserRole::Customer).unwrap();

        let access = signer.verify_access(&pair.access_token).unwrap();
        assert_eq!(access.user_id().unwrap(), user);
        assert_eq!(access.session_id().unwrap(), session);
        assert_eq!(access.role, "customer");
        assert_eq!(access.jti, pair.access_jti);

        let refresh = signer.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.typ, TYP_REFRESH);
    }

    #[test]
    fn test_token_kinds_are_not_interchangeable() {
        let signer = signer();
        let pair = signer
            .issue_pair(UserId::new(), SessionId::new(), UserRole::Customer)
            .unwrap();

        // Wrong kind and wrong key: refresh is signed with the other secret.
        assert_eq!(
            signer.verify_access(&pair.refresh_token).unwrap_err(),
            AuthError::TokenInvalid
        );
        assert_eq!(
            signer.verify_refresh(&pair.access_token).unwrap_err(),
            AuthError::TokenInvalid
        );
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let ours = signer();
        let theirs = signer();
        let pair = theirs
            .issue_pair(UserId::new(), SessionId::new(), UserRole::Customer)
            .unwrap();
        assert_eq!(
            ours.verify_access(&pair.access_token).unwrap_err(),
            AuthError::TokenInvalid
        );
    }

    #[test]
    fn test_expired_token_reported_as_expired() {
        let config = AuthConfig::for_development().with_access_ttl(chrono::Duration::seconds(-10));
        let signer = TokenSigner::new(&config);
        let pair = signer
            .issue_pair(UserId::new(), SessionId::new(), UserRole::Customer)
            .unwrap();
        assert_eq!(
            signer.verify_access(&pair.access_token).unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[test]
    fn test_refresh_hash_is_stable_and_distinct() {
        assert_eq!(hash_refresh_token("abc"), hash_refresh_token("abc"));
        assert_ne!(hash_refresh_token("abc"), hash_refresh_token("abd"));
        assert_eq!(hash_refresh_token("abc").len(), 64);
    }
}
