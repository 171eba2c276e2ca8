//! Environment-sourced configuration primitives.
//!
//! Service crates build their own config structs; this module owns the
//! pieces they share: the deployment [`Environment`], 32-byte
//! [`SecretKey`] handling with fail-closed semantics, and small parsing
//! helpers for numeric tunables.

use crate::error::ConfigError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore as _;
use std::str::FromStr;

/// Deployment environment. Gates the fail-closed behavior for secrets:
/// production and staging refuse to start without real key material,
/// development generates throwaway keys with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Live traffic.
    Production,

    /// Pre-production mirror; treated like production for secrets.
    Staging,

    /// Local development and tests.
    #[default]
    Development,
}

impl Environment {
    /// Read from the `ENV` variable, defaulting to development.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("ENV")
            .ok()
            .and_then(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }

    /// Parse an environment tag.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" | "dev" => Some(Self::Development),
            _ => None,
        }
    }

    /// `true` when missing or malformed secrets must abort startup.
    #[must_use]
    pub const fn fails_closed(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Known placeholder values that must never reach production.
const PLACEHOLDERS: &[&str] = &[
    "CHANGE_ME",
    "changeme",
    "dev-secret",
    "your-secret-key",
    "secret",
];

/// A 32-byte process-held key (JWT signing, AES-256-GCM, biometric HMAC).
///
/// Loaded once at startup from a base64-encoded environment variable and
/// never written at runtime. `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    bytes: [u8; 32],
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl SecretKey {
    /// Decode a base64 secret, rejecting placeholders, wrong lengths, and
    /// all-zero keys.
    ///
    /// # Errors
    ///
    /// `MalformedSecret` / `PlaceholderSecret` keyed by `name`.
    pub fn from_base64(name: &str, raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if PLACEHOLDERS.contains(&trimmed) {
            return Err(ConfigError::PlaceholderSecret { name: name.into() });
        }
        let decoded = STANDARD
            .decode(trimmed.as_bytes())
            .map_err(|_| ConfigError::MalformedSecret { name: name.into() })?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| ConfigError::MalformedSecret { name: name.into() })?;
        if bytes.iter().all(|b| *b == 0) {
            return Err(ConfigError::PlaceholderSecret { name: name.into() });
        }
        Ok(Self { bytes })
    }

    /// Generate a random key from the OS RNG (development fallback).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Borrow the raw key material.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Load the secret named `name` from the environment.
///
/// Missing secrets abort in environments that fail closed; in development
/// a random key is generated and a warning logged.
///
/// # Errors
///
/// `MissingSecret` / `MalformedSecret` / `PlaceholderSecret`.
pub fn load_secret(name: &str, environment: Environment) -> Result<SecretKey, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => SecretKey::from_base64(name, &raw),
        _ if environment.fails_closed() => Err(ConfigError::MissingSecret { name: name.into() }),
        _ => {
            tracing::warn!(
                secret = name,
                "Secret not set; generated a throwaway key (development only)"
            );
            Ok(SecretKey::generate())
        }
    }
}

/// Require that two secrets differ (access vs refresh signing keys).
///
/// # Errors
///
/// `SecretsNotDistinct` naming both variables.
pub fn require_distinct(
    a_name: &str,
    a: &SecretKey,
    b_name: &str,
    b: &SecretKey,
) -> Result<(), ConfigError> {
    if a.as_bytes() == b.as_bytes() {
        return Err(ConfigError::SecretsNotDistinct {
            a: a_name.into(),
            b: b_name.into(),
        });
    }
    Ok(())
}

/// Parse an optional numeric tunable from the environment, falling back
/// to `default` when unset or unparseable.
#[must_use]
pub fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64_of(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_valid_secret_roundtrip() {
        let raw = b64_of(&[7u8; 32]);
        let key = SecretKey::from_base64("JWT_ACCESS_SECRET", &raw).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let raw = b64_of(&[7u8; 16]);
        let err = SecretKey::from_base64("JWT_ACCESS_SECRET", &raw).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedSecret { .. }));
    }

    #[test]
    fn test_placeholder_and_zero_key_rejected() {
        assert!(matches!(
            SecretKey::from_base64("ENCRYPTION_KEY", "CHANGE_ME"),
            Err(ConfigError::PlaceholderSecret { .. })
        ));
        assert!(matches!(
            SecretKey::from_base64("ENCRYPTION_KEY", &b64_of(&[0u8; 32])),
            Err(ConfigError::PlaceholderSecret { .. })
        ));
    }

    #[test]
    fn test_distinctness_enforced() {
        let a = SecretKey::from_base64("A", &b64_of(&[1u8; 32])).unwrap();
        let b = SecretKey::from_base64("B", &b64_of(&[1u8; 32])).unwrap();
        let c = SecretKey::from_base64("C", &b64_of(&[2u8; 32])).unwrap();
        assert!(require_distinct("A", &a, "B", &b).is_err());
        assert!(require_distinct("A", &a, "C", &c).is_ok());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SecretKey::generate();
        assert_eq!(format!("{key:?}"), "SecretKey(..)");
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::parse("Production"), Some(Environment::Production));
        assert_eq!(Environment::parse("dev"), Some(Environment::Development));
        assert_eq!(Environment::parse("qa"), None);
        assert!(Environment::Production.fails_closed());
        assert!(!Environment::Development.fails_closed());
    }
}
