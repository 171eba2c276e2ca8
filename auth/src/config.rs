//! Authentication configuration.
//!
//! Values come from the environment via [`AuthConfig::from_env`] or from
//! the builder-style setters; nothing here is hardcoded at call sites.

use chrono::Duration;
use sokoni_core::config::{env_parse, load_secret, require_distinct};
use sokoni_core::{ConfigError, Environment, SecretKey};

/// Minimum permitted bcrypt cost.
pub const MIN_BCRYPT_COST: u32 = 10;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Deployment environment; gates fail-closed secret handling.
    pub environment: Environment,

    /// HMAC-SHA-256 key for access tokens.
    pub access_secret: SecretKey,

    /// HMAC-SHA-256 key for refresh tokens. Must differ from
    /// `access_secret`.
    pub refresh_secret: SecretKey,

    /// HMAC key for biometric challenges.
    pub biometric_secret: SecretKey,

    /// Access token lifetime.
    ///
    /// Default: 15 minutes
    pub access_ttl: Duration,

    /// Refresh token lifetime.
    ///
    /// Default: 30 days
    pub refresh_ttl: Duration,

    /// bcrypt cost for password hashing.
    ///
    /// Default: 12, minimum 10
    pub bcrypt_cost: u32,

    /// Consecutive failures before a captcha is demanded.
    ///
    /// Default: 3
    pub captcha_threshold: u32,

    /// Consecutive failures before lockout.
    ///
    /// Default: 5
    pub lockout_threshold: u32,

    /// Base lockout duration; doubles on repeated lockouts.
    ///
    /// Default: 15 minutes
    pub lockout_base: Duration,

    /// Ceiling for escalated lockouts.
    ///
    /// Default: 24 hours
    pub lockout_max: Duration,

    /// Failure-counter window.
    ///
    /// Default: 15 minutes
    pub counter_window: Duration,

    /// Password-reset OTP lifetime.
    ///
    /// Default: 15 minutes
    pub otp_ttl: Duration,

    /// Biometric challenge lifetime.
    ///
    /// Default: 5 minutes
    pub challenge_ttl: Duration,

    /// Session inactivity ceiling.
    ///
    /// Default: 30 days
    pub session_idle_ttl: Duration,

    /// Session absolute lifetime ceiling.
    ///
    /// Default: 90 days
    pub session_absolute_ttl: Duration,
}

impl AuthConfig {
    /// Configuration with generated secrets, for development and tests.
    #[must_use]
    pub fn for_development() -> Self {
        Self {
            environment: Environment::Development,
            access_secret: SecretKey::generate(),
            refresh_secret: SecretKey::generate(),
            biometric_secret: SecretKey::generate(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(30),
            bcrypt_cost: MIN_BCRYPT_COST,
            captcha_threshold: 3,
            lockout_threshold: 5,
            lockout_base: Duration::minutes(15),
            lockout_max: Duration::hours(24),
            counter_window: Duration::minutes(15),
            otp_ttl: Duration::minutes(15),
            challenge_ttl: Duration::minutes(5),
            session_idle_ttl: Duration::days(30),
            session_absolute_ttl: Duration::days(90),
        }
    }

    /// Load from the environment, failing closed on missing or placeholder
    /// secrets in production and staging.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when secrets are missing/malformed, the two
    /// JWT secrets coincide, or `BCRYPT_COST` is below the minimum.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();

        let access_secret = load_secret("JWT_ACCESS_SECRET", environment)?;
        let refresh_secret = load_secret("JWT_REFRESH_SECRET", environment)?;
        require_distinct(
            "JWT_ACCESS_SECRET",
            &access_secret,
            "JWT_REFRESH_SECRET",
            &refresh_secret,
        )?;
        let biometric_secret = load_secret("BIOMETRIC_SECRET", environment)?;

        let bcrypt_cost: u32 = env_parse("BCRYPT_COST", 12);
        if bcrypt_cost < MIN_BCRYPT_COST {
            return Err(ConfigError::InvalidValue {
                name: "BCRYPT_COST".into(),
                reason: format!("{bcrypt_cost} is below the minimum of {MIN_BCRYPT_COST}"),
            });
        }

        Ok(Self {
            environment,
            access_secret,
            refresh_secret,
            biometric_secret,
            access_ttl: Duration::seconds(env_parse("ACCESS_TOKEN_TTL", 15 * 60)),
            refresh_ttl: Duration::seconds(env_parse("REFRESH_TOKEN_TTL", 30 * 24 * 3600)),
            bcrypt_cost,
            captcha_threshold: 3,
            lockout_threshold: env_parse("BRUTE_FORCE_MAX_ATTEMPTS", 5),
            lockout_base: Duration::seconds(env_parse("BRUTE_FORCE_LOCKOUT", 15 * 60)),
            lockout_max: Duration::hours(24),
            counter_window: Duration::minutes(15),
            otp_ttl: Duration::minutes(15),
            challenge_ttl: Duration::minutes(5),
            session_idle_ttl: Duration::days(30),
            session_absolute_ttl: Duration::days(90),
        })
    }

    /// Set the access token lifetime.
    #[must_use]
    pub const fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Set the refresh token lifetime.
    #[must_use]
    pub const fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Set the lockout thresholds.
    #[must_use]
    pub const fn with_lockout(mut self, captcha_after: u32, lockout_after: u32) -> Self {
        self.captcha_threshold = captcha_after;
        self.lockout_threshold = lockout_after;
        self
    }

    /// Set the base lockout duration.
    #[must_use]
    pub const fn with_lockout_base(mut self, base: Duration) -> Self {
        self.lockout_base = base;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_defaults() {
        let config = AuthConfig::for_development();
        assert_eq!(config.access_ttl, Duration::minutes(15));
        assert_eq!(config.refresh_ttl, Duration::days(30));
        assert_eq!(config.captcha_threshold, 3);
        assert_eq!(config.lockout_threshold, 5);
    }

    #[test]
    fn test_builder_overrides() {
        let config = AuthConfig::for_development()
            .with_access_ttl(Duration::minutes(5))
            .with_lockout(2, 4);
        assert_eq!(config.access_ttl, Duration::minutes(5));
        assert_eq!(config.captcha_threshold, 2);
        assert_eq!(config.lockout_threshold, 4);
    }
}
