//! Brute-force gate.
//!
//! Tracks consecutive authentication failures per email and per source IP
//! independently; a request is blocked when **either** counter is locked.
//! Success resets the email counter and the matching IP counter only —
//! other IPs hammering the same account stay locked.
//!
//! State machine per counter:
//!
//! ```text
//!          failure×3              failure×5          timer
//! NORMAL ───────────► CAPTCHA ───────────► LOCKED ─────────► NORMAL
//!    ▲                                        │
//!    └──────────── success ◄──────────────────┘ (lockout must expire first)
//! ```
//!
//! Repeated lockouts escalate: the lockout duration doubles each time,
//! capped at the configured maximum.

use crate::config::AuthConfig;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// What the gate says about an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed with credential verification.
    Allow,

    /// Proceed only with a captcha solution attached.
    CaptchaRequired {
        /// Attempts left before lockout.
        remaining: u32,
    },

    /// Blocked until the embedded instant.
    LockedOut {
        /// Instant the lockout lifts.
        until: DateTime<Utc>,
    },
}

/// Brute-force gate contract.
///
/// The in-memory implementation is per-process (sufficient for single-node
/// deployments); the Redis implementation in [`crate::stores`] shares
/// counters across nodes. Either way the allow/captcha/locked triple is
/// the whole contract.
pub trait LoginGate: Send + Sync {
    /// Evaluate an attempt for `(email, ip)` before touching credentials.
    ///
    /// # Errors
    ///
    /// Backing-store failures.
    fn check(&self, email: &str, ip: &str)
    -> impl Future<Output = Result<GateDecision>> + Send;

    /// Record a failed attempt against both counters.
    ///
    /// # Errors
    ///
    /// Backing-store failures.
    fn record_failure(&self, email: &str, ip: &str) -> impl Future<Output = Result<()>> + Send;

    /// Record a success: clears the email counter and the matching IP
    /// counter.
    ///
    /// # Errors
    ///
    /// Backing-store failures.
    fn record_success(&self, email: &str, ip: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Gate thresholds, extracted from [`AuthConfig`].
#[derive(Debug, Clone, Copy)]
pub struct GatePolicy {
    /// Failures before a captcha is demanded.
    pub captcha_threshold: u32,

    /// Failures before lockout.
    pub lockout_threshold: u32,

    /// Base lockout duration.
    pub lockout_base: Duration,

    /// Lockout ceiling under escalation.
    pub lockout_max: Duration,

    /// Failure-counter window.
    pub counter_window: Duration,
}

impl GatePolicy {
    /// Extract the gate tunables from an [`AuthConfig`].
    #[must_use]
    pub const fn from_config(config: &AuthConfig) -> Self {
        Self {
            captcha_threshold: config.captcha_threshold,
            lockout_threshold: config.lockout_threshold,
            lockout_base: config.lockout_base,
            lockout_max: config.lockout_max,
            counter_window: config.counter_window,
        }
    }

    /// Lockout duration for the given prior-lockout count: base doubled
    /// per repeat, capped.
    #[must_use]
    pub fn lockout_duration(&self, streak: u32) -> Duration {
        let mut d = self.lockout_base;
        for _ in 0..streak {
            d = d * 2;
            if d >= self.lockout_max {
                return self.lockout_max;
            }
        }
        std::cmp::min(d, self.lockout_max)
    }
}

#[derive(Debug, Default, Clone)]
struct Counter {
    failures: u32,
    window_start: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    lockout_streak: u32,
}

impl Counter {
    fn observe(&mut self, now: DateTime<Utc>, policy: &GatePolicy) {
        if let Some(until) = self.locked_until {
            if now >= until {
                self.locked_until = None;
                self.failures = 0;
                self.window_start = None;
            }
        }
        if let Some(start) = self.window_start {
            if now - start > policy.counter_window {
                self.failures = 0;
                self.window_start = None;
            }
        }
    }

    fn decision(&self, policy: &GatePolicy) -> GateDecision {
        if let Some(until) = self.locked_until {
            return GateDecision::LockedOut { until };
        }
        if self.failures >= policy.captcha_threshold {
            return GateDecision::CaptchaRequired {
                remaining: policy.lockout_threshold.saturating_sub(self.failures),
            };
        }
        GateDecision::Allow
    }

    fn fail(&mut self, now: DateTime<Utc>, policy: &GatePolicy) {
        if self.locked_until.is_some() {
            return;
        }
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }
        self.failures += 1;
        if self.failures >= policy.lockout_threshold {
            self.locked_until = Some(now + policy.lockout_duration(self.lockout_streak));
            self.lockout_streak += 1;
            self.failures = 0;
            self.window_start = None;
        }
    }
}

/// Per-process gate backed by a mutex-protected counter table.
#[derive(Debug, Clone)]
pub struct MemoryLoginGate {
    policy: GatePolicy,
    counters: Arc<Mutex<HashMap<String, Counter>>>,
}

impl MemoryLoginGate {
    /// Create a gate with the given policy.
    #[must_use]
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn email_key(email: &str) -> String {
        format!("email:{}", email.trim().to_ascii_lowercase())
    }

    fn ip_key(ip: &str) -> String {
        format!("ip:{ip}")
    }

    fn with_counters<T>(&self, f: impl FnOnce(&mut HashMap<String, Counter>) -> T) -> Result<T> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| crate::error::AuthError::Internal("gate lock poisoned".into()))?;
        Ok(f(&mut counters))
    }
}

impl LoginGate for MemoryLoginGate {
    async fn check(&self, email: &str, ip: &str) -> Result<GateDecision> {
        let policy = self.policy;
        let now = Utc::now();
        self.with_counters(|counters| {
            let mut worst = GateDecision::Allow;
            for key in [Self::email_key(email), Self::ip_key(ip)] {
                let counter = counters.entry(key).or_default();
                counter.observe(now, &policy);
                match (counter.decision(&policy), worst) {
                    (d @ GateDecision::LockedOut { until }, w) => {
                        // The later unlock wins when both sides are locked.
                        worst = match w {
                            GateDecision::LockedOut { until: w_until } if w_until >= until => w,
                            _ => d,
                        };
                    }
                    (d @ GateDecision::CaptchaRequired { .. }, GateDecision::Allow) => worst = d,
                    _ => {}
                }
            }
            worst
        })
    }

    async fn record_failure(&self, email: &str, ip: &str) -> Result<()> {
        let policy = self.policy;
        let now = Utc::now();
        self.with_counters(|counters| {
            for key in [Self::email_key(email), Self::ip_key(ip)] {
                let counter = counters.entry(key).or_default();
                counter.observe(now, &policy);
                counter.fail(now, &policy);
            }
        })?;
        tracing::debug!(email = %email, ip = %ip, "Recorded login failure");
        Ok(())
    }

    async fn record_success(&self, email: &str, ip: &str) -> Result<()> {
        self.with_counters(|counters| {
            counters.remove(&Self::email_key(email));
            counters.remove(&Self::ip_key(ip));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> MemoryLoginGate {
        MemoryLoginGate::new(GatePolicy::from_config(&AuthConfig::for_development()))
    }

    #[tokio::test]
    async fn test_captcha_after_three_failures() {
        let gate = gate();
        for _ in 0..3 {
            gate.record_failure("bob@x.com", "10.0.0.1").await.unwrap();
        }
        match gate.check("bob@x.com", "10.0.0.1").await.unwrap() {
            GateDecision::CaptchaRequired { remaining } => assert_eq!(remaining, 2),
            other => panic!("expected captcha, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lockout_after_five_failures() {
        let gate = gate();
        for _ in 0..5 {
            gate.record_failure("bob@x.com", "10.0.0.1").await.unwrap();
        }
        match gate.check("bob@x.com", "10.0.0.1").await.unwrap() {
            GateDecision::LockedOut { until } => {
                assert!(until >= Utc::now() + Duration::minutes(14));
            }
            other => panic!("expected lockout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_resets_before_threshold() {
        let gate = gate();
        for _ in 0..4 {
            gate.record_failure("bob@x.com", "10.0.0.1").await.unwrap();
        }
        gate.record_success("bob@x.com", "10.0.0.1").await.unwrap();
        assert_eq!(
            gate.check("bob@x.com", "10.0.0.1").await.unwrap(),
            GateDecision::Allow
        );
    }

    #[tokio::test]
    async fn test_success_does_not_unlock_other_ip() {
        let gate = gate();
        // Attacker from .2 locks the IP counter for .2 and the email counter.
        for _ in 0..5 {
            gate.record_failure("bob@x.com", "10.0.0.2").await.unwrap();
        }
        // Legitimate success from .1 clears the email counter and .1 only.
        gate.record_success("bob@x.com", "10.0.0.1").await.unwrap();

        assert!(matches!(
            gate.check("anyone@else.com", "10.0.0.2").await.unwrap(),
            GateDecision::LockedOut { .. }
        ));
        assert_eq!(
            gate.check("bob@x.com", "10.0.0.1").await.unwrap(),
            GateDecision::Allow
        );
    }

    #[tokio::test]
    async fn test_ip_counter_is_independent_of_email() {
        let gate = gate();
        // Same IP probing five different accounts still locks the IP.
        for i in 0..5 {
            gate.record_failure(&format!("user{i}@x.com"), "10.9.9.9")
                .await
                .unwrap();
        }
        assert!(matches!(
            gate.check("fresh@x.com", "10.9.9.9").await.unwrap(),
            GateDecision::LockedOut { .. }
        ));
        // The same accounts from a clean IP are merely one failure in.
        assert_eq!(
            gate.check("user0@x.com", "10.1.1.1").await.unwrap(),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_lockout_escalation_doubles_and_caps() {
        let policy = GatePolicy::from_config(&AuthConfig::for_development());
        assert_eq!(policy.lockout_duration(0), Duration::minutes(15));
        assert_eq!(policy.lockout_duration(1), Duration::minutes(30));
        assert_eq!(policy.lockout_duration(2), Duration::hours(1));
        assert_eq!(policy.lockout_duration(10), Duration::hours(24));
    }
}
