//! Redis-backed brute-force gate.
//!
//! Shares failure counters and lockouts across every node of a
//! horizontally scaled deployment. Counters are plain `INCR` keys with a
//! window TTL; lockouts are keys whose value is the unlock timestamp and
//! whose TTL is the lockout duration, so Redis expiry is the state
//! machine's timer.

use crate::error::{AuthError, Result};
use crate::gate::{GateDecision, GatePolicy, LoginGate};
use chrono::{TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Redis gate implementation.
#[derive(Clone)]
pub struct RedisLoginGate {
    conn_manager: ConnectionManager,
    policy: GatePolicy,
}

impl RedisLoginGate {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// `Transient` when the connection cannot be established.
    pub async fn new(redis_url: &str, policy: GatePolicy) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AuthError::Transient(format!("redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AuthError::Transient(format!("redis connect: {e}")))?;
        Ok(Self {
            conn_manager,
            policy,
        })
    }

    fn count_key(kind: &str, value: &str) -> String {
        format!("bf:count:{kind}:{value}")
    }

    fn lock_key(kind: &str, value: &str) -> String {
        format!("bf:lock:{kind}:{value}")
    }

    fn streak_key(kind: &str, value: &str) -> String {
        format!("bf:streak:{kind}:{value}")
    }

    fn keys(email: &str, ip: &str) -> [(&'static str, String); 2] {
        [
            ("email", email.trim().to_ascii_lowercase()),
            ("ip", ip.to_string()),
        ]
    }

    async fn decision_for(
        &self,
        conn: &mut ConnectionManager,
        kind: &str,
        value: &str,
    ) -> Result<GateDecision> {
        let locked_until: Option<i64> = conn
            .get(Self::lock_key(kind, value))
            .await
            .map_err(|e| AuthError::Transient(format!("redis get lock: {e}")))?;
        if let Some(ts) = locked_until {
            if let Some(until) = Utc.timestamp_opt(ts, 0).single() {
                if until > Utc::now() {
                    return Ok(GateDecision::LockedOut { until });
                }
            }
        }

        let failures: Option<u32> = conn
            .get(Self::count_key(kind, value))
            .await
            .map_err(|e| AuthError::Transient(format!("redis get count: {e}")))?;
        let failures = failures.unwrap_or(0);
        if failures >= self.policy.captcha_threshold {
            return Ok(GateDecision::CaptchaRequired {
                remaining: self.policy.lockout_threshold.saturating_sub(failures),
            });
        }
        Ok(GateDecision::Allow)
    }
}

impl LoginGate for RedisLoginGate {
    async fn check(&self, email: &str, ip: &str) -> Result<GateDecision> {
        let mut conn = self.conn_manager.clone();
        let mut worst = GateDecision::Allow;
        for (kind, value) in Self::keys(email, ip) {
            let decision = self.decision_for(&mut conn, kind, &value).await?;
            worst = match (decision, worst) {
                (d @ GateDecision::LockedOut { until }, w) => match w {
                    GateDecision::LockedOut { until: w_until } if w_until >= until => w,
                    _ => d,
                },
                (d @ GateDecision::CaptchaRequired { .. }, GateDecision::Allow) => d,
                (_, w) => w,
            };
        }
        Ok(worst)
    }

    async fn record_failure(&self, email: &str, ip: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let window_secs = self.policy.counter_window.num_seconds().max(1);

        for (kind, value) in Self::keys(email, ip) {
            let count_key = Self::count_key(kind, &value);

            // INCR + window expiry in one round trip so concurrent
            // failures can never lose an increment.
            let (failures,): (u32,) = redis::pipe()
                .atomic()
                .incr(&count_key, 1)
                .expire(&count_key, window_secs)
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(|e| AuthError::Transient(format!("redis record failure: {e}")))?;

            if failures >= self.policy.lockout_threshold {
                let streak_key = Self::streak_key(kind, &value);
                let streak: u32 = conn
                    .incr(&streak_key, 1)
                    .await
                    .map_err(|e| AuthError::Transient(format!("redis streak: {e}")))?;
                let _: () = conn
                    .expire(&streak_key, 48 * 3600)
                    .await
                    .map_err(|e| AuthError::Transient(format!("redis streak expire: {e}")))?;

                let duration = self.policy.lockout_duration(streak.saturating_sub(1));
                let until = Utc::now() + duration;
                let lock_secs = duration.num_seconds().max(1);
                let _: () = redis::pipe()
                    .atomic()
                    .set_ex(Self::lock_key(kind, &value), until.timestamp(), lock_secs as u64)
                    .ignore()
                    .del(&count_key)
                    .ignore()
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| AuthError::Transient(format!("redis lockout: {e}")))?;

                tracing::warn!(
                    kind = kind,
                    key = %value,
                    lockout_secs = lock_secs,
                    streak = streak,
                    "Brute-force lockout engaged"
                );
            }
        }
        Ok(())
    }

    async fn record_success(&self, email: &str, ip: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        for (kind, value) in Self::keys(email, ip) {
            let _: () = conn
                .del(Self::count_key(kind, &value))
                .await
                .map_err(|e| AuthError::Transient(format!("redis reset: {e}")))?;
        }
        Ok(())
    }
}
