// ============================
// crates/backend-lib/src/auth/rate_limit.rs
// ============================
//! Login throttling: lock a client out after repeated failed logins.

use crate::config::AuthSettings;
use crate::metric_keys;
use dashmap::DashMap;
use metrics::counter;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long an idle failure record is kept
const FAILURE_MEMORY: Duration = Duration::from_secs(24 * 60 * 60);

/// Identifies the client a login attempt came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKey {
    Ip(IpAddr),
    /// Address could not be determined; all such clients share one bucket
    Unknown,
}

impl From<Option<IpAddr>> for ClientKey {
    fn from(ip: Option<IpAddr>) -> Self {
        ip.map_or(ClientKey::Unknown, ClientKey::Ip)
    }
}

/// Failure bookkeeping for one client
#[derive(Debug, Clone)]
struct FailureRecord {
    failed_attempts: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

/// Failed-login counter keyed by client
#[derive(Debug, Clone)]
pub struct AuthRateLimiter {
    attempts: Arc<DashMap<ClientKey, FailureRecord>>,
    max_attempts: u32,
    lockout_duration: Duration,
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::from_settings(&AuthSettings::default())
    }
}

impl AuthRateLimiter {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts,
            lockout_duration,
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_secs(settings.lockout_secs),
        )
    }

    /// Record a failed login. Returns `true` when this failure triggered a lockout.
    pub fn record_failure(&self, client: ClientKey) -> bool {
        let now = Instant::now();
        let mut record = self.attempts.entry(client).or_insert_with(|| FailureRecord {
            failed_attempts: 0,
            last_failure: now,
            locked_until: None,
        });

        // An expired lockout starts a new round
        if record.locked_until.is_some_and(|until| now >= until) {
            record.failed_attempts = 0;
            record.locked_until = None;
        }

        record.failed_attempts += 1;
        record.last_failure = now;

        if record.locked_until.is_none() && record.failed_attempts >= self.max_attempts {
            record.locked_until = Some(now + self.lockout_duration);
            counter!(metric_keys::LOGIN_LOCKOUT).increment(1);
            tracing::warn!(
                client = ?client,
                attempts = record.failed_attempts,
                "client locked out after repeated login failures"
            );
            return true;
        }
        false
    }

    /// Forget failures after a successful login
    pub fn record_success(&self, client: ClientKey) {
        self.attempts.remove(&client);
    }

    /// Whether `client` may attempt a login right now
    pub fn check(&self, client: ClientKey) -> bool {
        self.remaining_lockout(client).is_none()
    }

    /// Time left on the client's lockout, if any
    pub fn remaining_lockout(&self, client: ClientKey) -> Option<Duration> {
        let record = self.attempts.get(&client)?;
        let until = record.locked_until?;
        until.checked_duration_since(Instant::now()).filter(|left| !left.is_zero())
    }

    /// Drop expired lockouts and stale failure records
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.attempts.retain(|_, record| match record.locked_until {
            Some(until) => now < until,
            None => now.duration_since(record.last_failure) < FAILURE_MEMORY,
        });
    }

    /// Number of tracked clients
    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.attempts.len()
    }
}
