// ============================
// crates/backend-lib/src/auth/session.rs
// ============================
//! Per-client session state.
//!
//! A [`Session`] is the handler-side view of one client's key-value record.
//! It tracks whether the record changed and which ids must be destroyed when
//! it is persisted (after `cycle_key` or `flush`).
use crate::auth::token_generator::generate_session_id;
use crate::epoch::ProcessEpoch;
use crate::notify::Notifier;
use account_common::{Notice, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Key holding the process epoch the session was stamped with
pub const SERVER_START_TIME_KEY: &str = "server_start_time";
/// Key holding the authenticated user's id
pub const AUTH_USER_KEY: &str = "_auth_user_id";
/// Key holding pending notices
pub const MESSAGES_KEY: &str = "_messages";
/// Undelivered notices kept per session; older ones are dropped first
pub const MAX_QUEUED_NOTICES: usize = 50;

/// Persisted form of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            data: Map::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Whether the record has been idle for at least `ttl`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        (now - self.last_active)
            .to_std()
            .is_ok_and(|idle| idle >= ttl)
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A client's session as seen by a request handler
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    record: SessionRecord,
    is_new: bool,
    modified: bool,
    retired_ids: Vec<String>,
}

impl Session {
    /// Brand-new, empty session with a fresh id
    pub fn new() -> Self {
        Self {
            id: generate_session_id(),
            record: SessionRecord::new(),
            is_new: true,
            modified: false,
            retired_ids: Vec::new(),
        }
    }

    /// Session restored from the store
    pub fn from_record(id: String, record: SessionRecord) -> Self {
        Self {
            id,
            record,
            is_new: false,
            modified: false,
            retired_ids: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// True until the session has been persisted under its current id once
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_empty(&self) -> bool {
        self.record.data.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.data.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.record.data.insert(key.to_string(), value);
        self.modified = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.record.data.remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    /// Epoch stamped into the session, if any.
    /// A value of the wrong shape reads as a mismatch-worthy `None`.
    pub fn epoch(&self) -> Option<ProcessEpoch> {
        self.get(SERVER_START_TIME_KEY)
            .and_then(Value::as_i64)
            .map(ProcessEpoch::from_micros)
    }

    pub fn set_epoch(&mut self, epoch: ProcessEpoch) {
        self.insert(SERVER_START_TIME_KEY, Value::from(epoch.as_micros()));
    }

    /// Authenticated user reference, if any
    pub fn user_id(&self) -> Option<UserId> {
        self.get(AUTH_USER_KEY)
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    /// Mark the session as belonging to `user_id`.
    ///
    /// The id is rotated so a session id known before login cannot be
    /// reused afterwards. Switching users also drops the previous data.
    pub fn login(&mut self, user_id: UserId) {
        match self.user_id() {
            Some(previous) if previous != user_id => self.flush(),
            _ => self.cycle_key(),
        }
        self.insert(AUTH_USER_KEY, Value::String(user_id.to_string()));
    }

    /// Drop all data, including the user reference, and rotate the id
    pub fn logout(&mut self) {
        self.flush();
    }

    /// Keep the data under a new id; the old id is destroyed on persist
    pub fn cycle_key(&mut self) {
        let old = std::mem::replace(&mut self.id, generate_session_id());
        if !self.is_new {
            self.retired_ids.push(old);
        }
        self.is_new = true;
        self.modified = true;
    }

    /// Clear all data and rotate the id
    pub fn flush(&mut self) {
        self.record = SessionRecord::new();
        self.cycle_key();
    }

    /// Ids that must be removed from the store when this session is saved
    pub fn take_retired_ids(&mut self) -> Vec<String> {
        std::mem::take(&mut self.retired_ids)
    }

    /// Record activity; the store uses this for idle expiry
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.record.last_active = now;
    }

    /// Called once the session has been written under its current id
    pub fn mark_persisted(&mut self) {
        self.is_new = false;
        self.modified = false;
    }

    /// Pending notices, oldest first
    pub fn notices(&self) -> Vec<Notice> {
        self.get(MESSAGES_KEY)
            .cloned()
            .and_then(|raw| serde_json::from_value(raw).ok())
            .unwrap_or_default()
    }

    /// Remove and return pending notices
    pub fn take_notices(&mut self) -> Vec<Notice> {
        let notices = self.notices();
        self.remove(MESSAGES_KEY);
        notices
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for Session {
    fn notify(&mut self, notice: Notice) {
        let mut notices = self.notices();
        notices.push(notice);
        let excess = notices.len().saturating_sub(MAX_QUEUED_NOTICES);
        notices.drain(..excess);
        match serde_json::to_value(&notices) {
            Ok(value) => self.insert(MESSAGES_KEY, value),
            Err(e) => tracing::error!(error = %e, "failed to queue notice"),
        }
    }
}
