//! Process epoch: the instant this server process started.
//!
//! Sessions are stamped with the epoch when they are created or logged in.
//! An authenticated session carrying a different epoch belongs to an earlier
//! process and is logged out on its next request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Startup timestamp in microseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessEpoch(i64);

impl ProcessEpoch {
    /// Capture the epoch; call once at startup
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub fn started_at(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.0)
    }
}

impl fmt::Display for ProcessEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.started_at() {
            Some(at) => write!(f, "{}", at.to_rfc3339()),
            None => write!(f, "{}us", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_json_is_a_plain_number() {
        let epoch = ProcessEpoch::from_micros(1_700_000_000_123_456);
        let json = serde_json::to_value(epoch).unwrap();
        assert_eq!(json, serde_json::json!(1_700_000_000_123_456_i64));
        assert_eq!(serde_json::from_value::<ProcessEpoch>(json).unwrap(), epoch);
    }

    #[test]
    fn test_distinct_starts_differ() {
        let first = ProcessEpoch::now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_ne!(first, ProcessEpoch::now());
    }
}
