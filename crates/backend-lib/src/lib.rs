// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core functionality for the account server: login, signup and logout
//! over server-side sessions.

pub mod auth;
pub mod config;
pub mod epoch;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metric_keys;
pub mod middleware;
pub mod notify;
pub mod render;
pub mod router;
pub mod storage;
pub mod validation;

use crate::auth::{AuthRateLimiter, FileSessionStore, MemorySessionStore, SessionStore};
use crate::config::Settings;
use crate::epoch::ProcessEpoch;
use crate::storage::{FlatFileUserStore, MemoryUserStore};
use std::sync::Arc;
use std::time::Duration;

/// Sub-directory of the data directory holding session files
pub const SESSIONS_DIR: &str = "sessions";

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState<S> {
    /// Account storage
    pub users: S,
    /// Session storage
    pub sessions: Arc<dyn SessionStore>,
    /// Settings
    pub settings: Arc<Settings>,
    /// When this process started
    pub epoch: ProcessEpoch,
    /// Failed-login throttle
    pub login_limiter: Arc<AuthRateLimiter>,
}

impl<S> AppState<S> {
    /// Create a new application state
    pub fn new(
        users: S,
        sessions: Arc<dyn SessionStore>,
        settings: Settings,
        epoch: ProcessEpoch,
    ) -> Self {
        let login_limiter = Arc::new(AuthRateLimiter::from_settings(&settings.auth));
        Self {
            users,
            sessions,
            settings: Arc::new(settings),
            epoch,
            login_limiter,
        }
    }
}

impl AppState<FlatFileUserStore> {
    /// State backed by files under `storage.path`
    pub fn with_file_storage(settings: Settings, epoch: ProcessEpoch) -> anyhow::Result<Self> {
        let root = settings.storage.path.clone();
        let users = FlatFileUserStore::new(&root)?;
        let sessions = FileSessionStore::new(root.join(SESSIONS_DIR), session_ttl(&settings))?;
        Ok(Self::new(users, Arc::new(sessions), settings, epoch))
    }
}

impl AppState<MemoryUserStore> {
    /// State kept entirely in memory
    pub fn with_memory_storage(settings: Settings, epoch: ProcessEpoch) -> Self {
        let sessions = MemorySessionStore::new(session_ttl(&settings));
        Self::new(MemoryUserStore::new(), Arc::new(sessions), settings, epoch)
    }
}

fn session_ttl(settings: &Settings) -> Duration {
    Duration::from_secs(settings.session.ttl_secs)
}
