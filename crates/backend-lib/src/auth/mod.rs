// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod cookie;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod session_store;
pub mod token_generator;

pub use password::{hash_password, hash_password_secure, password_problems, verify_password, PasswordRequirements};
pub use rate_limit::{AuthRateLimiter, ClientKey};
pub use session::{Session, SessionRecord, AUTH_USER_KEY, MESSAGES_KEY, SERVER_START_TIME_KEY};
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore};
