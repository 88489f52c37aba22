// ==============
// crates/backend-lib/src/metric_keys.rs

//! Central place for metric keys
pub const LOGIN_SUCCESS: &str = "account.login.success";
pub const LOGIN_FAILURE: &str = "account.login.failure";
pub const LOGIN_THROTTLED: &str = "account.login.throttled";
pub const LOGIN_LOCKOUT: &str = "account.login.lockout";
pub const SIGNUP_CREATED: &str = "account.signup.created";
pub const SIGNUP_REJECTED: &str = "account.signup.rejected";
pub const LOGOUT: &str = "account.logout";
pub const SESSION_EXPIRED_EPOCH: &str = "account.session.expired_epoch";
pub const SESSION_EXPIRED_TTL: &str = "account.session.expired_ttl";
