// ================
// crates/common/src/lib.rs
// ================
//! Common types shared by the account server and anything that talks to it:
//! form payloads, user-facing notices, route paths and message texts.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a user account
pub type UserId = Uuid;

/// Route paths served by the account handlers
pub mod routes {
    /// Home page, doubles as the login endpoint (`account:login`)
    pub const LOGIN: &str = "/";
    /// Account creation endpoint (`account:signup`)
    pub const SIGNUP: &str = "/signup";
    /// Logout endpoint (`account:logout`)
    pub const LOGOUT: &str = "/logout";
    /// Liveness probe
    pub const HEALTH: &str = "/healthz";
}

/// User-facing notice texts
pub mod texts {
    pub const SERVER_RESTARTED: &str =
        "The server was restarted, so you have been logged out automatically.";
    pub const LOGIN_BLANK: &str = "Please enter your email/username and password.";
    pub const LOGIN_FAILED: &str = "The email/username or password is incorrect.";
    pub const LOGIN_THROTTLED: &str =
        "Too many failed login attempts. Please try again later.";
    pub const SIGNUP_SUCCESS: &str = "Sign-up complete! Please log in.";
    pub const SIGNUP_FAILED: &str = "An error occurred during sign-up.";
}

/// Login form as posted to [`routes::LOGIN`]
///
/// Missing fields deserialize as empty strings so that a partially filled
/// form is reported as blank input rather than rejected by the extractor.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LoginForm {
    /// Either an email address (contains `@`) or a username
    pub email_or_username: String,
    pub password: String,
}

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginForm")
            .field("email_or_username", &self.email_or_username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Signup form as posted to [`routes::SIGNUP`]
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Repeated password, must equal `password`
    pub password_confirm: String,
}

impl fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupForm")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("password_confirm", &"<redacted>")
            .finish()
    }
}

/// Severity of a notice
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

impl NoticeLevel {
    /// Name used as CSS class and in serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "success",
            NoticeLevel::Error => "error",
        }
    }
}

/// A transient message shown to the user on the next rendered page
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    /// Form field the notice belongs to; `None` for form-wide notices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into(), field: None }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, text: text.into(), field: None }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into(), field: None }
    }

    /// Error tied to a single form field
    pub fn field_error(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
            field: Some(field.into()),
        }
    }
}
