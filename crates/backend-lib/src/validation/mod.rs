// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Form validation module.

use crate::auth::password::{password_problems, PasswordRequirements};
use crate::notify::Notifier;
use crate::storage::{normalize_email, UserStore};
use account_common::SignupForm;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

// Common validation constants
const MAX_USERNAME_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit

/// Field name used for errors that belong to the whole form
pub const NON_FIELD_ERRORS: &str = "__all__";

const REQUIRED: &str = "This field is required.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const EMAIL_TAKEN: &str = "A user with that email address already exists.";
const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";

// Regex patterns for validation
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("static regex"));
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("static regex")
});

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    InvalidUsername(String),

    #[error("{0}")]
    InvalidEmail(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a username: letters, digits and `@ . + - _` only
pub fn validate_username(username: &str) -> ValidationResult<&str> {
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::InvalidUsername(format!(
            "Ensure this value has at most {MAX_USERNAME_LENGTH} characters."
        )));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::InvalidUsername(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        ));
    }

    Ok(username)
}

/// Validate an email address
pub fn validate_email(email: &str) -> ValidationResult<&str> {
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail(format!(
            "Ensure this value has at most {MAX_EMAIL_LENGTH} characters."
        )));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail(
            "Enter a valid email address.".to_string(),
        ));
    }

    Ok(email)
}

/// Escape text for inclusion in HTML
pub fn sanitize_string(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Validation errors of one form submission, in field order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors {
    fields: Vec<(String, Vec<String>)>,
    non_field: Vec<String>,
}

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        if field == NON_FIELD_ERRORS {
            self.non_field.push(message.into());
            return;
        }
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, messages)) => messages.push(message.into()),
            None => self.fields.push((field.to_string(), vec![message.into()])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == field)
    }

    /// Messages attached to `field`
    pub fn field(&self, field: &str) -> &[String] {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map_or(&[], |(_, messages)| messages.as_slice())
    }

    pub fn non_field(&self) -> &[String] {
        &self.non_field
    }

    /// Total number of messages
    pub fn len(&self) -> usize {
        self.fields.iter().map(|(_, m)| m.len()).sum::<usize>() + self.non_field.len()
    }

    /// Emit every message: field errors scoped to their field, form-wide ones unscoped
    pub fn report<N: Notifier + ?Sized>(&self, notifier: &mut N) {
        for (field, messages) in &self.fields {
            for message in messages {
                notifier.field_error(field, message);
            }
        }
        for message in &self.non_field {
            notifier.error(message);
        }
    }
}

/// Signup data that passed validation
#[derive(Clone)]
#[cfg_attr(test, derive(Debug))]
pub struct CleanedSignup {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Validate a signup form against format rules, the password policy and
/// the existing accounts in `users`.
pub async fn validate_signup<S: UserStore + ?Sized>(
    form: SignupForm,
    users: &S,
    requirements: &PasswordRequirements,
) -> Result<CleanedSignup, FormErrors> {
    let mut errors = FormErrors::default();

    // Text fields are trimmed; passwords are taken verbatim
    let username = form.username.trim().to_string();
    let email = normalize_email(&form.email);
    let SignupForm { password, password_confirm, .. } = form;

    if username.is_empty() {
        errors.add("username", REQUIRED);
    } else if let Err(e) = validate_username(&username) {
        errors.add("username", e.to_string());
    } else if is_taken(users.find_by_username(&username).await) {
        errors.add("username", USERNAME_TAKEN);
    }

    if email.is_empty() {
        errors.add("email", REQUIRED);
    } else if let Err(e) = validate_email(&email) {
        errors.add("email", e.to_string());
    } else if is_taken(users.find_by_email(&email).await) {
        errors.add("email", EMAIL_TAKEN);
    }

    if password.is_empty() {
        errors.add("password", REQUIRED);
    } else {
        for problem in password_problems(&password, requirements) {
            errors.add("password", problem);
        }
    }

    if password_confirm.is_empty() {
        errors.add("password_confirm", REQUIRED);
    } else if !password.is_empty() && password != password_confirm {
        errors.add(NON_FIELD_ERRORS, PASSWORD_MISMATCH);
    }

    if errors.is_empty() {
        Ok(CleanedSignup { username, email, password })
    } else {
        Err(errors)
    }
}

/// A failed lookup counts as taken; the store will enforce uniqueness anyway
fn is_taken<T, E: std::fmt::Display>(lookup: Result<Option<T>, E>) -> bool {
    match lookup {
        Ok(found) => found.is_some(),
        Err(e) => {
            tracing::warn!(error = %e, "uniqueness lookup failed");
            true
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::storage::{MemoryUserStore, NewUser};
    use account_common::Notice;

    fn form(username: &str, email: &str, password: &str, confirm: &str) -> SignupForm {
        SignupForm {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            password_confirm: confirm.to_string(),
        }
    }

    async fn store_with_alice() -> MemoryUserStore {
        let store = MemoryUserStore::new();
        store
            .create(NewUser::new(
                "alice",
                "alice@example.com",
                hash_password("password1", 4).unwrap(),
            ))
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username("bob.smith+tag@home_1-2").is_ok());
        assert!(validate_username("héloïse").is_ok());

        assert!(matches!(
            validate_username("bob smith"),
            Err(ValidationError::InvalidUsername(_))
        ));
        assert!(matches!(
            validate_username("<script>"),
            Err(ValidationError::InvalidUsername(_))
        ));
        assert!(validate_username(&"a".repeat(151)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("user.name+tag@example.co.uk").is_ok());

        assert!(matches!(
            validate_email("test.example.com"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(validate_email("test@").is_err());
        assert!(validate_email("test@example").is_err());
    }

    #[test]
    fn test_sanitize_string() {
        let input = "<script>alert('XSS')</script>";
        let sanitized = sanitize_string(input);
        assert_eq!(
            sanitized,
            "&lt;script&gt;alert(&#x27;XSS&#x27;)&lt;/script&gt;"
        );
    }

    #[tokio::test]
    async fn test_valid_signup_is_cleaned() {
        let store = store_with_alice().await;
        let cleaned = validate_signup(
            form("  bob ", "Bob@Example.COM", "password1", "password1"),
            &store,
            &PasswordRequirements::default(),
        )
        .await
        .unwrap();

        assert_eq!(cleaned.username, "bob");
        assert_eq!(cleaned.email, "Bob@example.com");
        assert_eq!(cleaned.password, "password1");
    }

    #[tokio::test]
    async fn test_duplicate_username_is_a_field_error() {
        let store = store_with_alice().await;
        let errors = validate_signup(
            form("alice", "new@example.com", "password1", "password1"),
            &store,
            &PasswordRequirements::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(errors.field("username"), [USERNAME_TAKEN.to_string()]);
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_ignores_case() {
        let store = store_with_alice().await;
        let errors = validate_signup(
            form("bob", "ALICE@example.com", "password1", "password1"),
            &store,
            &PasswordRequirements::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(errors.field("email"), [EMAIL_TAKEN.to_string()]);
    }

    #[tokio::test]
    async fn test_password_mismatch_is_form_wide() {
        let store = MemoryUserStore::new();
        let errors = validate_signup(
            form("bob", "bob@example.com", "password1", "password2"),
            &store,
            &PasswordRequirements::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(errors.non_field(), [PASSWORD_MISMATCH.to_string()]);
        assert!(!errors.has_field("password"));
        assert!(!errors.has_field("password_confirm"));
    }

    #[tokio::test]
    async fn test_every_error_is_collected() {
        let store = MemoryUserStore::new();
        let errors = validate_signup(
            form("", "not-an-email", "123", ""),
            &store,
            &PasswordRequirements::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(errors.field("username"), [REQUIRED.to_string()]);
        assert_eq!(errors.field("email").len(), 1);
        // Too short and entirely numeric
        assert_eq!(errors.field("password").len(), 2);
        assert_eq!(errors.field("password_confirm"), [REQUIRED.to_string()]);
        assert!(errors.non_field().is_empty());
    }

    #[test]
    fn test_report_keeps_field_association() {
        let mut errors = FormErrors::default();
        errors.add(NON_FIELD_ERRORS, "form-wide");
        errors.add("username", "bad name");
        errors.add("username", "taken");

        let mut notices: Vec<Notice> = Vec::new();
        errors.report(&mut notices);

        assert_eq!(
            notices,
            vec![
                Notice::field_error("username", "bad name"),
                Notice::field_error("username", "taken"),
                Notice::error("form-wide"),
            ]
        );
    }
}
