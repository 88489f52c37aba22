// ============================
// crates/backend-lib/src/auth/password.rs
// ============================
//! Password hashing, verification and policy checks.
use crate::error::AppError;
use scrypt::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Params, Scrypt,
};
use zeroize::Zeroize;

pub use crate::config::PasswordRequirements;

/// Upper bound on accepted password length
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password using scrypt with cost `2^log_n`
pub fn hash_password(plain: &str, log_n: u8) -> Result<String, AppError> {
    let params = Params::new(
        log_n,
        Params::RECOMMENDED_R,
        Params::RECOMMENDED_P,
        Params::RECOMMENDED_LEN,
    )
    .map_err(|e| AppError::PasswordHash(e.to_string()))?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Scrypt
        .hash_password_customized(plain.as_bytes(), None, None, params, &salt)?
        .to_string();
    Ok(hash)
}

/// Verify a password against a PHC hash string.
/// Malformed hashes never verify.
pub fn verify_password(hash: &str, plain: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Scrypt.verify_password(plain.as_bytes(), &parsed_hash).is_ok()
}

/// Hash on the blocking pool and zeroize the plaintext afterwards
pub async fn hash_password_secure(mut plain: String, log_n: u8) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let hash = hash_password(&plain, log_n);
        plain.zeroize();
        hash
    })
    .await?
}

/// Verify on the blocking pool
pub async fn verify_password_blocking(hash: String, mut plain: String) -> bool {
    let verified = tokio::task::spawn_blocking(move || {
        let ok = verify_password(&hash, &plain);
        plain.zeroize();
        ok
    })
    .await;
    verified.unwrap_or(false)
}

/// List every way `password` falls short of `requirements`.
/// An empty list means the password is acceptable.
pub fn password_problems(password: &str, requirements: &PasswordRequirements) -> Vec<String> {
    let mut problems = Vec::new();
    let length = password.chars().count();

    if length < requirements.min_length {
        problems.push(format!(
            "This password is too short. It must contain at least {} characters.",
            requirements.min_length
        ));
    }
    if length > MAX_PASSWORD_LENGTH {
        problems.push(format!(
            "This password is too long. It must contain at most {MAX_PASSWORD_LENGTH} characters."
        ));
    }
    if requirements.require_uppercase && !password.chars().any(char::is_uppercase) {
        problems.push("This password must contain an uppercase letter.".to_string());
    }
    if requirements.require_lowercase && !password.chars().any(char::is_lowercase) {
        problems.push("This password must contain a lowercase letter.".to_string());
    }
    if requirements.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("This password must contain a digit.".to_string());
    }
    if requirements.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
        problems.push("This password must contain a special character.".to_string());
    }
    if requirements.reject_numeric
        && !password.is_empty()
        && password.chars().all(|c| c.is_ascii_digit())
    {
        problems.push("This password is entirely numeric.".to_string());
    }

    problems
}
