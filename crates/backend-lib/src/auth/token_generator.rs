// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
/** Session identifier generation.
Identifiers are drawn from the thread-local CSPRNG and encoded as
URL-safe base64 so they can travel in a cookie and double as file names. */
use rand::RngCore;

/// Session id size in bytes (32 bytes = 256 bits of entropy)
pub const SESSION_ID_BYTES: usize = 32;

/// Generate a fresh session id
pub fn generate_session_id() -> String {
    generate_secure_token_with_size(SESSION_ID_BYTES)
}

/** Generate a random token of `bytes` bytes
# Returns
A base64 URL-safe encoded string without padding */
pub fn generate_secure_token_with_size(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}

/// Whether `id` has the shape produced by [`generate_session_id`].
/// Anything else coming from a cookie is treated as "no session".
pub fn is_well_formed_session_id(id: &str) -> bool {
    id.len() == encoded_len(SESSION_ID_BYTES)
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        && URL_SAFE_NO_PAD
            .decode(id)
            .is_ok_and(|raw| raw.len() == SESSION_ID_BYTES)
}

const fn encoded_len(bytes: usize) -> usize {
    (bytes * 4).div_ceil(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_generation() {
        let first = generate_session_id();
        let second = generate_session_id();

        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(is_well_formed_session_id(&first));

        let small = generate_secure_token_with_size(16);
        assert!(small.len() < first.len());
        assert!(!is_well_formed_session_id(&small));
    }

    #[test]
    fn test_rejects_foreign_ids() {
        assert!(!is_well_formed_session_id(""));
        assert!(!is_well_formed_session_id("../../etc/passwd"));
        assert!(!is_well_formed_session_id(&"a".repeat(42)));
        assert!(!is_well_formed_session_id(&format!("{}/", "a".repeat(42))));
        assert!(!is_well_formed_session_id(&"+".repeat(43)));
    }
}
