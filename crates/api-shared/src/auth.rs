//! API key check for staff-only operations.
//!
//! The expected key is resolved once at startup and handed in by the caller; this module never
//! reads the environment.

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No key is configured, so staff operations are refused.
    #[error("staff operations are disabled: API_KEY is not configured")]
    NotConfigured,
    #[error("missing x-api-key header")]
    Missing,
    #[error("invalid API key")]
    Invalid,
}

/// Validates the provided API key against the expected one.
///
/// Returns `Ok(())` if the keys match. Fails closed when no key is configured.
pub fn validate_api_key(expected: Option<&str>, provided: Option<&str>) -> Result<(), AuthError> {
    let expected = expected
        .filter(|k| !k.is_empty())
        .ok_or(AuthError::NotConfigured)?;
    let provided = provided.ok_or(AuthError::Missing)?;

    if constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        Ok(())
    } else {
        Err(AuthError::Invalid)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
