//! Password hashing.
//!
//! bcrypt with configurable cost. The login path verifies against a fixed
//! dummy hash when the account does not exist, so the timing of a miss is
//! indistinguishable from a wrong password.

use crate::error::{AuthError, Result};

/// bcrypt hash of the string `sokoni-dummy-password`, cost 12. Verified on
/// logins for unknown accounts to keep timing uniform; nothing ever
/// matches it because the real comparison input is the caller's password.
const DUMMY_HASH: &str = "$2b$12$C7yhyxQPcb2GA3.zm2flJeFp1lqDIyGVGY1d0kMEXGMrlTyJgyXce";

/// Hash a password at the given bcrypt cost.
///
/// # Errors
///
/// `Internal` when bcrypt rejects the input (over-long passwords).
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a stored hash.
///
/// # Errors
///
/// `InvalidCredentials` on mismatch or malformed hash — the two cases are
/// deliberately indistinguishable.
pub fn verify_password(password: &str, hash: &str) -> Result<()> {
    match bcrypt::verify(password, hash) {
        Ok(true) => Ok(()),
        _ => Err(AuthError::InvalidCredentials),
    }
}

/// Burn a bcrypt verification against the dummy hash. Called on the
/// missing-user branch of login so both branches cost one bcrypt compare.
pub fn burn_dummy_verify(password: &str) {
    let _ = bcrypt::verify(password, DUMMY_HASH);
}

/// Validate password strength at registration and reset.
///
/// # Errors
///
/// `InvalidInput` naming the failed rule.
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(AuthError::InvalidInput(
            "Password must be at least 8 characters".into(),
        ));
    }
    if password.len() > 72 {
        // bcrypt truncates beyond 72 bytes; reject rather than silently weaken.
        return Err(AuthError::InvalidInput(
            "Password must be at most 72 characters".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(AuthError::InvalidInput(
            "Password must contain a letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::InvalidInput(
            "Password must contain a digit".into(),
        ));
    }
    Ok(())
}
