//! Input validation helpers.

use crate::error::{AuthError, Result};

/// Validate email address format.
///
/// # Rules
///
/// - Length: 3-255 characters
/// - Exactly one `@`, non-empty local and domain parts
/// - Domain contains at least one `.` with no empty labels
/// - No control characters, no injection characters
///
/// # Errors
///
/// Returns `AuthError::InvalidInput` naming the failed rule.
pub fn validate_email(email: &str) -> Result<()> {
    if email.len() < 3 || email.len() > 255 {
        return Err(AuthError::InvalidInput("Email length out of range".into()));
    }

    let parts: Vec<&str> = email.split('@').collect();
    let [local, domain] = parts.as_slice() else {
        return Err(AuthError::InvalidInput(
            "Email must contain exactly one '@'".into(),
        ));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(AuthError::InvalidInput("Malformed email address".into()));
    }
    if domain.split('.').any(str::is_empty) {
        return Err(AuthError::InvalidInput("Malformed email domain".into()));
    }
    if email.chars().any(char::is_control) {
        return Err(AuthError::InvalidInput(
            "Email contains control characters".into(),
        ));
    }

    const DANGEROUS: &[char] = &['<', '>', '"', '\'', '&', '\\', '\0', ' '];
    if email.chars().any(|c| DANGEROUS.contains(&c)) {
        return Err(AuthError::InvalidInput(
            "Email contains invalid characters".into(),
        ));
    }

    let valid_local = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_');
    let valid_domain = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-');
    if !local.chars().all(valid_local) || !domain.chars().all(valid_domain) {
        return Err(AuthError::InvalidInput(
            "Email contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Validate a device name: 1-255 characters, no control characters, no
/// stored-XSS vectors.
///
/// # Errors
///
/// Returns `AuthError::InvalidInput` naming the failed rule.
pub fn validate_device_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(AuthError::InvalidInput(
            "Device name length out of range".into(),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(AuthError::InvalidInput(
            "Device name contains control characters".into(),
        ));
    }
    const DANGEROUS: &[char] = &['<', '>', '"', '\'', '&', '\0'];
    if name.chars().any(|c| DANGEROUS.contains(&c)) {
        return Err(AuthError::InvalidInput(
            "Device name contains invalid characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        for email in [
            "user@example.com",
            "user.name+tag@sub.example.co.uk",
            "a@b.c",
        ] {
            assert!(validate_email(email).is_ok(), "{email} should be valid");
        }
    }

    #[test]
    fn test_invalid_emails() {
        for email in [
            "",
            "invalid",
            "@example.com",
            "user@",
            "user@@example.com",
            "user@example",
            "user@example..com",
            "user<script>@example.com",
            "user@exam ple.com",
            "user\n@example.com",
        ] {
            assert!(validate_email(email).is_err(), "{email} should be invalid");
        }
    }

    #[test]
    fn test_device_names() {
        assert!(validate_device_name("Tecno Spark 10").is_ok());
        assert!(validate_device_name("").is_err());
        assert!(validate_device_name(&"x".repeat(256)).is_err());
        assert!(validate_device_name("<img src=x>").is_err());
        assert!(validate_device_name("name\0null").is_err());
    }
}
