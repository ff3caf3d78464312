use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;

use crate::AuthError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Reject passwords shorter than eight characters or missing an uppercase
/// letter, a lowercase letter, a digit or a special character.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let mut missing = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        missing.push("at least 8 characters");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        missing.push("an uppercase letter");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        missing.push("a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push("a number");
    }
    if !password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
        missing.push("a special character");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::WeakPassword(format!(
            "Password must contain {}",
            missing.join(", ")
        )))
    }
}

/// Minimal structural check: one `@`, a non-empty local part and a dotted domain.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid && email.len() <= 254 {
        Ok(())
    } else {
        Err(AuthError::InvalidEmail)
    }
}

pub(crate) fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub(crate) fn verify_password(password: &str, stored: &str) -> Result<(), AuthError> {
    let stored_hash = PasswordHash::new(stored)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &stored_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_password_passes() {
        assert!(validate_password("Sup3r$ecret").is_ok());
    }

    #[test]
    fn weak_password_lists_what_is_missing() {
        let err = validate_password("short").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("at least 8 characters"));
        assert!(message.contains("an uppercase letter"));
        assert!(message.contains("a number"));
        assert!(message.contains("a special character"));
        assert!(!message.contains("a lowercase letter"));
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("alice@localhost").is_err());
        assert!(validate_email("alice.example.com").is_err());
        assert!(validate_email("al ice@example.com").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn hashes_verify_and_reject_wrong_passwords() {
        let hash = hash_password("Sup3r$ecret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Sup3r$ecret", &hash).is_ok());
        assert!(matches!(
            verify_password("nope", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
