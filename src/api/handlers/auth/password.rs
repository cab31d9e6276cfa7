//! Password hashing and the local registration password policy.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with Argon2id and a fresh salt.
///
/// # Errors
///
/// Returns an error if hashing fails.
pub(super) fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash. A malformed stored hash counts
/// as a mismatch rather than an error the caller could leak.
pub(super) fn verify_password(plain: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        tracing::error!("stored password hash is malformed");
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Check a candidate password against the registration policy: minimum
/// length 8 with at least one digit, one lowercase, one uppercase and one
/// non-alphanumeric character. Returns every violated rule.
pub(super) fn password_policy_violations(password: &str) -> Vec<&'static str> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push("Passwords must be at least 8 characters.");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("Passwords must have at least one digit ('0'-'9').");
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push("Passwords must have at least one lowercase ('a'-'z').");
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push("Passwords must have at least one uppercase ('A'-'Z').");
    }
    if password.chars().all(char::is_alphanumeric) {
        violations.push("Passwords must have at least one non alphanumeric character.");
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
    }

    #[test]
    fn policy_accepts_compliant_password() {
        assert!(password_policy_violations("Secur3P@ss").is_empty());
    }

    #[test]
    fn policy_reports_each_missing_class() {
        let violations = password_policy_violations("secur3p@ss");
        assert_eq!(
            violations,
            vec!["Passwords must have at least one uppercase ('A'-'Z')."]
        );

        let violations = password_policy_violations("password");
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn policy_rejects_short_password() {
        let violations = password_policy_violations("S3c!");
        assert!(violations.contains(&"Passwords must be at least 8 characters."));
    }
}
