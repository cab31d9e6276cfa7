//! TOTP authenticator codes for the two-factor flow.
//!
//! Codes follow authenticator-app defaults: SHA-1, six digits, 30-second
//! step, one step of allowed skew.

use anyhow::{anyhow, Result};
use totp_rs::{Algorithm, Secret, TOTP};

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;

/// Strip the separators users paste along with their codes.
pub(super) fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

fn build(secret_base32: &str, issuer: &str, account: &str) -> Result<TOTP> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|err| anyhow!("invalid authenticator secret: {err:?}"))?;
    build_from_bytes(secret, issuer, account)
}

fn build_from_bytes(secret: Vec<u8>, issuer: &str, account: &str) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP,
        secret,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|err| anyhow!("failed to build TOTP: {err}"))
}

/// Generate a fresh secret for enrollment.
///
/// Returns the base32 secret plus the `otpauth://` URL an authenticator app
/// can import.
///
/// # Errors
///
/// Returns an error if secret generation fails.
pub(super) fn generate_secret(issuer: &str, account: &str) -> Result<(String, String)> {
    let secret = Secret::generate_secret()
        .to_bytes()
        .map_err(|err| anyhow!("failed to generate authenticator secret: {err:?}"))?;
    let totp = build_from_bytes(secret, issuer, account)?;
    Ok((totp.get_secret_base32(), totp.get_url()))
}

/// Verify an already-normalized code against a stored secret. Verification
/// problems (bad secret, clock errors) count as a mismatch.
pub(super) fn verify_code(secret_base32: &str, issuer: &str, account: &str, code: &str) -> bool {
    match build(secret_base32, issuer, account) {
        Ok(totp) => totp.check_current(code).unwrap_or(false),
        Err(err) => {
            tracing::error!(error = %err, "authenticator secret rejected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_code_strips_whitespace_and_hyphens() {
        assert_eq!(normalize_code("123 456"), "123456");
        assert_eq!(normalize_code("123-456"), "123456");
        assert_eq!(normalize_code(" 12-34 56 "), "123456");
        assert_eq!(normalize_code("123456"), "123456");
    }

    #[test]
    fn generate_secret_produces_importable_url() {
        let (secret, url) = generate_secret("sesamo", "alice").expect("generate secret");
        assert!(!secret.is_empty());
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("issuer=sesamo"));
    }

    #[test]
    fn verify_code_accepts_current_code() {
        let (secret, _url) = generate_secret("sesamo", "alice").expect("generate secret");
        let totp = build(&secret, "sesamo", "alice").expect("build totp");
        let current = totp.generate_current().expect("current code");
        assert!(verify_code(&secret, "sesamo", "alice", &current));
    }

    #[test]
    fn verify_code_rejects_wrong_code() {
        let (secret, _url) = generate_secret("sesamo", "alice").expect("generate secret");
        let totp = build(&secret, "sesamo", "alice").expect("build totp");
        let current = totp.generate_current().expect("current code");
        let wrong = if current == "000000" { "111111" } else { "000000" };
        assert!(!verify_code(&secret, "sesamo", "alice", wrong));
    }

    #[test]
    fn verify_code_rejects_garbage_secret() {
        assert!(!verify_code("not base32!!", "sesamo", "alice", "123456"));
    }
}
