//! # Sesamo (Directory-backed Authentication & User Administration)
//!
//! `sesamo` wires local username/password accounts, Active Directory
//! credential validation, and cookie sessions into one HTTP service.
//!
//! ## Authentication
//!
//! Two sign-in paths share a single endpoint:
//!
//! - **Directory:** credentials are validated against an LDAP/Active
//!   Directory server. The first successful sign-in provisions a local user,
//!   binds an external login record, and copies directory attributes
//!   (display name, department, job title) to claims.
//! - **Local:** credentials are verified against an Argon2id hash. Accounts
//!   with a confirmed authenticator are routed through a TOTP challenge
//!   before a full session is issued.
//!
//! Directory failures are never distinguished from bad credentials in
//! responses; callers always see a generic rejection.
//!
//! ## Sessions
//!
//! Sessions are server-side rows keyed by the SHA-256 hash of a random
//! token; the raw token only ever lives in an `HttpOnly` cookie. Regular
//! sessions use a sliding 60-minute window, remembered sessions a fixed
//! 14-day one.
//!
//! ## Administration
//!
//! `/v1/users` provides a filterable, paginated listing (username substring,
//! login provider). Unlocking accounts and the edit screen are gated on the
//! `admin` role.

pub mod api;
pub mod cli;
pub mod directory;
pub mod pagination;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
