//! Directory credential adapter.
//!
//! Flow Overview:
//! 1) Validate a username/password pair by binding to the directory as that
//!    user.
//! 2) Look up identity attributes (display name, email, department, job
//!    title) with a service-account bind.
//! 3) On first successful sign-in, provision a local user bound to the
//!    directory identity (see `provision`).
//!
//! Security boundaries: connectivity and protocol failures never cross the
//! validation boundary. They are logged and reported as "not valid" so
//! callers cannot distinguish a directory outage from a bad password.

pub mod ldap;
pub mod provision;

use crate::cli::globals::GlobalArgs;
use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Duration;

const DEFAULT_OPERATION_TIMEOUT_SECONDS: u64 = 10;

/// Attributes resolved from the directory for one identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryIdentity {
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    /// Sourced from the directory `description` attribute.
    pub job_title: Option<String>,
}

/// Connection settings for the directory server.
#[derive(Clone, Debug)]
pub struct DirectorySettings {
    pub url: String,
    /// UPN domain appended to bare usernames when binding.
    pub domain: String,
    pub base_dn: String,
    pub bind_dn: String,
    pub bind_password: SecretString,
    pub timeout: Duration,
}

impl DirectorySettings {
    #[must_use]
    pub fn from_globals(globals: &GlobalArgs) -> Self {
        Self {
            url: globals.ldap_url.clone(),
            domain: globals.ldap_domain.clone(),
            base_dn: globals.ldap_base_dn.clone(),
            bind_dn: globals.ldap_bind_dn.clone(),
            bind_password: globals.ldap_bind_password.clone(),
            timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECONDS),
        }
    }
}

/// External directory reachable by a credential-validation call and an
/// identity lookup call.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Check a username/password pair against the directory.
    ///
    /// Never fails across this boundary: any transport or protocol error is
    /// logged and reported as `false`.
    async fn validate_credentials(&self, username: &str, password: &str) -> bool;

    /// Resolve identity attributes for a username, or `None` when the
    /// directory has no such entry.
    async fn lookup_identity(&self, username: &str) -> Result<Option<DirectoryIdentity>>;
}

/// Build the bind principal for a username: bare names get the UPN domain
/// appended, qualified names pass through untouched.
pub(crate) fn bind_principal(username: &str, domain: &str) -> String {
    if username.contains('@') || username.contains('\\') {
        username.to_string()
    } else {
        format!("{username}@{domain}")
    }
}

#[cfg(test)]
mod tests {
    use super::bind_principal;

    #[test]
    fn bind_principal_appends_domain_to_bare_names() {
        assert_eq!(
            bind_principal("alice", "corp.example.com"),
            "alice@corp.example.com"
        );
    }

    #[test]
    fn bind_principal_keeps_qualified_names() {
        assert_eq!(
            bind_principal("alice@corp.example.com", "other.example.com"),
            "alice@corp.example.com"
        );
        assert_eq!(bind_principal(r"CORP\alice", "corp.example.com"), r"CORP\alice");
    }
}
