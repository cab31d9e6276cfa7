//! Auth state and configuration shared by the sign-in flows.

use crate::directory::DirectoryService;
use std::sync::Arc;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_REMEMBER_TTL_SECONDS: i64 = 14 * 24 * 60 * 60;
const DEFAULT_CHALLENGE_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_MAX_FAILED_ACCESS: i32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 5 * 60;
const DEFAULT_TOTP_ISSUER: &str = "sesamo";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    /// Sliding window for regular sessions.
    session_ttl_seconds: i64,
    /// Fixed window for remembered sessions.
    remember_ttl_seconds: i64,
    /// Lifetime of a pending two-factor challenge.
    challenge_ttl_seconds: i64,
    max_failed_access: i32,
    lockout_seconds: i64,
    totp_issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            remember_ttl_seconds: DEFAULT_REMEMBER_TTL_SECONDS,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            max_failed_access: DEFAULT_MAX_FAILED_ACCESS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_remember_ttl_seconds(mut self, seconds: i64) -> Self {
        self.remember_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, seconds: i64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_failed_access(mut self, attempts: i32) -> Self {
        self.max_failed_access = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn remember_ttl_seconds(&self) -> i64 {
        self.remember_ttl_seconds
    }

    pub(super) fn challenge_ttl_seconds(&self) -> i64 {
        self.challenge_ttl_seconds
    }

    pub(super) fn max_failed_access(&self) -> i32 {
        self.max_failed_access
    }

    pub(super) fn lockout_seconds(&self) -> i64 {
        self.lockout_seconds
    }

    pub(super) fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    directory: Arc<dyn DirectoryService>,
}

impl AuthState {
    pub fn new(config: AuthConfig, directory: Arc<dyn DirectoryService>) -> Self {
        Self { config, directory }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn directory(&self) -> &dyn DirectoryService {
        self.directory.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryIdentity, DirectoryService};
    use anyhow::Result;
    use async_trait::async_trait;

    struct RejectAll;

    #[async_trait]
    impl DirectoryService for RejectAll {
        async fn validate_credentials(&self, _username: &str, _password: &str) -> bool {
            false
        }

        async fn lookup_identity(&self, _username: &str) -> Result<Option<DirectoryIdentity>> {
            Ok(None)
        }
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://sesamo.example.com".to_string());

        assert_eq!(config.frontend_base_url(), "https://sesamo.example.com");
        assert_eq!(config.session_ttl_seconds(), super::DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(config.remember_ttl_seconds(), super::DEFAULT_REMEMBER_TTL_SECONDS);
        assert_eq!(config.challenge_ttl_seconds(), super::DEFAULT_CHALLENGE_TTL_SECONDS);
        assert_eq!(config.max_failed_access(), super::DEFAULT_MAX_FAILED_ACCESS);
        assert_eq!(config.lockout_seconds(), super::DEFAULT_LOCKOUT_SECONDS);
        assert!(config.session_cookie_secure());

        let config = config
            .with_session_ttl_seconds(120)
            .with_remember_ttl_seconds(3600)
            .with_challenge_ttl_seconds(60)
            .with_max_failed_access(3)
            .with_lockout_seconds(900)
            .with_totp_issuer("sesamo-test".to_string());

        assert_eq!(config.session_ttl_seconds(), 120);
        assert_eq!(config.remember_ttl_seconds(), 3600);
        assert_eq!(config.challenge_ttl_seconds(), 60);
        assert_eq!(config.max_failed_access(), 3);
        assert_eq!(config.lockout_seconds(), 900);
        assert_eq!(config.totp_issuer(), "sesamo-test");
    }

    #[test]
    fn cookie_secure_requires_https_frontend() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[tokio::test]
    async fn auth_state_exposes_directory() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let state = AuthState::new(config, std::sync::Arc::new(RejectAll));
        assert!(!state.directory().validate_credentials("alice", "pw").await);
    }
}
