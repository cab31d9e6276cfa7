//! LDAP/Active Directory implementation of the directory adapter.

use super::{bind_principal, DirectoryIdentity, DirectoryService, DirectorySettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ldap3::{ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use secrecy::ExposeSecret;
use tracing::{debug, error, info, instrument, warn};

const IDENTITY_ATTRS: [&str; 5] = [
    "sAMAccountName",
    "displayName",
    "mail",
    "department",
    "description",
];

pub struct LdapDirectory {
    settings: DirectorySettings,
}

impl LdapDirectory {
    #[must_use]
    pub fn new(settings: DirectorySettings) -> Self {
        Self { settings }
    }

    /// Open a connection and drive its event loop in the background.
    async fn connect(&self) -> Result<Ldap> {
        let conn_settings = LdapConnSettings::new().set_conn_timeout(self.settings.timeout);
        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &self.settings.url)
            .await
            .with_context(|| format!("failed to connect to directory {}", self.settings.url))?;
        ldap3::drive!(conn);
        ldap.with_timeout(self.settings.timeout);
        Ok(ldap)
    }

    /// Bind as the user; a clean bind means the credentials are valid.
    async fn try_validate(&self, username: &str, password: &str) -> Result<bool> {
        let principal = bind_principal(username, &self.settings.domain);
        let mut ldap = self.connect().await?;

        let bind = ldap
            .simple_bind(&principal, password)
            .await
            .context("directory bind failed")?;
        let valid = bind.success().is_ok();

        let _ = ldap.unbind().await;
        Ok(valid)
    }

    async fn try_lookup(&self, username: &str) -> Result<Option<DirectoryIdentity>> {
        let mut ldap = self.connect().await?;

        ldap.simple_bind(
            &self.settings.bind_dn,
            self.settings.bind_password.expose_secret(),
        )
        .await
        .context("service account bind failed")?
        .success()
        .context("service account credentials rejected")?;

        let filter = format!(
            "(&(objectClass=user)(sAMAccountName={}))",
            ldap_escape(username)
        );
        let (entries, _result) = ldap
            .search(
                &self.settings.base_dn,
                Scope::Subtree,
                &filter,
                IDENTITY_ATTRS.to_vec(),
            )
            .await
            .context("directory search failed")?
            .success()
            .context("directory search rejected")?;

        let _ = ldap.unbind().await;

        let Some(entry) = entries.into_iter().next() else {
            return Ok(None);
        };
        let entry = SearchEntry::construct(entry);

        let attr = |name: &str| -> Option<String> {
            entry
                .attrs
                .get(name)
                .and_then(|values| values.first())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Ok(Some(DirectoryIdentity {
            username: attr("sAMAccountName").unwrap_or_else(|| username.to_string()),
            display_name: attr("displayName"),
            email: attr("mail"),
            department: attr("department"),
            job_title: attr("description"),
        }))
    }
}

#[async_trait]
impl DirectoryService for LdapDirectory {
    #[instrument(skip(self, password))]
    async fn validate_credentials(&self, username: &str, password: &str) -> bool {
        // Empty passwords would be an anonymous bind, which some servers
        // accept; reject them before touching the wire.
        if username.trim().is_empty() || password.is_empty() {
            return false;
        }

        match self.try_validate(username, password).await {
            Ok(valid) => {
                if valid {
                    debug!(username, "directory credentials accepted");
                } else {
                    info!(username, "directory credentials rejected");
                }
                valid
            }
            Err(err) => {
                // Reported as "not valid" only; see module docs.
                error!(username, error = %err, "directory validation failed");
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn lookup_identity(&self, username: &str) -> Result<Option<DirectoryIdentity>> {
        let identity = self.try_lookup(username).await?;
        if identity.is_none() {
            warn!(username, "no directory entry found");
        }
        Ok(identity)
    }
}
