//! Authenticated principal extraction and authorization helpers.
//!
//! Flow Overview: read the session cookie, resolve it to a user, load its
//! roles as scopes, and return a principal downstream handlers can use.

use axum::http::{HeaderMap, StatusCode};
use sqlx::PgPool;
use tracing::error;

use super::{session::authenticate_session, state::AuthConfig, storage::fetch_roles};

/// Role required for account administration (unlock, edit).
pub(crate) const ADMIN_ROLE: &str = "admin";

/// Authenticated user context derived from the session cookie.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub email: Option<String>,
    pub scopes: Vec<String>,
}

impl Principal {
    pub(crate) fn is_admin(&self) -> bool {
        self.scopes.iter().any(|scope| scope == ADMIN_ROLE)
    }
}

/// Resolve a session cookie into a principal, or return 401 for missing
/// sessions.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    config: &AuthConfig,
) -> Result<Principal, StatusCode> {
    match authenticate_session(headers, pool, config).await {
        Ok(Some(record)) => {
            let scopes = match fetch_roles(pool, record.user_id).await {
                Ok(roles) => roles,
                Err(err) => {
                    error!("Failed to fetch roles: {err}");
                    return Err(StatusCode::INTERNAL_SERVER_ERROR);
                }
            };
            Ok(Principal {
                user_id: record.user_id,
                username: record.username,
                email: record.email,
                scopes,
            })
        }
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(status) => Err(status),
    }
}

/// Like `require_auth`, but additionally requires the admin role.
pub(crate) async fn require_admin(
    headers: &HeaderMap,
    pool: &PgPool,
    config: &AuthConfig,
) -> Result<Principal, StatusCode> {
    let principal = require_auth(headers, pool, config).await?;
    if principal.is_admin() {
        Ok(principal)
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(scopes: Vec<&str>) -> Principal {
        Principal {
            user_id: uuid::Uuid::nil(),
            username: "alice".to_string(),
            email: None,
            scopes: scopes.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn is_admin_requires_admin_scope() {
        assert!(principal(vec!["admin"]).is_admin());
        assert!(principal(vec!["auditor", "admin"]).is_admin());
        assert!(!principal(vec!["auditor"]).is_admin());
        assert!(!principal(vec![]).is_admin());
    }
}
