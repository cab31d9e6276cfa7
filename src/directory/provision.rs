//! First-login provisioning of directory users.
//!
//! Flow Overview:
//! 1) Resolve an existing local user by username.
//! 2) Otherwise fetch the identity from the directory and create the local
//!    user, its external login binding, and one claim per discovered
//!    attribute in a single transaction.

use super::{DirectoryIdentity, DirectoryService};
use crate::api::handlers::auth::utils::is_unique_violation;
use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Provider recorded on external login bindings created here.
pub const DIRECTORY_PROVIDER: &str = "ActiveDirectory";
const DIRECTORY_PROVIDER_DISPLAY: &str = "Active Directory";

/// Claim types carried over from directory attributes.
pub const CLAIM_DISPLAY_NAME: &str = "DisplayName";
pub const CLAIM_DEPARTMENT: &str = "Department";
pub const CLAIM_JOB_TITLE: &str = "JobTitle";

/// Minimal local user record returned to the sign-in flow.
#[derive(Clone, Debug)]
pub struct LocalUser {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
}

/// Find the local user bound to this directory username, creating it on
/// first sign-in.
///
/// Returns the user and whether it was created by this call.
///
/// # Errors
///
/// Fails when the directory has no such identity or when any persistence
/// step (user, login binding, claims) fails. The transaction keeps a failed
/// provisioning from leaving partial records behind.
pub async fn get_or_create_user(
    pool: &PgPool,
    directory: &dyn DirectoryService,
    username: &str,
) -> Result<(LocalUser, bool)> {
    if let Some(user) = find_by_username(pool, username).await? {
        return Ok((user, false));
    }

    let identity = directory
        .lookup_identity(username)
        .await?
        .ok_or_else(|| anyhow!("failed to create or retrieve user: {username}"))?;

    match insert_directory_user(pool, &identity).await {
        Ok(user) => {
            info!(username = %user.username, user_id = %user.id, "provisioned directory user");
            Ok((user, true))
        }
        // Concurrent first sign-ins race on the username index; the loser
        // picks up the row the winner created.
        Err(err) if err.downcast_ref::<sqlx::Error>().is_some_and(is_unique_violation) => {
            find_by_username(pool, username)
                .await?
                .map(|user| (user, false))
                .ok_or(err)
        }
        Err(err) => Err(err),
    }
}

async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<LocalUser>> {
    let query = r"
        SELECT id, username, email
        FROM users
        WHERE LOWER(username) = LOWER($1)
        LIMIT 1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by username")?;

    Ok(row.map(|row| LocalUser {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
    }))
}

async fn insert_directory_user(pool: &PgPool, identity: &DirectoryIdentity) -> Result<LocalUser> {
    let mut tx = pool.begin().await.context("begin provision transaction")?;

    // Directory users are considered pre-confirmed and carry no local
    // password hash.
    let query = r"
        INSERT INTO users (username, email, email_confirmed)
        VALUES ($1, $2, TRUE)
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(&identity.username)
        .bind(&identity.email)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .map_err(|err| anyhow::Error::new(err).context("failed to create user"))?;
    let user_id: Uuid = row.get("id");

    let query = r"
        INSERT INTO user_logins (login_provider, provider_key, provider_display_name, user_id)
        VALUES ($1, $2, $3, $4)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(DIRECTORY_PROVIDER)
        .bind(&identity.username)
        .bind(DIRECTORY_PROVIDER_DISPLAY)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to add directory login binding")?;

    for (claim_type, claim_value) in identity_claims(identity) {
        let query = r"
            INSERT INTO user_claims (user_id, claim_type, claim_value)
            VALUES ($1, $2, $3)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(claim_type)
            .bind(&claim_value)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .with_context(|| format!("failed to add claim {claim_type}"))?;
    }

    tx.commit().await.context("commit provision transaction")?;

    Ok(LocalUser {
        id: user_id,
        username: identity.username.clone(),
        email: identity.email.clone(),
    })
}

/// Claims attached to a freshly provisioned user. `DisplayName` is always
/// present (falling back to the username); the rest only when the directory
/// carries the attribute.
fn identity_claims(identity: &DirectoryIdentity) -> Vec<(&'static str, String)> {
    let mut claims = vec![(
        CLAIM_DISPLAY_NAME,
        identity
            .display_name
            .clone()
            .unwrap_or_else(|| identity.username.clone()),
    )];
    if let Some(department) = &identity.department {
        claims.push((CLAIM_DEPARTMENT, department.clone()));
    }
    if let Some(job_title) = &identity.job_title {
        claims.push((CLAIM_JOB_TITLE, job_title.clone()));
    }
    claims
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(display: Option<&str>, dept: Option<&str>, title: Option<&str>) -> DirectoryIdentity {
        DirectoryIdentity {
            username: "alice".to_string(),
            display_name: display.map(str::to_string),
            email: Some("alice@corp.example.com".to_string()),
            department: dept.map(str::to_string),
            job_title: title.map(str::to_string),
        }
    }

    #[test]
    fn identity_claims_includes_all_attributes() {
        let claims = identity_claims(&identity(
            Some("Alice Smith"),
            Some("Engineering"),
            Some("Staff Engineer"),
        ));
        assert_eq!(
            claims,
            vec![
                (CLAIM_DISPLAY_NAME, "Alice Smith".to_string()),
                (CLAIM_DEPARTMENT, "Engineering".to_string()),
                (CLAIM_JOB_TITLE, "Staff Engineer".to_string()),
            ]
        );
    }

    #[test]
    fn identity_claims_falls_back_to_username_for_display_name() {
        let claims = identity_claims(&identity(None, None, None));
        assert_eq!(claims, vec![(CLAIM_DISPLAY_NAME, "alice".to_string())]);
    }
}
