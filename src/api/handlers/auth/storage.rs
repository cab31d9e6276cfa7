//! Database helpers for credentials, sessions and lockout bookkeeping.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{generate_session_token, hash_session_token, is_unique_violation};

/// Server-side session kinds. A `challenge` session only proves that the
/// password step of a two-factor sign-in succeeded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum SessionKind {
    Full,
    Challenge,
}

impl SessionKind {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Challenge => "challenge",
        }
    }
}

/// Outcome when attempting to create a local account.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(Uuid),
    Conflict,
}

/// Minimal data returned for a valid session cookie.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) username: String,
    pub(crate) email: Option<String>,
}

/// Fields needed to run the local password step.
pub(super) struct CredentialRecord {
    pub(super) user_id: Uuid,
    pub(super) password_hash: Option<String>,
    pub(super) two_factor_ready: bool,
    pub(super) locked: bool,
}

/// Look up local credentials by username (case-insensitive).
pub(super) async fn lookup_credentials(
    pool: &PgPool,
    username: &str,
) -> Result<Option<CredentialRecord>> {
    let query = r"
        SELECT
            id,
            password_hash,
            (two_factor_secret IS NOT NULL AND two_factor_confirmed) AS two_factor_ready,
            (locked_until IS NOT NULL AND locked_until > NOW()) AS locked
        FROM users
        WHERE LOWER(username) = LOWER($1)
        LIMIT 1
    ";
    let span = tracing::info_span!(
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
        .context("failed to lookup credentials")?;

    Ok(row.map(|row| CredentialRecord {
        user_id: row.get("id"),
        password_hash: row.get("password_hash"),
        two_factor_ready: row.get("two_factor_ready"),
        locked: row.get("locked"),
    }))
}

/// Create a session row and return the raw token for the cookie.
/// Only the token hash is stored.
pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    kind: SessionKind,
    remember: bool,
    ttl_seconds: i64,
) -> Result<String> {
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, kind, remember, expires_at)
        VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(kind.as_str())
            .bind(remember)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve a full-session token hash.
///
/// Regular sessions slide: each hit pushes `expires_at` another window out.
/// Remembered sessions keep their fixed expiry and only record activity.
pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
    session_ttl_seconds: i64,
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT users.id, users.username, users.email
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_hash = $1
          AND user_sessions.kind = 'full'
          AND user_sessions.expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    if row.is_none() {
        return Ok(None);
    }

    let query = r"
        UPDATE user_sessions
        SET last_seen_at = NOW(),
            expires_at = CASE
                WHEN remember THEN expires_at
                ELSE NOW() + ($2 * INTERVAL '1 second')
            END
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .bind(session_ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to slide session expiry")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
    }))
}

/// Resolve a pending two-factor challenge token hash.
pub(super) async fn lookup_challenge(pool: &PgPool, token_hash: &[u8]) -> Result<Option<Uuid>> {
    let query = r"
        SELECT user_id
        FROM user_sessions
        WHERE session_hash = $1
          AND kind = 'challenge'
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup challenge")?;
    Ok(row.map(|row| row.get("user_id")))
}

/// Delete a session row; idempotent, it's fine if no rows match.
pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Roles become scopes on the authenticated principal.
pub(crate) async fn fetch_roles(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>> {
    let query = "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch roles")?;
    Ok(rows.into_iter().map(|row| row.get("role")).collect())
}

/// Count a failed two-factor attempt; reaching the limit sets the lockout
/// window. Returns whether the account is now locked.
pub(super) async fn record_failed_access(
    pool: &PgPool,
    user_id: Uuid,
    max_failed_access: i32,
    lockout_seconds: i64,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET failed_access_count = failed_access_count + 1,
            locked_until = CASE
                WHEN failed_access_count + 1 >= $2
                    THEN NOW() + ($3 * INTERVAL '1 second')
                ELSE locked_until
            END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING failed_access_count >= $2 AS locked
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(max_failed_access)
        .bind(lockout_seconds)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to record failed access")?;
    Ok(row.get("locked"))
}

/// Reset the failed-access counter after a successful sign-in.
pub(super) async fn reset_failed_access(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_access_count = 0, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to reset failed access count")?;
    Ok(())
}

pub(super) async fn username_exists(pool: &PgPool, username: &str) -> Result<bool> {
    let query = "SELECT 1 FROM users WHERE LOWER(username) = LOWER($1) LIMIT 1";
    let span = tracing::info_span!(
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
        .context("failed to check username")?;
    Ok(row.is_some())
}

pub(super) async fn email_exists(pool: &PgPool, email: &str) -> Result<bool> {
    let query = "SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check email")?;
    Ok(row.is_some())
}

/// Insert a local account. Local registrations are treated as confirmed, as
/// the flow signs the user in immediately.
pub(super) async fn create_local_user(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let query = r"
        INSERT INTO users (username, email, password_hash, email_confirmed)
        VALUES ($1, $2, $3, TRUE)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(SignupOutcome::Created(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to create user"),
    }
}

/// Store a fresh, unconfirmed authenticator secret.
pub(super) async fn set_pending_authenticator(
    pool: &PgPool,
    user_id: Uuid,
    secret: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET two_factor_secret = $2, two_factor_confirmed = FALSE, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(secret)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store authenticator secret")?;
    Ok(())
}

/// Fetch the authenticator secret; `confirmed_only` restricts to
/// authenticators that completed enrollment.
pub(super) async fn authenticator_secret(
    pool: &PgPool,
    user_id: Uuid,
    confirmed_only: bool,
) -> Result<Option<String>> {
    let query = r"
        SELECT two_factor_secret
        FROM users
        WHERE id = $1 AND (two_factor_confirmed OR NOT $2)
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(confirmed_only)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch authenticator secret")?;
    Ok(row.and_then(|row| row.get("two_factor_secret")))
}

/// Mark the pending authenticator confirmed. Returns false when there was no
/// secret to confirm.
pub(super) async fn confirm_authenticator(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = r"
        UPDATE users
        SET two_factor_confirmed = TRUE, updated_at = NOW()
        WHERE id = $1 AND two_factor_secret IS NOT NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to confirm authenticator")?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::{SessionKind, SignupOutcome};
    use uuid::Uuid;

    #[test]
    fn session_kind_as_str() {
        assert_eq!(SessionKind::Full.as_str(), "full");
        assert_eq!(SessionKind::Challenge.as_str(), "challenge");
    }

    #[test]
    fn signup_outcome_debug_names() {
        let id = Uuid::nil();
        assert_eq!(
            format!("{:?}", SignupOutcome::Created(id)),
            format!("Created({id:?})")
        );
        assert_eq!(format!("{:?}", SignupOutcome::Conflict), "Conflict");
    }
}
