//! Session endpoints and cookie plumbing.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    state::{AuthConfig, AuthState},
    storage::{delete_session, lookup_challenge, lookup_session, SessionRecord},
    types::SessionResponse,
    utils::hash_session_token,
};

pub(crate) const SESSION_COOKIE_NAME: &str = "sesamo_session";
pub(crate) const CHALLENGE_COOKIE_NAME: &str = "sesamo_2fa";

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    match authenticate_session(&headers, &pool, auth_state.config()).await {
        Ok(Some(record)) => {
            let response = SessionResponse {
                user_id: record.user_id.to_string(),
                username: record.username,
                email: record.email,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(status) => status.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        let token_hash = hash_session_token(&token);
        if let Err(err) = delete_session(&pool, &token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    let secure = auth_state.config().session_cookie_secure();
    if let Ok(cookie) = clear_cookie(SESSION_COOKIE_NAME, secure) {
        response_headers.append(SET_COOKIE, cookie);
    }
    if let Ok(cookie) = clear_cookie(CHALLENGE_COOKIE_NAME, secure) {
        response_headers.append(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Resolve a session cookie into a session record, if present.
///
/// Returns `Ok(None)` when the cookie is missing or invalid.
pub(crate) async fn authenticate_session(
    headers: &HeaderMap,
    pool: &PgPool,
    config: &AuthConfig,
) -> Result<Option<SessionRecord>, StatusCode> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token);
    match lookup_session(pool, &token_hash, config.session_ttl_seconds()).await {
        Ok(record) => Ok(record),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Resolve the pending two-factor challenge cookie, returning the user id
/// plus the token hash so the challenge can be consumed.
pub(super) async fn authenticate_challenge(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<(uuid::Uuid, Vec<u8>)>, StatusCode> {
    let Some(token) = extract_cookie(headers, CHALLENGE_COOKIE_NAME) else {
        return Ok(None);
    };
    let token_hash = hash_session_token(&token);
    match lookup_challenge(pool, &token_hash).await {
        Ok(Some(user_id)) => Ok(Some((user_id, token_hash))),
        Ok(None) => Ok(None),
        Err(err) => {
            error!("Failed to lookup challenge: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Build a secure `HttpOnly` cookie for a session token.
///
/// `max_age_seconds: None` yields a browser-session cookie; the server-side
/// sliding window is what actually bounds those sessions.
pub(super) fn session_cookie(
    name: &str,
    token: &str,
    max_age_seconds: Option<i64>,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(max_age) = max_age_seconds {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_cookie(name: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    extract_cookie(headers, SESSION_COOKIE_NAME)
}

pub(super) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_cookie_finds_named_pair() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; sesamo_session=abc123; theme=dark"),
        );
        assert_eq!(
            extract_cookie(&headers, SESSION_COOKIE_NAME),
            Some("abc123".to_string())
        );
        assert_eq!(extract_cookie(&headers, CHALLENGE_COOKIE_NAME), None);
    }

    #[test]
    fn extract_session_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("sesamo_session=from-cookie"),
        );
        assert_eq!(extract_session_token(&headers), Some("tok".to_string()));
    }

    #[test]
    fn extract_bearer_token_rejects_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn session_cookie_sets_flags() {
        let cookie = session_cookie(SESSION_COOKIE_NAME, "tok", Some(3600), true).expect("cookie");
        let value = cookie.to_str().expect("ascii");
        assert!(value.starts_with("sesamo_session=tok;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=3600"));
        assert!(value.ends_with("; Secure"));
    }

    #[test]
    fn session_cookie_without_max_age_is_browser_scoped() {
        let cookie = session_cookie(SESSION_COOKIE_NAME, "tok", None, false).expect("cookie");
        let value = cookie.to_str().expect("ascii");
        assert!(!value.contains("Max-Age"));
        assert!(!value.contains("Secure"));
    }

    #[test]
    fn clear_cookie_zeroes_max_age() {
        let cookie = clear_cookie(CHALLENGE_COOKIE_NAME, false).expect("cookie");
        let value = cookie.to_str().expect("ascii");
        assert!(value.starts_with("sesamo_2fa=;"));
        assert!(value.contains("Max-Age=0"));
        assert!(!value.contains("Secure"));
    }
}
