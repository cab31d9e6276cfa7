//! Sign-in flow: directory or local credentials, then an optional
//! two-factor challenge.
//!
//! Flow Overview:
//! 1) Already-authenticated callers are short-circuited.
//! 2) Directory path: validate against the directory, provision on first
//!    sign-in, establish a session.
//! 3) Local path: verify the password hash; accounts with a confirmed
//!    authenticator get a challenge session instead of a full one.
//! 4) Challenge verification issues the full session and clears lockout
//!    counters; repeated failures lock the account out.
//!
//! Security boundaries: rejections are generic. The response never reveals
//! whether the username exists, which password store matched, or whether the
//! directory was reachable.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    session::{
        authenticate_session, clear_cookie, session_cookie, CHALLENGE_COOKIE_NAME,
        SESSION_COOKIE_NAME,
    },
    state::AuthState,
    storage::{self, SessionKind},
    totp,
    types::{LoginRequest, LoginResponse, TwoFactorRequest},
    password,
};
use crate::directory::provision::get_or_create_user;

const INVALID_CREDENTIALS: &str = "Invalid credentials.";
const INVALID_LOGIN_ATTEMPT: &str = "Invalid login attempt.";
const INVALID_AUTHENTICATOR_CODE: &str = "Invalid authenticator code.";

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated, or a two-factor challenge was issued", body = LoginResponse),
        (status = 400, description = "Missing or empty credentials"),
        (status = 401, description = "Credentials rejected", body = LoginResponse),
        (status = 423, description = "Account locked out", body = LoginResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    // Back-button or repeated POSTs from a signed-in client are a no-op.
    match authenticate_session(&headers, &pool, auth_state.config()).await {
        Ok(Some(record)) => {
            return (
                StatusCode::OK,
                Json(LoginResponse::authenticated(record.user_id.to_string())),
            )
                .into_response();
        }
        Ok(None) => {}
        Err(status) => return status.into_response(),
    }

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let username = request.username.trim().to_string();
    if username.is_empty() || request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing credentials").into_response();
    }

    if request.use_local {
        local_login(&pool, &auth_state, &username, &request).await
    } else {
        directory_login(&pool, &auth_state, &username, &request).await
    }
}

async fn directory_login(
    pool: &PgPool,
    auth_state: &AuthState,
    username: &str,
    request: &LoginRequest,
) -> Response {
    if !auth_state
        .directory()
        .validate_credentials(username, &request.password)
        .await
    {
        // Deliberately indistinguishable from "no such user".
        warn!(username, "directory sign-in rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse::rejected(INVALID_CREDENTIALS)),
        )
            .into_response();
    }

    let user = match get_or_create_user(pool, auth_state.directory(), username).await {
        Ok((user, is_new)) => {
            if is_new {
                info!(username, "first directory sign-in provisioned local user");
            }
            user
        }
        Err(err) => {
            error!("Failed to provision directory user: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(username, user_id = %user.id, "user signed in with directory authentication");
    establish_session(pool, auth_state, user.id, request.remember_me).await
}

async fn local_login(
    pool: &PgPool,
    auth_state: &AuthState,
    username: &str,
    request: &LoginRequest,
) -> Response {
    let record = match storage::lookup_credentials(pool, username).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            warn!(username, "local sign-in for unknown username");
            return (
                StatusCode::UNAUTHORIZED,
                Json(LoginResponse::rejected(INVALID_LOGIN_ATTEMPT)),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to lookup credentials: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if record.locked {
        warn!(username, "sign-in attempt against locked-out account");
        return (StatusCode::LOCKED, Json(LoginResponse::locked_out())).into_response();
    }

    // Directory-provisioned accounts carry no local hash and cannot use this
    // path.
    let password_ok = record
        .password_hash
        .as_deref()
        .is_some_and(|hash| password::verify_password(&request.password, hash));
    if !password_ok {
        // Lockout counters are reserved for the two-factor step; a plain
        // password miss is just rejected.
        warn!(username, "local sign-in password rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse::rejected(INVALID_LOGIN_ATTEMPT)),
        )
            .into_response();
    }

    if record.two_factor_ready {
        let config = auth_state.config();
        let token = match storage::insert_session(
            pool,
            record.user_id,
            SessionKind::Challenge,
            false,
            config.challenge_ttl_seconds(),
        )
        .await
        {
            Ok(token) => token,
            Err(err) => {
                error!("Failed to create challenge session: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let Ok(cookie) = session_cookie(
            CHALLENGE_COOKIE_NAME,
            &token,
            Some(config.challenge_ttl_seconds()),
            config.session_cookie_secure(),
        ) else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };
        let mut response_headers = HeaderMap::new();
        response_headers.insert(SET_COOKIE, cookie);

        info!(username, user_id = %record.user_id, "password accepted, two-factor challenge issued");
        return (
            StatusCode::OK,
            response_headers,
            Json(LoginResponse::two_factor_required()),
        )
            .into_response();
    }

    info!(username, user_id = %record.user_id, "user signed in with local authentication");
    establish_session(pool, auth_state, record.user_id, request.remember_me).await
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/2fa",
    request_body = TwoFactorRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Missing payload or empty code"),
        (status = 401, description = "No challenge in progress or code rejected", body = LoginResponse),
        (status = 423, description = "Account locked out", body = LoginResponse),
    ),
    tag = "auth"
)]
pub async fn login_2fa(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorRequest>>,
) -> Response {
    let (user_id, challenge_hash) =
        match super::session::authenticate_challenge(&headers, &pool).await {
            Ok(Some(challenge)) => challenge,
            Ok(None) => {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(LoginResponse::rejected(
                        "Unable to load two-factor authentication user.",
                    )),
                )
                    .into_response();
            }
            Err(status) => return status.into_response(),
        };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    // Authenticator apps render codes as "123 456" or "123-456".
    let code = totp::normalize_code(&request.code);
    if code.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing authenticator code").into_response();
    }

    let config = auth_state.config();
    let secret = match storage::authenticator_secret(&pool, user_id, true).await {
        Ok(Some(secret)) => secret,
        Ok(None) => {
            // Challenge without a confirmed authenticator should not happen;
            // treat it as an expired challenge.
            error!(%user_id, "challenge session without confirmed authenticator");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(err) => {
            error!("Failed to fetch authenticator secret: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The account label is otpauth-URL metadata; it plays no part in
    // verification.
    if !totp::verify_code(&secret, config.totp_issuer(), "user", &code) {
        warn!(%user_id, "invalid authenticator code");
        let locked = match storage::record_failed_access(
            &pool,
            user_id,
            config.max_failed_access(),
            config.lockout_seconds(),
        )
        .await
        {
            Ok(locked) => locked,
            Err(err) => {
                error!("Failed to record failed access: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        if locked {
            warn!(%user_id, "account locked out after repeated two-factor failures");
            if let Err(err) = storage::delete_session(&pool, &challenge_hash).await {
                error!("Failed to consume challenge session: {err}");
            }
            return (StatusCode::LOCKED, Json(LoginResponse::locked_out())).into_response();
        }

        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse::rejected(INVALID_AUTHENTICATOR_CODE)),
        )
            .into_response();
    }

    // The challenge is single-use; consume it before minting the session.
    if let Err(err) = storage::delete_session(&pool, &challenge_hash).await {
        error!("Failed to consume challenge session: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if let Err(err) = storage::reset_failed_access(&pool, user_id).await {
        error!("Failed to reset failed access count: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!(%user_id, "user signed in with two-factor authentication");
    establish_session(&pool, &auth_state, user_id, request.remember_machine).await
}

/// Mint a full session, set its cookie, and clear any challenge cookie.
pub(super) async fn establish_session(
    pool: &PgPool,
    auth_state: &AuthState,
    user_id: uuid::Uuid,
    remember: bool,
) -> Response {
    establish_session_with_status(pool, auth_state, user_id, remember, StatusCode::OK).await
}

/// Like `establish_session` but with a caller-chosen success status
/// (registration answers 201).
pub(super) async fn establish_session_with_status(
    pool: &PgPool,
    auth_state: &AuthState,
    user_id: uuid::Uuid,
    remember: bool,
    status: StatusCode,
) -> Response {
    let config = auth_state.config();
    let ttl_seconds = if remember {
        config.remember_ttl_seconds()
    } else {
        config.session_ttl_seconds()
    };

    let token =
        match storage::insert_session(pool, user_id, SessionKind::Full, remember, ttl_seconds)
            .await
        {
            Ok(token) => token,
            Err(err) => {
                error!("Failed to create session: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

    // Non-persistent sessions ride on a browser-session cookie; the sliding
    // server-side window bounds their real lifetime.
    let max_age = remember.then_some(ttl_seconds);
    let secure = config.session_cookie_secure();
    let Ok(cookie) = session_cookie(SESSION_COOKIE_NAME, &token, max_age, secure) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let mut response_headers = HeaderMap::new();
    response_headers.append(SET_COOKIE, cookie);
    if let Ok(cleared) = clear_cookie(CHALLENGE_COOKIE_NAME, secure) {
        response_headers.append(SET_COOKIE, cleared);
    }

    (
        status,
        response_headers,
        Json(LoginResponse::authenticated(user_id.to_string())),
    )
        .into_response()
}
