//! Authenticator (TOTP) enrollment.
//!
//! Enrollment is two-step: start stores an unconfirmed secret and hands the
//! caller the `otpauth://` URL; finish verifies the first code. Only a
//! confirmed authenticator routes future sign-ins through the two-factor
//! challenge.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    principal::require_auth,
    state::AuthState,
    storage, totp,
    types::{EnrollFinishRequest, EnrollStartResponse},
};

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/enroll/start",
    responses(
        (status = 200, description = "Enrollment started", body = EnrollStartResponse),
        (status = 401, description = "Missing or invalid session cookie"),
    ),
    tag = "auth"
)]
pub async fn enroll_start(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, auth_state.config()).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let issuer = auth_state.config().totp_issuer();
    let (secret, otpauth_url) = match totp::generate_secret(issuer, &principal.username) {
        Ok(pair) => pair,
        Err(err) => {
            error!("Failed to generate authenticator secret: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Restarting enrollment replaces any earlier unconfirmed secret.
    if let Err(err) = storage::set_pending_authenticator(&pool, principal.user_id, &secret).await {
        error!("Failed to store authenticator secret: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!(user_id = %principal.user_id, "authenticator enrollment started");
    (
        StatusCode::OK,
        Json(EnrollStartResponse {
            secret,
            otpauth_url,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/enroll/finish",
    request_body = EnrollFinishRequest,
    responses(
        (status = 204, description = "Authenticator confirmed"),
        (status = 400, description = "Missing payload or invalid code"),
        (status = 401, description = "Missing or invalid session cookie"),
        (status = 404, description = "No enrollment in progress"),
    ),
    tag = "auth"
)]
pub async fn enroll_finish(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EnrollFinishRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, auth_state.config()).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let code = totp::normalize_code(&request.code);
    if code.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing authenticator code").into_response();
    }

    let secret = match storage::authenticator_secret(&pool, principal.user_id, false).await {
        Ok(Some(secret)) => secret,
        Ok(None) => return (StatusCode::NOT_FOUND, "No enrollment in progress").into_response(),
        Err(err) => {
            error!("Failed to fetch authenticator secret: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let issuer = auth_state.config().totp_issuer();
    if !totp::verify_code(&secret, issuer, &principal.username, &code) {
        warn!(user_id = %principal.user_id, "authenticator enrollment code rejected");
        return (StatusCode::BAD_REQUEST, "Invalid authenticator code").into_response();
    }

    match storage::confirm_authenticator(&pool, principal.user_id).await {
        Ok(true) => {
            info!(user_id = %principal.user_id, "authenticator confirmed");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => (StatusCode::NOT_FOUND, "No enrollment in progress").into_response(),
        Err(err) => {
            error!("Failed to confirm authenticator: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
