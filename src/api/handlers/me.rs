//! Authenticated self-service profile endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::auth::{principal::require_auth, AuthState};
use super::users::{fetch_user_detail, UserDetail};

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "The caller's own profile with claims and logins", body = UserDetail),
        (status = 401, description = "Missing or invalid session cookie"),
        (status = 404, description = "User record no longer exists"),
    ),
    tag = "me"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, auth_state.config()).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match fetch_user_detail(&pool, principal.user_id).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
