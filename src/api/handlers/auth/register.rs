//! Local account registration.
//!
//! Flow Overview:
//! 1) Validate the payload: email format, password policy, matching
//!    confirmation.
//! 2) Reject duplicate usernames and emails with field-level errors before
//!    creating anything.
//! 3) Create the account and sign the user straight in with a
//!    non-persistent session.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    login::establish_session_with_status,
    password,
    state::AuthState,
    storage::{self, SignupOutcome},
    types::{FieldErrors, LoginResponse, RegisterRequest},
    utils::{normalize_email, valid_email},
};

const USERNAME_TAKEN: &str = "A user with this Username already exists.";
const EMAIL_TAKEN: &str = "A user with this email already exists.";

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = LoginResponse),
        (status = 400, description = "Validation failed", body = FieldErrors),
        (status = 409, description = "Username or email already exists", body = FieldErrors),
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let username = request.username.trim().to_string();
    let email = normalize_email(&request.email);

    let mut errors = FieldErrors::default();
    if username.is_empty() {
        errors.push("username", "The Username field is required.");
    }
    if !valid_email(&email) {
        errors.push("email", "The Email field is not a valid e-mail address.");
    }
    for violation in password::password_policy_violations(&request.password) {
        errors.push("password", violation);
    }
    if let Some(confirm) = &request.confirm_password {
        if *confirm != request.password {
            errors.push(
                "confirm_password",
                "The password and confirmation password do not match.",
            );
        }
    }
    if !errors.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
    }

    // Uniqueness first, so the caller gets a field-specific error instead of
    // a bare conflict.
    match storage::username_exists(&pool, &username).await {
        Ok(true) => {
            errors.push("username", USERNAME_TAKEN);
        }
        Ok(false) => {}
        Err(err) => {
            error!("Failed to check username: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    match storage::email_exists(&pool, &email).await {
        Ok(true) => {
            errors.push("email", EMAIL_TAKEN);
        }
        Ok(false) => {}
        Err(err) => {
            error!("Failed to check email: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    if !errors.is_empty() {
        warn!(username, "registration rejected: duplicate username or email");
        return (StatusCode::CONFLICT, Json(errors)).into_response();
    }

    let password_hash = match password::hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let user_id = match storage::create_local_user(&pool, &username, &email, &password_hash).await {
        Ok(SignupOutcome::Created(user_id)) => user_id,
        Ok(SignupOutcome::Conflict) => {
            // Raced with a concurrent registration on the unique indexes.
            let mut errors = FieldErrors::default();
            errors.push("username", USERNAME_TAKEN);
            return (StatusCode::CONFLICT, Json(errors)).into_response();
        }
        Err(err) => {
            error!("Failed to create user: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(username, %user_id, "local user created a new account");

    // Sign in the user after successful registration; registration sessions
    // are never persistent.
    establish_session_with_status(&pool, &auth_state, user_id, false, StatusCode::CREATED).await
}
