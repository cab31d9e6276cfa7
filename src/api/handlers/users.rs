//! User administration endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via session cookie.
//! 2) Listing loads the full user set with its login providers, filters in
//!    memory (username substring, then provider), and paginates the result.
//! 3) Unlock and the edit screen are restricted to the admin role.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::{
    principal::{require_admin, require_auth},
    AuthState,
};
use crate::pagination::{clamp_page, clamp_page_size, PageInfo, Paginated};

/// Provider filter value meaning "no external login bindings".
const LOCAL_PROVIDER_FILTER: &str = "Local";

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserListQuery {
    /// Case-insensitive username substring.
    pub username: Option<String>,
    /// `"Local"` for accounts without bindings, or an exact provider name.
    pub login_provider: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub email_confirmed: bool,
    pub locked: bool,
    pub login_providers: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub items: Vec<UserSummary>,
    pub pagination: PageInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimEntry {
    pub claim_type: String,
    pub claim_value: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginEntry {
    pub login_provider: String,
    pub provider_display_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserDetail {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub email_confirmed: bool,
    pub two_factor_enabled: bool,
    pub locked: bool,
    pub locked_until: Option<String>,
    pub failed_access_count: i32,
    pub created_at: String,
    pub updated_at: String,
    pub claims: Vec<ClaimEntry>,
    pub logins: Vec<LoginEntry>,
    pub roles: Vec<String>,
}

/// One user joined with its provider names, before filtering.
#[derive(Clone, Debug)]
pub(crate) struct UserListRow {
    pub(crate) id: Uuid,
    pub(crate) username: String,
    pub(crate) email: Option<String>,
    pub(crate) email_confirmed: bool,
    pub(crate) locked: bool,
    pub(crate) login_providers: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/v1/users",
    params(
        ("username" = Option<String>, Query, description = "Case-insensitive username substring"),
        ("login_provider" = Option<String>, Query, description = "Provider name, or Local for accounts without bindings"),
        ("page" = Option<i64>, Query, description = "1-based page number"),
        ("page_size" = Option<i64>, Query, description = "Page size, clamped to [1,100]"),
    ),
    responses(
        (status = 200, description = "One page of users plus pagination metadata", body = UserListResponse),
        (status = 401, description = "Missing or invalid session cookie"),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    Query(query): Query<UserListQuery>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(status) = require_auth(&headers, &pool, auth_state.config()).await {
        return status.into_response();
    }

    let rows = match fetch_user_rows(&pool).await {
        Ok(rows) => rows,
        Err(err) => {
            error!("Failed to list users: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let filtered = filter_users(
        rows,
        query.username.as_deref(),
        query.login_provider.as_deref(),
    );

    let page = clamp_page(query.page);
    let page_size = clamp_page_size(query.page_size);
    let paginated = Paginated::create(filtered, page, page_size);

    let pagination = paginated.page_info();
    let items = paginated
        .items
        .into_iter()
        .map(|row| UserSummary {
            id: row.id.to_string(),
            username: row.username,
            email: row.email,
            email_confirmed: row.email_confirmed,
            locked: row.locked,
            login_providers: row.login_providers,
        })
        .collect();

    (
        StatusCode::OK,
        Json(UserListResponse { items, pagination }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail with claims and logins", body = UserDetail),
        (status = 400, description = "Invalid user id"),
        (status = 401, description = "Missing or invalid session cookie"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(status) = require_auth(&headers, &pool, auth_state.config()).await {
        return status.into_response();
    }

    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    user_detail_response(&pool, user_id).await
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}/edit",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "Editable user record (admin-only)", body = UserDetail),
        (status = 400, description = "Invalid user id"),
        (status = 401, description = "Missing or invalid session cookie"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn edit_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(status) = require_admin(&headers, &pool, auth_state.config()).await {
        return status.into_response();
    }

    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    user_detail_response(&pool, user_id).await
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/unlock",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 204, description = "Lockout cleared (admin-only)"),
        (status = 400, description = "Invalid user id"),
        (status = 401, description = "Missing or invalid session cookie"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn unlock_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_admin(&headers, &pool, auth_state.config()).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match clear_lockout(&pool, user_id).await {
        Ok(true) => {
            info!(admin = %principal.user_id, %user_id, "account unlocked");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to unlock account: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn user_detail_response(pool: &PgPool, user_id: Uuid) -> Response {
    match fetch_user_detail(pool, user_id).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user detail: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Apply the two listing filters in sequence: username substring, then
/// login provider.
pub(crate) fn filter_users(
    rows: Vec<UserListRow>,
    username: Option<&str>,
    login_provider: Option<&str>,
) -> Vec<UserListRow> {
    let mut rows = rows;

    if let Some(needle) = username.map(str::trim).filter(|needle| !needle.is_empty()) {
        let needle = needle.to_lowercase();
        rows.retain(|row| row.username.to_lowercase().contains(&needle));
    }

    if let Some(provider) = login_provider
        .map(str::trim)
        .filter(|provider| !provider.is_empty())
    {
        if provider.eq_ignore_ascii_case(LOCAL_PROVIDER_FILTER) {
            rows.retain(|row| row.login_providers.is_empty());
        } else {
            rows.retain(|row| {
                row.login_providers
                    .iter()
                    .any(|bound| bound.eq_ignore_ascii_case(provider))
            });
        }
    }

    rows
}

async fn fetch_user_rows(pool: &PgPool) -> Result<Vec<UserListRow>, sqlx::Error> {
    let query = r"
        SELECT
            id,
            username,
            email,
            email_confirmed,
            (locked_until IS NOT NULL AND locked_until > NOW()) AS locked
        FROM users
        ORDER BY LOWER(username)
    ";
    let user_rows = sqlx::query(query).fetch_all(pool).await?;

    let query = "SELECT user_id, login_provider FROM user_logins";
    let login_rows = sqlx::query(query).fetch_all(pool).await?;

    let mut providers: HashMap<Uuid, Vec<String>> = HashMap::new();
    for row in login_rows {
        providers
            .entry(row.get("user_id"))
            .or_default()
            .push(row.get("login_provider"));
    }

    Ok(user_rows
        .into_iter()
        .map(|row| {
            let id: Uuid = row.get("id");
            UserListRow {
                id,
                username: row.get("username"),
                email: row.get("email"),
                email_confirmed: row.get("email_confirmed"),
                locked: row.get("locked"),
                login_providers: providers.remove(&id).unwrap_or_default(),
            }
        })
        .collect())
}

pub(crate) async fn fetch_user_detail(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserDetail>, sqlx::Error> {
    let query = r#"
        SELECT
            id::text AS id,
            username,
            email,
            email_confirmed,
            (two_factor_secret IS NOT NULL AND two_factor_confirmed) AS two_factor_enabled,
            (locked_until IS NOT NULL AND locked_until > NOW()) AS locked,
            CASE
                WHEN locked_until IS NULL THEN NULL
                ELSE to_char(locked_until AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
            END AS locked_until,
            failed_access_count,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM users
        WHERE id = $1
        LIMIT 1
    "#;
    let row = sqlx::query(query).bind(user_id).fetch_optional(pool).await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let query = r"
        SELECT claim_type, claim_value
        FROM user_claims
        WHERE user_id = $1
        ORDER BY claim_type
    ";
    let claims = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|claim| ClaimEntry {
            claim_type: claim.get("claim_type"),
            claim_value: claim.get("claim_value"),
        })
        .collect();

    let query = r"
        SELECT login_provider, provider_display_name
        FROM user_logins
        WHERE user_id = $1
        ORDER BY login_provider
    ";
    let logins = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|login| LoginEntry {
            login_provider: login.get("login_provider"),
            provider_display_name: login.get("provider_display_name"),
        })
        .collect();

    let query = "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role";
    let roles = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|role| role.get("role"))
        .collect();

    Ok(Some(UserDetail {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        email_confirmed: row.get("email_confirmed"),
        two_factor_enabled: row.get("two_factor_enabled"),
        locked: row.get("locked"),
        locked_until: row.get("locked_until"),
        failed_access_count: row.get("failed_access_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        claims,
        logins,
        roles,
    }))
}

/// Clear the lockout window and failed-access counter. Returns false when
/// the user does not exist.
async fn clear_lockout(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let query = r"
        UPDATE users
        SET locked_until = NULL, failed_access_count = 0, updated_at = NOW()
        WHERE id = $1
    ";
    let result = sqlx::query(query).bind(user_id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{clamp_page, clamp_page_size, Paginated};

    fn row(username: &str, providers: Vec<&str>) -> UserListRow {
        UserListRow {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: Some(format!("{}@example.com", username.to_lowercase())),
            email_confirmed: true,
            locked: false,
            login_providers: providers.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn username_filter_is_case_insensitive_substring() {
        let rows = vec![
            row("Alice.Smith", vec![]),
            row("bob", vec![]),
            row("malice", vec![]),
        ];
        let filtered = filter_users(rows, Some("alice"), None);
        let names: Vec<&str> = filtered.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["Alice.Smith", "malice"]);
    }

    #[test]
    fn local_filter_selects_users_without_bindings() {
        let rows = vec![
            row("alice", vec!["ActiveDirectory"]),
            row("bob", vec![]),
            row("carol", vec![]),
        ];
        let filtered = filter_users(rows, None, Some("Local"));
        let names: Vec<&str> = filtered.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);

        // Case-insensitive, like every other filter comparison here.
        let rows = vec![row("dave", vec![])];
        assert_eq!(filter_users(rows, None, Some("local")).len(), 1);
    }

    #[test]
    fn provider_filter_matches_bound_provider_names() {
        let rows = vec![
            row("alice", vec!["ActiveDirectory"]),
            row("bob", vec!["Okta"]),
            row("carol", vec![]),
        ];
        let filtered = filter_users(rows, None, Some("activedirectory"));
        let names: Vec<&str> = filtered.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["alice"]);
    }

    #[test]
    fn filters_apply_in_sequence() {
        let rows = vec![
            row("alice", vec![]),
            row("alice-ad", vec!["ActiveDirectory"]),
            row("bob", vec![]),
        ];
        let filtered = filter_users(rows, Some("alice"), Some("Local"));
        let names: Vec<&str> = filtered.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["alice"]);
    }

    #[test]
    fn blank_filters_are_ignored() {
        let rows = vec![row("alice", vec![]), row("bob", vec!["ActiveDirectory"])];
        assert_eq!(filter_users(rows.clone(), Some("  "), Some("")).len(), 2);
        assert_eq!(filter_users(rows, None, None).len(), 2);
    }

    #[test]
    fn local_page_two_of_twenty_three_users() {
        // 23 users, 12 of them local; page 2 at size 10 holds the last 2
        // local users.
        let mut rows = Vec::new();
        for i in 0..12 {
            rows.push(row(&format!("local{i:02}"), vec![]));
        }
        for i in 0..11 {
            rows.push(row(&format!("bound{i:02}"), vec!["ActiveDirectory"]));
        }
        assert_eq!(rows.len(), 23);

        let filtered = filter_users(rows, None, Some("Local"));
        assert_eq!(filtered.len(), 12);

        let page = Paginated::create(filtered, clamp_page(Some(2)), clamp_page_size(Some(10)));
        assert_eq!(page.items.len(), 2);
        let names: Vec<&str> = page.items.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["local10", "local11"]);

        let info = page.page_info();
        assert_eq!(info.total_pages, 2);
        assert_eq!(info.total_items, 12);
        assert!(info.has_previous);
        assert!(!info.has_next);
    }
}
