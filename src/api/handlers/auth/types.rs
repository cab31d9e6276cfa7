//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Where a sign-in attempt landed; mirrors the account flow states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoginOutcome {
    Authenticated,
    TwoFactorRequired,
    LockedOut,
    Rejected,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
    /// Verify against the local password hash instead of the directory.
    #[serde(default)]
    pub use_local: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub outcome: LoginOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LoginResponse {
    pub(super) fn authenticated(user_id: String) -> Self {
        Self {
            outcome: LoginOutcome::Authenticated,
            user_id: Some(user_id),
            message: None,
        }
    }

    pub(super) fn two_factor_required() -> Self {
        Self {
            outcome: LoginOutcome::TwoFactorRequired,
            user_id: None,
            message: None,
        }
    }

    pub(super) fn locked_out() -> Self {
        Self {
            outcome: LoginOutcome::LockedOut,
            user_id: None,
            message: Some("This account has been locked out, please try again later.".to_string()),
        }
    }

    pub(super) fn rejected(message: &str) -> Self {
        Self {
            outcome: LoginOutcome::Rejected,
            user_id: None,
            message: Some(message.to_string()),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorRequest {
    /// Authenticator code; surrounding whitespace and hyphens are stripped.
    pub code: String,
    #[serde(default)]
    pub remember_machine: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: Option<String>,
}

/// Field-keyed validation errors; the empty-string key carries form-level
/// messages.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct FieldErrors {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub(super) fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub(super) fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnrollStartResponse {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnrollFinishRequest {
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_outcome_serializes_snake_case() {
        let value = serde_json::to_value(LoginOutcome::TwoFactorRequired).expect("serialize");
        assert_eq!(value, serde_json::json!("two_factor_required"));
    }

    #[test]
    fn login_request_defaults_optional_flags() {
        let request: LoginRequest =
            serde_json::from_str(r#"{"username":"alice","password":"pw"}"#).expect("deserialize");
        assert!(!request.remember_me);
        assert!(!request.use_local);
    }

    #[test]
    fn login_response_omits_empty_fields() {
        let value =
            serde_json::to_value(LoginResponse::authenticated("id".to_string())).expect("serialize");
        assert_eq!(value.get("user_id"), Some(&serde_json::json!("id")));
        assert!(value.get("message").is_none());
    }

    #[test]
    fn field_errors_accumulate_by_field() {
        let mut errors = FieldErrors::default();
        assert!(errors.is_empty());
        errors.push("password", "too short");
        errors.push("password", "needs a digit");
        errors.push("email", "taken");
        assert_eq!(errors.errors["password"].len(), 2);
        assert_eq!(errors.errors["email"], vec!["taken".to_string()]);
    }
}
