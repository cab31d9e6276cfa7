//! Auth handlers and supporting modules.
//!
//! This module coordinates the sign-in flows (directory and local), the
//! two-factor challenge, registration, and session management.
//!
//! ## Lockout
//!
//! Failed two-factor attempts increment the account's failed-access counter;
//! reaching the limit locks sign-in until the lockout window expires or an
//! administrator unlocks the account. Plain password misses do not count
//! toward lockout.
//!
//! ## Cookies
//!
//! Full sessions live in `sesamo_session`, pending two-factor challenges in
//! `sesamo_2fa`. Both cookies are `HttpOnly`, `SameSite=Lax`, and carry only
//! random tokens whose hashes are stored server-side.

pub(crate) mod enroll;
pub(crate) mod login;
mod password;
pub(crate) mod principal;
pub(crate) mod register;
pub(crate) mod session;
mod state;
mod storage;
mod totp;
pub(crate) mod types;
pub(crate) mod utils;

pub use principal::Principal;
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
mod tests;
