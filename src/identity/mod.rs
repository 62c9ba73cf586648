//! Identity module: accounts, sign-in and the live current user
//!
//! An [`IdentityService`] issues the current user and publishes every
//! change (login, logout) through a `watch` channel. The sync layer and the
//! tracker only ever look at that channel, so any provider can back them.
//!
//! [`LocalIdentity`] keeps accounts on disk with PBKDF2 password hashes and
//! supports federated sign-in through [`FederatedProvider`]s.

pub mod federated;
pub mod local;
pub mod password;

pub use federated::{sign_assertion, AssertionClaims, FederatedIdentity, FederatedProvider, HmacAssertionProvider};
pub use local::LocalIdentity;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// Sign-in method name for email/password accounts
pub const PASSWORD_PROVIDER: &str = "password";

/// An authenticated account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable account id; scopes all of the user's documents
    pub uid: String,
    pub email: Option<String>,
    /// `"password"` or the federated provider name
    pub provider: String,
}

impl User {
    /// Name to show in the UI
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.uid)
    }
}

/// Authentication failures. Messages are shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Password should be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("Email already in use")]
    EmailInUse,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Unknown sign-in provider '{0}'")]
    UnknownProvider(String),

    #[error("Sign-in with {provider} failed: {reason}")]
    Provider { provider: String, reason: String },
}

/// Identity provider consumed by the tracker
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Create an email/password account and sign it in
    async fn sign_up(&self, email: &str, password: &str) -> Result<User>;

    /// Sign in with email and password
    async fn log_in(&self, email: &str, password: &str) -> Result<User>;

    /// Sign in through a federated provider; the first sign-in creates the account
    async fn log_in_with(&self, provider: &dyn FederatedProvider) -> Result<User>;

    /// End the current session
    async fn log_out(&self) -> Result<()>;

    /// Currently signed-in user
    fn current_user(&self) -> Option<User>;

    /// Live view of the current user
    fn subscribe(&self) -> watch::Receiver<Option<User>>;
}
