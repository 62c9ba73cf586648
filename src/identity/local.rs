//! Local identity service with file-based persistence
//!
//! Directory layout:
//! ```text
//! <identity dir>/
//! ├── accounts.json   # registered accounts
//! └── session.json    # currently signed-in user, if any
//! ```
//!
//! The session survives restarts, so consecutive CLI invocations stay
//! signed in until `log_out`.

use super::password::{PasswordHash, DEFAULT_ITERATIONS};
use super::{AuthError, FederatedProvider, IdentityService, User, PASSWORD_PROVIDER};
use crate::config::IdentityConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{watch, RwLock};

const ACCOUNTS_FILE: &str = "accounts.json";
const SESSION_FILE: &str = "session.json";
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    uid: String,
    email: Option<String>,
    provider: String,
    /// Provider-scoped subject for federated accounts
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    password: Option<PasswordHash>,
    created_at: i64,
}

impl Account {
    fn user(&self) -> User {
        User {
            uid: self.uid.clone(),
            email: self.email.clone(),
            provider: self.provider.clone(),
        }
    }
}

/// Identity service keeping accounts and the session on local disk
pub struct LocalIdentity {
    dir: PathBuf,
    min_password_len: usize,
    hash_iterations: u32,
    email_pattern: Regex,
    accounts: RwLock<Vec<Account>>,
    current: watch::Sender<Option<User>>,
}

impl LocalIdentity {
    /// Open the identity store at `dir`, restoring a persisted session
    pub async fn open(dir: PathBuf, config: &IdentityConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&dir).await?;

        let email_pattern = Regex::new(EMAIL_PATTERN)
            .map_err(|e| Error::Internal(format!("Invalid email pattern: {}", e)))?;

        let accounts: Vec<Account> = read_json(&dir.join(ACCOUNTS_FILE))
            .await?
            .unwrap_or_default();

        // A session for an account that no longer exists is dropped
        let session = read_json::<User>(&dir.join(SESSION_FILE))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable session: {}", e);
                None
            })
            .and_then(|user| {
                accounts
                    .iter()
                    .find(|a| a.uid == user.uid)
                    .map(Account::user)
            });

        if let Some(user) = &session {
            tracing::debug!(uid = %user.uid, "Restored session");
        }

        let (current, _) = watch::channel(session);
        Ok(Self {
            dir,
            min_password_len: config.min_password_len,
            hash_iterations: DEFAULT_ITERATIONS,
            email_pattern,
            accounts: RwLock::new(accounts),
            current,
        })
    }

    /// Override the PBKDF2 iteration count for new password hashes
    pub fn with_hash_iterations(mut self, iterations: u32) -> Self {
        self.hash_iterations = iterations;
        self
    }

    fn normalize_email(&self, email: &str) -> std::result::Result<String, AuthError> {
        let email = email.trim().to_lowercase();
        if self.email_pattern.is_match(&email) {
            Ok(email)
        } else {
            Err(AuthError::InvalidEmail)
        }
    }

    /// Re-read the registry so accounts created by other processes are kept
    async fn reload_accounts(&self, accounts: &mut Vec<Account>) -> Result<()> {
        *accounts = read_json(&self.dir.join(ACCOUNTS_FILE))
            .await?
            .unwrap_or_default();
        Ok(())
    }

    async fn persist_accounts(&self, accounts: &[Account]) -> Result<()> {
        write_json(&self.dir.join(ACCOUNTS_FILE), &accounts).await
    }

    /// Persist and publish the new session
    async fn start_session(&self, user: User) -> Result<User> {
        write_json(&self.dir.join(SESSION_FILE), &user).await?;
        tracing::info!(uid = %user.uid, provider = %user.provider, "Signed in");
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }
}

#[async_trait]
impl IdentityService for LocalIdentity {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User> {
        let email = self.normalize_email(email)?;
        if password.chars().count() < self.min_password_len {
            return Err(AuthError::WeakPassword {
                min: self.min_password_len,
            }
            .into());
        }

        let user = {
            let mut accounts = self.accounts.write().await;
            self.reload_accounts(&mut accounts).await?;
            if accounts
                .iter()
                .any(|a| a.email.as_deref() == Some(email.as_str()))
            {
                return Err(AuthError::EmailInUse.into());
            }

            let account = Account {
                uid: uuid::Uuid::new_v4().simple().to_string(),
                email: Some(email),
                provider: PASSWORD_PROVIDER.to_string(),
                subject: None,
                password: Some(PasswordHash::new(password, self.hash_iterations)),
                created_at: chrono::Utc::now().timestamp_millis(),
            };
            let user = account.user();

            accounts.push(account);
            if let Err(e) = self.persist_accounts(&accounts).await {
                accounts.pop();
                return Err(e);
            }
            user
        };

        self.start_session(user).await
    }

    async fn log_in(&self, email: &str, password: &str) -> Result<User> {
        let email = self
            .normalize_email(email)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let user = {
            let mut accounts = self.accounts.write().await;
            self.reload_accounts(&mut accounts).await?;
            accounts
                .iter()
                .filter(|a| a.provider == PASSWORD_PROVIDER)
                .find(|a| a.email.as_deref() == Some(email.as_str()))
                .filter(|a| {
                    a.password
                        .as_ref()
                        .map(|hash| hash.verify(password))
                        .unwrap_or(false)
                })
                .map(Account::user)
        };

        match user {
            Some(user) => self.start_session(user).await,
            None => {
                tracing::debug!("Rejected password sign-in");
                Err(AuthError::InvalidCredentials.into())
            }
        }
    }

    async fn log_in_with(&self, provider: &dyn FederatedProvider) -> Result<User> {
        let identity = provider.authenticate().await?;

        let user = {
            let mut accounts = self.accounts.write().await;
            self.reload_accounts(&mut accounts).await?;
            let existing = accounts.iter().find(|a| {
                a.provider == identity.provider
                    && a.subject.as_deref() == Some(identity.subject.as_str())
            });

            match existing {
                Some(account) => account.user(),
                None => {
                    let account = Account {
                        uid: uuid::Uuid::new_v4().simple().to_string(),
                        email: identity.email.map(|e| e.trim().to_lowercase()),
                        provider: identity.provider,
                        subject: Some(identity.subject),
                        password: None,
                        created_at: chrono::Utc::now().timestamp_millis(),
                    };
                    let user = account.user();

                    accounts.push(account);
                    if let Err(e) = self.persist_accounts(&accounts).await {
                        accounts.pop();
                        return Err(e);
                    }
                    tracing::info!(uid = %user.uid, provider = %user.provider, "Created federated account");
                    user
                }
            }
        };

        self.start_session(user).await
    }

    async fn log_out(&self) -> Result<()> {
        match tokio::fs::remove_file(self.dir.join(SESSION_FILE)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(user) = self.current.send_replace(None) {
            tracing::info!(uid = %user.uid, "Signed out");
        }
        Ok(())
    }

    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temporary file so other processes never read a partial file
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, json).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}
