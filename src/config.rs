//! Learnboard configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main Learnboard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnboardConfig {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Identity configuration
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl LearnboardConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Look up a configured federated provider by name
    pub fn federated_provider(&self, name: &str) -> Option<&FederatedProviderConfig> {
        self.identity.federated.iter().find(|p| p.name == name)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for documents, accounts and the active session
    pub data_dir: PathBuf,

    /// Local UI preferences file (dark mode flag)
    pub preferences_file: PathBuf,
}

impl StorageConfig {
    /// Per-user document collections
    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("users")
    }

    /// Account registry and persisted session
    pub fn identity_dir(&self) -> PathBuf {
        self.data_dir.join("identity")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs_next::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("learnboard");
        let preferences_file = dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("learnboard")
            .join("preferences.json");

        Self {
            data_dir,
            preferences_file,
        }
    }
}

/// Identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Minimum accepted password length at sign-up
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,

    /// Federated sign-in providers
    #[serde(default)]
    pub federated: Vec<FederatedProviderConfig>,
}

fn default_min_password_len() -> usize {
    6
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            min_password_len: default_min_password_len(),
            federated: Vec::new(),
        }
    }
}

/// A federated provider that signs identity assertions with a shared secret
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedProviderConfig {
    /// Provider name (e.g. "google")
    pub name: String,

    /// Shared HMAC secret used to verify assertions
    pub secret: String,
}
