//! Local UI preferences
//!
//! Kept in a small JSON file outside the document store, per device rather
//! than per account. A missing or unreadable file means defaults.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub dark_mode: bool,
}

/// File-backed [`Preferences`]
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read preferences; falls back to defaults on any failure
    pub async fn load(&self) -> Preferences {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Preferences::default(),
            Err(e) => {
                tracing::warn!("Failed to read preferences {}: {}", self.path.display(), e);
                return Preferences::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring corrupt preferences {}: {}", self.path.display(), e);
            Preferences::default()
        })
    }

    pub async fn save(&self, preferences: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(preferences)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Flip the dark-mode flag and persist it
    pub async fn toggle_dark_mode(&self) -> Result<Preferences> {
        let mut preferences = self.load().await;
        preferences.dark_mode = !preferences.dark_mode;
        self.save(&preferences).await?;
        tracing::debug!(dark_mode = preferences.dark_mode, "Toggled theme");
        Ok(preferences)
    }
}
