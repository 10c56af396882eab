//! Local persistence for non-secret viewer preferences.
//!
//! Stored as JSON files in the platform-appropriate config directory:
//!   - Linux: `~/.config/hubview/`
//!   - macOS: `~/Library/Application Support/hubview/`
//!   - Windows: `%APPDATA%\hubview\`
//!
//! Credentials and secrets never go through this module.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

const PREFERENCES_KEY: &str = "preferences";

/// Viewer preferences that survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Whether the room is expected to require a credential.
    #[serde(default)]
    pub require_auth: bool,
}

/// JSON-file key/value store rooted at one directory.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the user's config directory, if the platform has one.
    pub fn open_default() -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        Some(Self::new(config_dir.join("hubview")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }

    /// Save a value. Creates the directory on first use.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(self.file_path(key), json)?;
        Ok(())
    }

    /// Load a value. Returns `None` if the key doesn't exist or deserialization fails.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = std::fs::read_to_string(self.file_path(key)).ok()?;
        serde_json::from_str(&json).ok()
    }

    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }

    pub fn load_preferences(&self) -> Preferences {
        self.load(PREFERENCES_KEY).unwrap_or_default()
    }

    pub fn save_preferences(&self, prefs: &Preferences) -> anyhow::Result<()> {
        self.save(PREFERENCES_KEY, prefs)
    }
}
