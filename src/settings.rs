//! Bridge settings persistence
//!
//! Identity shown to the OS, taskbar labels, peak polling and per-capability
//! switches, stored as JSON in the platform config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::peaks::ASTATS_PROPERTY;

/// Bridge settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub identity: IdentitySettings,
    pub taskbar: TaskbarSettings,
    pub peaks: PeakSettings,
    pub capabilities: CapabilitySettings,
}

/// How the player presents itself to the OS media surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// MPRIS bus name suffix (`org.mpris.MediaPlayer2.<dbus_name>`)
    pub dbus_name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskbarSettings {
    pub enabled: bool,
    #[serde(flatten)]
    pub labels: TaskbarLabels,
}

/// Tooltips for the thumbnail toolbar buttons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskbarLabels {
    pub previous: String,
    pub next: String,
    pub play: String,
    pub pause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakSettings {
    /// Backend property holding the astats metadata
    pub property: String,
    /// mpv `--input-ipc-server` socket to read from
    pub mpv_socket: Option<PathBuf>,
    pub poll_interval_ms: u64,
}

/// Switches to force a capability onto its no-op
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySettings {
    pub now_playing: bool,
    pub remote_commands: bool,
    pub window_geometry: bool,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            dbus_name: "mediabridge".to_string(),
            display_name: "MediaBridge".to_string(),
        }
    }
}

impl Default for TaskbarSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            labels: TaskbarLabels::default(),
        }
    }
}

impl Default for TaskbarLabels {
    fn default() -> Self {
        Self {
            previous: "Previous".to_string(),
            next: "Next".to_string(),
            play: "Play".to_string(),
            pause: "Pause".to_string(),
        }
    }
}

impl Default for PeakSettings {
    fn default() -> Self {
        Self {
            property: ASTATS_PROPERTY.to_string(),
            mpv_socket: None,
            poll_interval_ms: 50,
        }
    }
}

impl Default for CapabilitySettings {
    fn default() -> Self {
        Self {
            now_playing: true,
            remote_commands: true,
            window_geometry: true,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mediabridge", "MediaBridge")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Load settings from file, or return defaults if not found
    pub fn load() -> Self {
        Self::file_path()
            .and_then(|path| match Self::load_from_file(&path) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::debug!("Using default settings: {}", e);
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save settings to the default file
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::file_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to_file(&path)
    }

    /// Save settings to a specific file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Errors that can occur with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Could not determine config directory")]
    NoConfigDir,
}
