//! Configuration management for input-recorder

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::input::{CaptureMode, HotkeyBindings};
use crate::session::MAX_COUNTDOWN_SECS;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Global hotkey bindings
    #[serde(default)]
    pub hotkeys: HotkeyConfig,

    /// Recording configuration
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeyConfig {
    /// Key that starts and stops recording
    #[serde(default = "default_record_hotkey")]
    pub record: String,

    /// Key that starts and stops playback
    #[serde(default = "default_playback_hotkey")]
    pub playback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Seconds to wait before recording starts (0 to 10)
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,

    /// `observe` or `intercept`
    #[serde(default)]
    pub capture_mode: CaptureMode,

    /// Swallow captured input so other applications never see it (intercept mode only)
    #[serde(default)]
    pub suppress_outgoing: bool,

    /// Where recordings are saved and listed
    #[serde(default)]
    pub recordings_directory: Option<PathBuf>,

    /// Save every finished recording automatically
    #[serde(default)]
    pub autosave: bool,
}

fn default_record_hotkey() -> String {
    "F8".to_string()
}

fn default_playback_hotkey() -> String {
    "F9".to_string()
}

fn default_countdown_secs() -> u32 {
    3
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            record: default_record_hotkey(),
            playback: default_playback_hotkey(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown_secs(),
            capture_mode: CaptureMode::default(),
            suppress_outgoing: false,
            recordings_directory: None,
            autosave: false,
        }
    }
}

impl HotkeyConfig {
    /// Resolve the configured key names
    pub fn bindings(&self) -> Result<HotkeyBindings> {
        HotkeyBindings::parse(&self.record, &self.playback).context("Invalid hotkey configuration")
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;

            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Config::default()
        };

        let existed = path.exists();
        config.config_path = Some(path.to_path_buf());
        config.validate()?;

        if !existed {
            config.save()?;
        }
        Ok(config)
    }

    /// Reject values the recorder cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.recording.countdown_secs > MAX_COUNTDOWN_SECS {
            bail!(
                "countdown_secs must be between 0 and {}, got {}",
                MAX_COUNTDOWN_SECS,
                self.recording.countdown_secs
            );
        }
        self.hotkeys.bindings()?;
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory recordings are saved to and listed from
    pub fn recordings_dir(&self) -> Result<PathBuf> {
        match &self.recording.recordings_directory {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().join("recordings")),
        }
    }
}

pub(crate) fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "input-recorder", "input-recorder")
        .context("Failed to determine config directory")
}
