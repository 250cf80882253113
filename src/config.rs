//! # Configuration Module
//!
//! This module handles configuration management and data directory setup for
//! MusicBlocks. It provides platform-appropriate storage locations for the
//! block database and the managed music library, plus optional runtime
//! settings loaded from `config.json`.
//!
//! ## Data Storage
//!
//! MusicBlocks stores its database in the platform-standard data directory:
//! - Linux: `~/.local/share/musicblocks/`
//! - macOS: `~/Library/Application Support/musicblocks/`
//! - Windows: `%APPDATA%\musicblocks\`
//!
//! Songs registered through `musicblocks add` are copied into the managed
//! music library, by default `<audio dir>/MusicBlocks/`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Returns the platform-appropriate data directory for MusicBlocks.
///
/// The directory is created if it does not exist, so callers can rely on
/// being able to place files (database, config) inside it.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The musicblocks subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let blocks_dir = data_dir.join("musicblocks");
    fs::create_dir_all(&blocks_dir).with_context(|| {
        format!(
            "Failed to create MusicBlocks data directory at {}. Please check file permissions.",
            blocks_dir.display()
        )
    })?;

    Ok(blocks_dir)
}

/// Returns the path of the block database file.
///
/// The file itself is not created here; `musicblocks add` initializes it and
/// the daemon refuses to start without it.
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("MusicBlocks.db"))
}

fn default_music_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
        .unwrap_or_else(|| PathBuf::from("Music"))
        .join("MusicBlocks")
}

fn default_poll_interval() -> u64 {
    1
}

fn default_volume() -> f64 {
    100.0
}

fn default_player_bin() -> String {
    "mpg123".to_string()
}

fn default_reader_bin() -> String {
    "nfc-list".to_string()
}

/// Runtime settings, optionally overridden by `config.json` in the data
/// directory. Every field has a default so a missing or partial file works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory the managed song files are copied into and played from.
    #[serde(default = "default_music_dir")]
    pub music_dir: PathBuf,

    /// Seconds between reader polls in the daemon loop.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Startup playback volume, percent.
    #[serde(default = "default_volume")]
    pub volume: f64,

    /// External player binary. Must support the mpg123 remote interface.
    #[serde(default = "default_player_bin")]
    pub player_bin: String,

    /// External reader binary used to poll for a present tag.
    #[serde(default = "default_reader_bin")]
    pub reader_bin: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            music_dir: default_music_dir(),
            poll_interval_secs: default_poll_interval(),
            volume: default_volume(),
            player_bin: default_player_bin(),
            reader_bin: default_reader_bin(),
        }
    }
}

impl Settings {
    /// Load settings from `config.json` in the data directory, falling back
    /// to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed. A
    /// malformed config is reported rather than silently replaced, so an
    /// operator typo does not flip the daemon to surprising defaults.
    pub fn load() -> Result<Self> {
        let path = get_data_dir()?.join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid JSON in config file at {}", path.display()))
    }
}
