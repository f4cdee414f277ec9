//! Persistent user settings for Etchline
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux: `~/.config/etchline/etchline_config.toml`
//! - macOS: `~/Library/Application Support/etchline/etchline_config.toml`
//! - Windows: `%APPDATA%\etchline\etchline_config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! [write]
//! chunk_size = "1M"
//! block_size = 512
//! verify = true
//!
//! [weights]
//! checksum = 1.0
//! write = 8.0
//! verify = 4.0
//!
//! [behavior]
//! skip_confirmation = false
//! quiet = false
//! ```

use crate::config::{WriteConfig, DEFAULT_CHUNK_SIZE};
use crate::device::DEFAULT_SECTOR_SIZE;
use crate::error::{Error, Result};
use crate::procedure::{Action, Procedure, Step};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "etchline_config.toml";

/// Application name for config directory
const APP_NAME: &str = "etchline";

/// Default chunk size string
const DEFAULT_CHUNK_SIZE_STR: &str = "1M";

/// User settings loaded from configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Write operation settings
    pub write: WriteSettings,

    /// Relative progress weight of each step kind
    pub weights: WeightSettings,

    /// Behavior settings
    pub behavior: BehaviorSettings,
}

/// Settings for write operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WriteSettings {
    /// Target chunk size (e.g., "1M", "512K")
    pub chunk_size: String,

    /// Device sector size in bytes
    pub block_size: usize,

    /// Whether to read the device back after writing
    pub verify: bool,
}

/// Progress weights used when building a procedure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeightSettings {
    /// Weight of the image checksum step
    pub checksum: f64,

    /// Weight of the write step
    pub write: f64,

    /// Weight of the read-back step
    pub verify: f64,
}

/// General behavior settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorSettings {
    /// Whether to skip confirmation prompts by default
    pub skip_confirmation: bool,

    /// Whether to suppress non-error output
    pub quiet: bool,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE_STR.to_string(),
            block_size: DEFAULT_SECTOR_SIZE,
            verify: true,
        }
    }
}

impl Default for WeightSettings {
    fn default() -> Self {
        Self {
            checksum: 1.0,
            write: 8.0,
            verify: 4.0,
        }
    }
}

impl WriteSettings {
    /// Writer configuration for these settings
    ///
    /// An unparseable chunk size falls back to the default.
    pub fn write_config(&self) -> WriteConfig {
        let chunk_size = parse_size(&self.chunk_size).unwrap_or_else(|e| {
            tracing::warn!("{}, using {}", e, DEFAULT_CHUNK_SIZE_STR);
            DEFAULT_CHUNK_SIZE
        });
        WriteConfig::new().chunk_size(chunk_size)
    }
}

impl WeightSettings {
    /// Build the procedure for a write job
    ///
    /// The checksum step runs first when `checksum` is given; the read-back
    /// step runs last when `verify` is set.
    pub fn write_procedure(&self, checksum: Option<&str>, verify: bool) -> Result<Procedure> {
        let mut steps = Vec::with_capacity(3);
        if let Some(expected) = checksum {
            steps.push(Step::new(
                Action::VerifySourceChecksum {
                    expected: expected.to_string(),
                },
                self.checksum,
            ));
        }
        steps.push(Step::new(Action::WriteImage, self.write));
        if verify {
            steps.push(Step::new(Action::VerifyImage, self.verify));
        }
        Procedure::new(steps)
    }

    /// Build the single-step procedure for a read-back job
    pub fn verify_procedure(&self) -> Result<Procedure> {
        Procedure::new(vec![Step::new(Action::VerifyImage, self.verify)])
    }
}

impl Settings {
    /// Load settings from a specific path
    ///
    /// Returns default settings if the file doesn't exist or can't be parsed
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => {
                    tracing::debug!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save settings to a specific path
    pub fn save_to_path(&self, path: Option<PathBuf>) -> std::result::Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        std::fs::write(&path, contents).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE_NAME))
    }

    /// Get the path to the configuration directory
    pub fn config_dir() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME))
    }

    /// Generate a default configuration file content as a string
    pub fn default_config_string() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate default config"))
    }
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read or write config file
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),
}

/// Parse a size string like "512", "64K", "1M" or "2G"
///
/// Suffixes are binary (K = 1024) and case-insensitive.
pub fn parse_size(s: &str) -> Result<usize> {
    let s = s.trim().to_uppercase();
    let invalid = || Error::InvalidConfig(format!("Invalid size: {}", s));

    let (num_str, multiplier) = match s.as_bytes().last() {
        Some(b'K') => (&s[..s.len() - 1], 1024),
        Some(b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s.as_str(), 1),
    };

    let num: usize = num_str.trim().parse().map_err(|_| invalid())?;
    let size = num.checked_mul(multiplier).ok_or_else(invalid)?;
    if size == 0 {
        return Err(Error::InvalidConfig("Size must be positive".to_string()));
    }
    Ok(size)
}
