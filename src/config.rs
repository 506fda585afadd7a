//! Configuration file handling.
//!
//! This module provides loading and saving of imagemeta configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/imagemeta/config.toml`
//! - macOS: `~/Library/Application Support/imagemeta/config.toml`
//! - Windows: `%APPDATA%\imagemeta\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! label_key = "imagemeta.metadata"
//! exclude_paths = ["proc", "sys", "dev"]
//! rpm_command = "rpm"
//! default_format = "table"
//! tool_url = "https://crates.io/crates/imagemeta"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_TOOL_URL: &str = "https://crates.io/crates/imagemeta";

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use imagemeta::Config;
///
/// // Load from file (or use defaults if file doesn't exist)
/// let config = Config::load().unwrap();
///
/// println!("Label key: {}", config.label_key);
/// println!("Excluded: {:?}", config.exclude_paths);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Image config label that holds a previously embedded metadata record.
    ///
    /// Default: "imagemeta.metadata"
    pub label_key: String,

    /// Path prefixes inside the image that are never extracted.
    ///
    /// Default: empty
    pub exclude_paths: Vec<String>,

    /// Command used to query RPM databases.
    ///
    /// Default: "rpm"
    pub rpm_command: String,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// URL recorded in this tool's provenance entry.
    ///
    /// Default: "https://crates.io/crates/imagemeta"
    pub tool_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            label_key: "imagemeta.metadata".to_string(),
            exclude_paths: Vec::new(),
            rpm_command: "rpm".to_string(),
            default_format: "table".to_string(),
            tool_url: DEFAULT_TOOL_URL.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from an explicit path, defaulting when it is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Config(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| Error::Config(format!("cannot write {}: {}", path.display(), e)))
    }

    /// Returns the path to the configuration file.
    ///
    /// ```
    /// use imagemeta::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("imagemeta/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imagemeta")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
