//! Configuration file handling.
//!
//! This module provides loading and saving of wpdetect configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/wpdetect/config.toml`
//! - macOS: `~/Library/Application Support/wpdetect/config.toml`
//! - Windows: `%APPDATA%\wpdetect\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! workers = 16
//! extension = "php"
//! default_format = "table"
//! fail_on_mismatch = false
//!
//! [ignore]
//! slugs = ["hello", "akismet*"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::detector::DEFAULT_WORKERS;
use crate::model::PluginRecord;
use crate::scanner::DEFAULT_EXTENSION;

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use wpdetect::Config;
///
/// // Load from file (or use defaults if file doesn't exist)
/// let config = Config::load().unwrap();
///
/// println!("Workers: {}", config.workers);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many candidate files may be open at once.
    ///
    /// Default: 16
    pub workers: usize,

    /// Extension of plugin source files, without the dot.
    ///
    /// Default: "php"
    pub extension: String,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// Exit with a non-zero code when any plugin has a version mismatch.
    ///
    /// Default: false
    pub fail_on_mismatch: bool,

    /// Plugins to leave out of reports.
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Configuration for hiding plugins from reports.
///
/// Detection itself is unaffected; only what the CLI prints is filtered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Plugin slugs to hide. Supports `*` wildcards (e.g. "woocommerce-*").
    pub slugs: Vec<String>,
}

impl IgnoreConfig {
    /// Check if a plugin slug should be hidden.
    pub fn should_ignore_slug(&self, slug: &str) -> bool {
        self.slugs.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, slug)
            } else {
                pattern == slug
            }
        })
    }

    /// Drops ignored records, keeping the rest in order.
    pub fn filter(&self, records: Vec<PluginRecord>) -> Vec<PluginRecord> {
        records
            .into_iter()
            .filter(|record| !self.should_ignore_slug(&record.slug))
            .collect()
    }
}

/// Matches a slug against a pattern where `*` stands for any run of
/// characters, including none.
fn glob_match(pattern: &str, slug: &str) -> bool {
    let Some((prefix, rest)) = pattern.split_once('*') else {
        return pattern == slug;
    };
    let Some(mut unmatched) = slug.strip_prefix(prefix) else {
        return false;
    };

    // `rest` always yields at least one piece; the last one anchors the end.
    let mut pieces: Vec<&str> = rest.split('*').collect();
    let suffix = pieces.pop().unwrap_or_default();

    for piece in pieces.into_iter().filter(|p| !p.is_empty()) {
        match unmatched.find(piece) {
            Some(at) => unmatched = &unmatched[at + piece.len()..],
            None => return false,
        }
    }
    unmatched.ends_with(suffix)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            extension: DEFAULT_EXTENSION.to_string(),
            default_format: "table".to_string(),
            fail_on_mismatch: false,
            ignore: IgnoreConfig::default(),
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
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wpdetect")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
