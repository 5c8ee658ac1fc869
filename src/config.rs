//! Configuration file parser for ~/.config/feedmend/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored with a warning so a typo never stops a run, but
//! values that would only fail later (an unknown `sort_by` field, a broken
//! `date_format`) are rejected here.
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::{ItemField, UnknownFieldError};
use crate::render::{OutputFormat, RenderOptions, DEFAULT_DATE_FORMAT};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid sort_by in config file: {0}")]
    UnknownField(#[from] UnknownFieldError),

    #[error("Invalid date_format in config file: {0:?}")]
    InvalidDateFormat(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output format: "text", "html", "json" or "summary".
    pub format: OutputFormat,

    /// Maximum number of items rendered. 0 = all.
    pub limit: usize,

    /// Item field name to sort by; unset keeps document order.
    pub sort_by: Option<String>,

    /// strftime layout for item dates.
    pub date_format: String,

    /// Item content is cut after this many characters. 0 = unlimited.
    pub max_content_length: usize,

    /// Strip tags from item content.
    pub no_html: bool,

    /// Where fetched feeds are cached. Defaults to a directory under the
    /// system temp dir.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            limit: 0,
            sort_by: None,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            max_content_length: 0,
            no_html: false,
            cache_dir: None,
        }
    }
}

const KNOWN_KEYS: [&str; 7] = [
    "format",
    "limit",
    "sort_by",
    "date_format",
    "max_content_length",
    "no_html",
    "cache_dir",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Default config location, `$HOME/.config/feedmend/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".config").join("feedmend").join("config.toml"))
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Unknown `sort_by` or invalid `date_format` → error
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never loaded
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), format = ?config.format, "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.sort_field()?;
        if !is_valid_date_format(&config.date_format) {
            return Err(ConfigError::InvalidDateFormat(config.date_format));
        }
        Ok(config)
    }

    /// The configured sort field, parsed.
    pub fn sort_field(&self) -> Result<Option<ItemField>, UnknownFieldError> {
        self.sort_by.as_deref().map(str::parse).transpose()
    }

    /// Cache directory for fetched feeds.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("feedmend-cache"))
    }

    /// Render options as configured.
    pub fn render_options(&self) -> Result<RenderOptions, UnknownFieldError> {
        Ok(RenderOptions {
            date_format: self.date_format.clone(),
            max_content_length: self.max_content_length,
            no_html: self.no_html,
            limit: self.limit,
            sort_by: self.sort_field()?,
        })
    }
}

/// True if every strftime specifier in `layout` is one chrono understands.
pub fn is_valid_date_format(layout: &str) -> bool {
    !StrftimeItems::new(layout).any(|item| matches!(item, Item::Error))
}

// ============================================================================
// Tests
// ============================================================================
