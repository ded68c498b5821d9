//! Configuration for playdeck.
//!
//! Loaded from `~/.playdeck/config.toml`. Every section is optional:
//!
//! ```toml
//! log_level = "info"
//!
//! [decoder]
//! program = "mpg123"
//! args = ["-R"]
//! # Lines starting with this prefix are redundant frames and are dropped
//! redundant_prefix = "@@"
//!
//! [display]
//! color = true
//! cursor = "invisible"   # invisible, normal, very-visible
//!
//! [styles.status]
//! fg = "white"
//! bg = "blue"
//! attrs = ["bold"]
//! ```
//!
//! Colors are names (`black` .. `white`, `default`), palette indexes
//! (`0`..`255`) or `#rrggbb`. Attributes are `standout`, `underline`,
//! `reverse`, `blink`, `dim`, `bold`, `altcharset`, `invisible`, `protect`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::decoder::channel::DEFAULT_REDUNDANT_PREFIX;
use crate::term::{Attr, Color, CursorVisibility};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write config: {0}")]
    Write(String),

    #[error("unknown color '{0}'")]
    Color(String),

    #[error("unknown attribute '{0}'")]
    Attribute(String),

    #[error("unknown cursor mode '{0}'")]
    Cursor(String),
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// tracing filter used when `PLAYDECK_LOG` is unset
    pub log_level: String,
    pub decoder: DecoderConfig,
    pub display: DisplayConfig,
    pub styles: StylesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            decoder: DecoderConfig::default(),
            display: DisplayConfig::default(),
            styles: StylesConfig::default(),
        }
    }
}

/// Decoder process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub program: String,
    pub args: Vec<String>,
    pub redundant_prefix: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: "mpg123".to_string(),
            args: vec!["-R".to_string()],
            redundant_prefix: DEFAULT_REDUNDANT_PREFIX.to_string(),
        }
    }
}

/// Terminal display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub color: bool,
    pub cursor: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            cursor: "invisible".to_string(),
        }
    }
}

impl DisplayConfig {
    pub fn cursor_mode(&self) -> Result<CursorVisibility, ConfigError> {
        CursorVisibility::parse(&self.cursor).ok_or_else(|| ConfigError::Cursor(self.cursor.clone()))
    }
}

/// One styled role: colors plus attribute names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub fg: String,
    pub bg: String,
    pub attrs: Vec<String>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self::new("default", "default", &[])
    }
}

impl StyleConfig {
    fn new(fg: &str, bg: &str, attrs: &[&str]) -> Self {
        Self {
            fg: fg.to_string(),
            bg: bg.to_string(),
            attrs: attrs.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Resolve to (foreground, background, attributes).
    pub fn resolve(&self) -> Result<(Color, Color, Attr), ConfigError> {
        let fg = Color::parse(&self.fg).ok_or_else(|| ConfigError::Color(self.fg.clone()))?;
        let bg = Color::parse(&self.bg).ok_or_else(|| ConfigError::Color(self.bg.clone()))?;
        let attr = Attr::from_names(&self.attrs).map_err(ConfigError::Attribute)?;
        Ok((fg, bg, attr))
    }
}

/// Styles for the status view roles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    pub title: StyleConfig,
    pub status: StyleConfig,
    pub help: StyleConfig,
    pub error: StyleConfig,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            title: StyleConfig::new("black", "cyan", &["bold"]),
            status: StyleConfig::new("white", "blue", &[]),
            help: StyleConfig::new("default", "default", &["dim"]),
            error: StyleConfig::new("red", "default", &["bold"]),
        }
    }
}

impl Config {
    /// Load configuration, falling back to defaults on any problem.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(Self::get_config_path) {
            Some(path) => path,
            None => return Self::default(),
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to `path`, or the default location
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::get_config_path)
            .ok_or_else(|| ConfigError::Write("could not determine config path".to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write(e.to_string()))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Write(e.to_string()))?;
        fs::write(&path, content).map_err(|e| ConfigError::Write(e.to_string()))?;
        Ok(path)
    }

    /// Directory holding config and log files
    pub fn data_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".playdeck"))
    }

    fn get_config_path() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("config.toml"))
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
