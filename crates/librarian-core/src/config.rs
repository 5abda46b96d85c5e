//! Library configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/librarian/config.toml)
//! 3. Environment variables (LIBRARIAN_* prefix)
//!
//! Environment variables take precedence over config file values.
//! The resolved `Config` is passed explicitly to every component; nothing
//! in the core reads it from global state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
const ENV_PREFIX: &str = "LIBRARIAN";

/// Name of the canonical archive directory under the library root
pub const ARCHIVE_DIR: &str = "archive";
/// Name of the shelves tree under the library root
pub const SHELVES_DIR: &str = "shelves";
/// Name of the optional bookmarks tree under the library root
pub const BOOKMARKS_DIR: &str = "bookmarks";

/// Library configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the library (contains archive/, shelves/, bookmarks/)
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,

    /// Extension of the primary document in each entry
    #[serde(default = "default_document_ext")]
    pub document_ext: String,

    /// Extension of the metadata file in each entry
    #[serde(default = "default_metadata_ext")]
    pub metadata_ext: String,

    /// Log file path (optional, logs go to stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library_dir: default_library_dir(),
            document_ext: default_document_ext(),
            metadata_ext: default_metadata_ext(),
            log_file: None,
        }
    }
}

impl Config {
    /// Build a configuration rooted at a specific library directory
    pub fn for_library(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (LIBRARIAN_LIBRARY_DIR)
    /// 2. Config file (~/.config/librarian/config.toml or LIBRARIAN_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.expand_home();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.expand_home();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // LIBRARIAN_LIBRARY_DIR
        if let Ok(val) = std::env::var(format!("{}_LIBRARY_DIR", ENV_PREFIX)) {
            if !val.is_empty() {
                self.library_dir = PathBuf::from(val);
            }
        }
    }

    /// Expand a leading `~` in the library path
    fn expand_home(&mut self) {
        if let Ok(rest) = self.library_dir.strip_prefix("~") {
            if let Some(home) = dirs::home_dir() {
                self.library_dir = home.join(rest);
            }
        }
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with LIBRARIAN_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("librarian")
            .join("config.toml")
    }

    /// Directory holding one subdirectory per archived key
    pub fn archive_dir(&self) -> PathBuf {
        self.library_dir.join(ARCHIVE_DIR)
    }

    /// Root of the shelves tree
    pub fn shelves_dir(&self) -> PathBuf {
        self.library_dir.join(SHELVES_DIR)
    }

    /// Root of the bookmarks tree (may not exist yet)
    pub fn bookmarks_dir(&self) -> PathBuf {
        self.library_dir.join(BOOKMARKS_DIR)
    }

    /// Default roots scanned for links: shelves and bookmarks
    pub fn link_roots(&self) -> Vec<PathBuf> {
        vec![self.shelves_dir(), self.bookmarks_dir()]
    }
}

/// Get the default library directory
fn default_library_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("library")
}

fn default_document_ext() -> String {
    "pdf".to_string()
}

fn default_metadata_ext() -> String {
    "bib".to_string()
}
