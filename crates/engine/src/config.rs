//! Cache configuration via `statecache.toml`
//!
//! A node keeps one config file next to its data. On first start a default
//! file is written; to change settings, edit the file and restart.

use serde::{Deserialize, Serialize};
use std::path::Path;

use statecache_core::{StateError, StateResult};
use statecache_storage::CacheMode;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "statecache.toml";

/// Cache configuration loaded from `statecache.toml`.
///
/// # Example
///
/// ```toml
/// # Cache mode: "exclusive" (default) or "shared"
/// mode = "exclusive"
///
/// # Enforce table authority lists on writes (default: true)
/// check_authority = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache mode: `"exclusive"` or `"shared"`.
    #[serde(default = "default_mode_str")]
    pub mode: String,
    /// Default for `AccessOptions::check` on writes issued through a block.
    #[serde(default = "default_check_authority")]
    pub check_authority: bool,
}

fn default_mode_str() -> String {
    CacheMode::Exclusive.as_str().to_string()
}

fn default_check_authority() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: default_mode_str(),
            check_authority: default_check_authority(),
        }
    }
}

impl CacheConfig {
    /// Config for the given mode with default settings otherwise
    pub fn with_mode(mode: CacheMode) -> Self {
        Self {
            mode: mode.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Parse the mode string into a `CacheMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"exclusive"` or `"shared"`.
    pub fn cache_mode(&self) -> StateResult<CacheMode> {
        self.mode.parse()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# statecache configuration
#
# Cache mode: "exclusive" (default) or "shared"
#   "exclusive" = one ordered map per table under a single lock;
#                 use when tables are executed by one thread at a time
#   "shared"    = sharded concurrent map per table;
#                 use when several execution threads touch one table
mode = "exclusive"

# Enforce table authority lists on writes (default: true)
check_authority = true
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> StateResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| {
            StateError::InvalidConfig(format!("config file '{}': {}", path.display(), e))
        })
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or names an unknown mode.
    pub fn from_toml(content: &str) -> StateResult<Self> {
        let config: CacheConfig =
            toml::from_str(content).map_err(|e| StateError::InvalidConfig(e.to_string()))?;
        // Validate the mode value eagerly
        config.cache_mode()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> StateResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> StateResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StateError::InvalidConfig(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
