//! Configuration file support for the trans-node bridging passes
//!
//! Settings can be loaded from a TOML file, either under a `[trans-bridge]`
//! section of a shared config or directly at the root:
//!
//! ```toml
//! [trans-bridge]
//! # Channel / fractal tile size of the target (default: 16)
//! tile_size = 16
//!
//! # Check control-edge conservation after every phase (default: true)
//! verify_control_edges = true
//!
//! # Fixpoint bound for the chain merge passes (default: 10)
//! max_merge_iterations = 10
//!
//! # Run the Cast/TransData reorder phase (default: true)
//! enable_reorder = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tile size used by channel-tiled and fractal formats unless a target overrides it
pub const DEFAULT_TILE_SIZE: i64 = 16;

/// Default fixpoint bound for the merge optimizer
pub const DEFAULT_MAX_MERGE_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RootConfig {
    #[serde(rename = "trans-bridge", skip_serializing_if = "Option::is_none")]
    pub trans_bridge: Option<TransConfigFile>,

    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub direct: Option<TransConfigFile>,
}

/// Raw settings as they appear in a config file
///
/// All fields are optional; [`TransConfigFile::resolve`] fills in defaults
/// and validates the result.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TransConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_control_edges: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_merge_iterations: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_reorder: Option<bool>,
}

impl TransConfigFile {
    /// Load settings from a TOML file, preferring the `[trans-bridge]` section
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::IoError(path.as_ref().to_path_buf(), e))?;

        let root: RootConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(path.as_ref().to_path_buf(), e))?;

        Ok(root.trans_bridge.or(root.direct).unwrap_or_default())
    }

    /// Save settings to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(path.as_ref().to_path_buf(), e))?;

        Ok(())
    }

    /// Apply defaults and validate
    pub fn resolve(&self) -> Result<TransConfig, ConfigError> {
        let config = TransConfig {
            tile_size: self.tile_size.unwrap_or(DEFAULT_TILE_SIZE),
            verify_control_edges: self.verify_control_edges.unwrap_or(true),
            max_merge_iterations: self.max_merge_iterations.unwrap_or(DEFAULT_MAX_MERGE_ITERATIONS),
            enable_reorder: self.enable_reorder.unwrap_or(true),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Resolved settings used by the passes
#[derive(Debug, Clone, PartialEq)]
pub struct TransConfig {
    /// Tile size of channel-tiled (C0) and fractal formats
    pub tile_size: i64,

    /// Check control-edge conservation after every phase
    pub verify_control_edges: bool,

    /// Fixpoint bound for the merge optimizer
    pub max_merge_iterations: usize,

    /// Run the Cast/TransData reorder phase
    pub enable_reorder: bool,
}

impl TransConfig {
    /// Load and resolve a config file in one step
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        TransConfigFile::load(path)?.resolve()
    }

    pub fn with_tile_size(mut self, tile_size: i64) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_reorder(mut self, enable: bool) -> Self {
        self.enable_reorder = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size < 1 {
            return Err(ConfigError::InvalidValue(format!(
                "tile_size must be positive, got {}",
                self.tile_size
            )));
        }
        if self.max_merge_iterations == 0 {
            return Err(ConfigError::InvalidValue("max_merge_iterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for TransConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            verify_control_edges: true,
            max_merge_iterations: DEFAULT_MAX_MERGE_ITERATIONS,
            enable_reorder: true,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, #[source] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, #[source] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[source] toml::ser::Error),

    /// A value is out of range
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_defaults() {
        let config = TransConfigFile::default().resolve().unwrap();
        assert_eq!(config, TransConfig::default());
        assert_eq!(config.tile_size, 16);
        assert!(config.verify_control_edges);
    }

    #[test]
    fn test_sectioned_format() {
        let file = write_config(
            r#"
            [other-tool]
            some_setting = "value"

            [trans-bridge]
            tile_size = 32
            enable_reorder = false
        "#,
        );

        let config = TransConfig::load(file.path()).unwrap();
        assert_eq!(config.tile_size, 32);
        assert!(!config.enable_reorder);
        assert_eq!(config.max_merge_iterations, DEFAULT_MAX_MERGE_ITERATIONS);
    }

    #[test]
    fn test_direct_format() {
        let file = write_config(
            r#"
            max_merge_iterations = 4
            verify_control_edges = false
        "#,
        );

        let config = TransConfig::load(file.path()).unwrap();
        assert_eq!(config.max_merge_iterations, 4);
        assert!(!config.verify_control_edges);
        assert_eq!(config.tile_size, DEFAULT_TILE_SIZE);
    }

    #[test]
    fn test_save_and_load() {
        let original = TransConfigFile {
            tile_size: Some(8),
            verify_control_edges: Some(true),
            max_merge_iterations: Some(3),
            enable_reorder: None,
        };

        let temp_file = NamedTempFile::new().unwrap();
        original.save(temp_file.path()).unwrap();

        let loaded = TransConfigFile::load(temp_file.path()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_invalid_values() {
        let file = write_config("tile_size = 0");
        assert!(matches!(TransConfig::load(file.path()), Err(ConfigError::InvalidValue(_))));

        let file = write_config("[trans-bridge]\nmax_merge_iterations = 0");
        assert!(matches!(TransConfig::load(file.path()), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let file = write_config("[trans-bridge]\ntile_size = \"sixteen\"");
        assert!(matches!(TransConfigFile::load(file.path()), Err(ConfigError::ParseError(..))));
    }

    #[test]
    fn test_missing_file() {
        let result = TransConfigFile::load("/nonexistent/trans-bridge.toml");
        assert!(matches!(result, Err(ConfigError::IoError(..))));
    }
}
