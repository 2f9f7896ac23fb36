//! Engine configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Smallest block the adaptive copy loop will transfer between syncs.
pub const DEFAULT_MIN_BLOCK_SIZE: usize = 1024 * 1024;

/// Number of directory entries emitted per enumeration step.
pub const DEFAULT_BATCH_SIZE: usize = 75;

/// Configuration shared by every engine operation.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    /// Starting (and minimum) block size of the adaptive copy loop.
    #[builder(default = "DEFAULT_MIN_BLOCK_SIZE")]
    #[serde(default = "default_min_block_size")]
    pub min_block_size: usize,

    /// Entries per directory enumeration batch.
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Include dotfiles when enumerating directories.
    #[builder(default = "false")]
    #[serde(default)]
    pub show_hidden: bool,

    /// Explicit home trash location (None = resolve from the environment).
    #[builder(default)]
    #[serde(default)]
    pub home_trash: Option<PathBuf>,

    /// Running inside a sandbox where trashing must go through the host.
    #[builder(default = "false")]
    #[serde(default)]
    pub sandboxed: bool,

    /// Sync the destination directory after each top-level entry.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub sync_directories: bool,
}

fn default_true() -> bool {
    true
}

fn default_min_block_size() -> usize {
    DEFAULT_MIN_BLOCK_SIZE
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.min_block_size == Some(0) {
            return Err("Block size must be greater than zero".to_string());
        }
        if self.batch_size == Some(0) {
            return Err("Batch size must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Create a new engine config builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Config with the sandbox flag detected from the running environment.
    pub fn detect() -> Self {
        Self {
            sandboxed: is_sandboxed(),
            ..Self::default()
        }
    }

    /// Check if a directory entry should be skipped as hidden.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.show_hidden && name.starts_with('.')
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_block_size: DEFAULT_MIN_BLOCK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            show_hidden: false,
            home_trash: None,
            sandboxed: false,
            sync_directories: true,
        }
    }
}

/// Whether the process runs inside a flatpak sandbox.
pub fn is_sandboxed() -> bool {
    std::path::Path::new("/.flatpak-info").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::builder()
            .min_block_size(4096usize)
            .batch_size(10usize)
            .show_hidden(true)
            .build()
            .unwrap();

        assert_eq!(config.min_block_size, 4096);
        assert_eq!(config.batch_size, 10);
        assert!(config.show_hidden);
        assert!(config.sync_directories);
        assert!(config.home_trash.is_none());
    }

    #[test]
    fn test_config_rejects_zero_sizes() {
        assert!(EngineConfig::builder().min_block_size(0usize).build().is_err());
        assert!(EngineConfig::builder().batch_size(0usize).build().is_err());
    }

    #[test]
    fn test_should_skip_hidden() {
        let mut config = EngineConfig::default();

        assert!(config.should_skip_hidden(".git"));
        assert!(!config.should_skip_hidden("src"));

        config.show_hidden = true;
        assert!(!config.should_skip_hidden(".git"));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"show_hidden": true}"#).unwrap();
        assert!(config.show_hidden);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.min_block_size, DEFAULT_MIN_BLOCK_SIZE);
        assert!(config.sync_directories);
    }
}
