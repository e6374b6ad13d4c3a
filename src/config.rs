//! Caster configuration
//!
//! Loaded from an optional YAML file; command-line flags override the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default memory tier capacity: 500 MiB
pub const DEFAULT_CAPACITY_BYTES: u64 = 500 * 1024 * 1024;

/// Directory name under the platform cache directory
const CACHE_DIR_NAME: &str = "caster-core";

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CasterConfig {
    /// Disk tier root directory
    pub cache_dir: PathBuf,
    /// Memory tier capacity in bytes
    pub capacity_bytes: u64,
}

impl Default for CasterConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
        }
    }
}

impl CasterConfig {
    /// Configuration rooted at `cache_dir` with the default capacity
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_capacity(mut self, capacity_bytes: u64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    /// Parse a YAML document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_yaml(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity_bytes == 0 {
            return Err(Error::Config("capacity_bytes must be greater than zero".into()));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("cache_dir must not be empty".into()));
        }
        Ok(())
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_DIR_NAME)
}
