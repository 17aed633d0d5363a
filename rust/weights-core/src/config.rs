// rust/weights-core/src/config.rs

//! Configuration management for the weight converter.
//!
//! Configuration is read from TOML files, optionally overridden by `WGT_`
//! environment variables, and validated before a conversion starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConvertError, Result};

// Top-level converter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub storage: StorageConfig,
    pub output: OutputConfig,
    pub naming: NamingConfig,
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Buffer size in bytes for buffered writes.
    pub buffer_size: usize,
    // Whether to memory-map the source checkpoint instead of reading it.
    pub use_mmap: bool,
}

/// What to do when two source tensors resolve to the same output name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Abort the run.
    #[default]
    Error,
    /// Log a warning and let the last write win.
    Warn,
}

impl FromStr for CollisionPolicy {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            other => Err(ConvertError::config(format!(
                "output.on_collision must be one of: error, warn (got '{other}')"
            ))),
        }
    }
}

// Output configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    // Directory that receives the .bin files.
    pub dir: PathBuf,
    // Whether to use atomic writes (write to temp then rename).
    pub atomic_writes: bool,
    /// Policy for output names written twice in one run.
    pub on_collision: CollisionPolicy,
}

/// Naming rules applied to raw checkpoint keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Prefix of transformer block keys, as in `h.3.mlp.c_fc.weight`.
    pub block_prefix: String,
    /// Prefix removed from every raw key before parsing (e.g. `transformer.`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<String>,
    /// Extra field mappings, layered over the built-in table.
    pub map: BTreeMap<String, String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024 * 1024, // 1 MB
            use_mmap: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./weights"),
            atomic_writes: true,
            on_collision: CollisionPolicy::Error,
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            block_prefix: "h".to_string(),
            strip_prefix: None,
            map: BTreeMap::new(),
        }
    }
}

impl FromStr for ConverterConfig {
    type Err = ConvertError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ConvertError::config_with_source("failed to parse TOML config", e))
    }
}

impl ConverterConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::config_with_source(
                format!("failed to read config file {}", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Load the configuration for a run: the given file (or the defaults),
    // then environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `WGT_` and use underscores to separate
    // nested fields:
    // - `WGT_OUTPUT_DIR` overrides `output.dir`
    // - `WGT_OUTPUT_ON_COLLISION` overrides `output.on_collision`
    // - `WGT_NAMING_BLOCK_PREFIX` overrides `naming.block_prefix`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("WGT_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("WGT_STORAGE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.storage.use_mmap = v;
            }
        }

        if let Ok(val) = std::env::var("WGT_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("WGT_OUTPUT_ATOMIC_WRITES") {
            if let Ok(v) = val.parse() {
                self.output.atomic_writes = v;
            }
        }
        if let Ok(val) = std::env::var("WGT_OUTPUT_ON_COLLISION") {
            if let Ok(v) = val.parse() {
                self.output.on_collision = v;
            }
        }

        if let Ok(val) = std::env::var("WGT_NAMING_BLOCK_PREFIX") {
            self.naming.block_prefix = val;
        }
        if let Ok(val) = std::env::var("WGT_NAMING_STRIP_PREFIX") {
            self.naming.strip_prefix = Some(val);
        }

        self
    }

    // Validate all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(ConvertError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        if self.output.dir.as_os_str().is_empty() {
            return Err(ConvertError::config("output.dir must not be empty"));
        }

        if self.naming.block_prefix.is_empty() {
            return Err(ConvertError::config(
                "naming.block_prefix must not be empty",
            ));
        }

        for (from, to) in &self.naming.map {
            if from.is_empty() || to.is_empty() {
                return Err(ConvertError::config(
                    "naming.map entries must have non-empty keys and values",
                ));
            }
            if to.contains('/') || to.contains('\\') {
                return Err(ConvertError::config(format!(
                    "naming.map value '{to}' must not contain path separators"
                )));
            }
        }

        Ok(())
    }
}
