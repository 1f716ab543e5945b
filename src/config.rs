/*!
 * Configuration types for EDL operations
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Validation mode determines how discovery reacts to findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Abort on the first validation error
    #[default]
    Strict,

    /// Collect all findings and return an annotated tree
    Lenient,
}

impl ValidationMode {
    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Lenient => "lenient",
        }
    }
}

impl std::str::FromStr for ValidationMode {
    type Err = crate::error::EdlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" => Ok(ValidationMode::Lenient),
            _ => Err(crate::error::EdlError::config(format!(
                "unknown validation mode: {} (expected strict or lenient)",
                s
            ))),
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Main configuration for discovery and conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdlConfig {
    /// Validation mode (strict or lenient)
    #[serde(default)]
    pub mode: ValidationMode,

    /// Verify data part checksums against their manifests
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    /// Number of part validation workers (values below 1 are clamped to 1)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Target schema identifier for conversions (e.g. "moseq")
    #[serde(default)]
    pub target_schema: Option<String>,

    /// Replace a non-empty conversion destination instead of refusing it
    #[serde(default)]
    pub overwrite: bool,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for EdlConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Strict,
            verify_checksums: true,
            worker_count: default_worker_count(),
            target_schema: None,
            overwrite: false,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_worker_count() -> usize {
    get_cpu_count()
}

impl EdlConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EdlConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &PathBuf) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Create a configuration that aborts on the first finding
    pub fn strict() -> Self {
        Self {
            mode: ValidationMode::Strict,
            ..Default::default()
        }
    }

    /// Create a configuration that collects every finding
    pub fn lenient() -> Self {
        Self {
            mode: ValidationMode::Lenient,
            ..Default::default()
        }
    }

    /// Set checksum verification
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Set the worker count
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Worker count with the lower bound applied
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count.max(1)
    }
}

/// Get the number of available CPU cores
fn get_cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
