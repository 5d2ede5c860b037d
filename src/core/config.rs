//! The backend config document.
//!
//! A worker is configured by one YAML document (default
//! `/etc/scanfleet/backend.yaml`) naming the coordinator, the retirement
//! and timeout budgets, the tasting sources, and the scanner mappings.
//! Everything is compiled at startup; a config that cannot be fully
//! compiled refuses to start the worker.

use crate::assign::ScannerRule;
use crate::core::error::ConfigError;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fallback config path used when `--worker-config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/scanfleet/backend.yaml";

/// Address and database of the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// `host:port` of the coordinator.
    pub addr: String,

    /// Logical database index.
    pub db: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            db: 0,
        }
    }
}

impl CoordinatorConfig {
    /// Returns the connection URL for the configured coordinator.
    pub fn url(&self) -> String {
        format!("redis://{}/{}", self.addr, self.db)
    }
}

/// Retirement and timeout budgets.
///
/// `max_files` and `time_to_live` bound the worker's lifetime (it retires
/// when either is exhausted, to be restarted by a supervisor); `max_depth`
/// and `distribution` bound a single request's traversal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Requests handled before the worker retires.
    pub max_files: u64,

    /// Seconds the worker runs before it retires.
    pub time_to_live: u64,

    /// Maximum file-node depth; deeper nodes are silently skipped.
    pub max_depth: u32,

    /// Per-file distribution budget, in seconds.
    pub distribution: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_files: 5000,
            time_to_live: 900,
            max_depth: 15,
            distribution: 600,
        }
    }
}

impl Limits {
    /// The worker lifetime budget as a `Duration`.
    pub fn time_to_live(&self) -> Duration {
        Duration::from_secs(self.time_to_live)
    }

    /// The per-file distribution budget as a `Duration`.
    pub fn distribution(&self) -> Duration {
        Duration::from_secs(self.distribution)
    }
}

/// Paths to the tasting (classification) sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TastingConfig {
    /// Optional overlay of custom magic prefixes layered over the built-in
    /// MIME database.
    pub mime_db: Option<PathBuf>,

    /// One rule file, or a directory whose rule files are each loaded as a
    /// distinct namespace.
    pub yara_rules: Option<PathBuf>,
}

/// Output format for worker logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable line format.
    Plain,
    /// One JSON document per line.
    Json,
}

/// Logging configuration, loaded from the `logging_cfg` path if present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Whether to colorize plain output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "scanfleet=info".to_string(),
            format: LogFormat::Plain,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Loads a logging config document from a path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// The complete backend config document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Coordinator address and database.
    pub coordinator: CoordinatorConfig,

    /// Optional path to a logging config document.
    pub logging_cfg: Option<PathBuf>,

    /// Retirement and timeout budgets.
    pub limits: Limits,

    /// Tasting source paths.
    pub tasting: TastingConfig,

    /// Scanner mappings: scanner name to its ordered rule list. Insertion
    /// order is preserved; it breaks priority ties at assignment time.
    pub scanners: IndexMap<String, Vec<ScannerRule>>,
}

impl BackendConfig {
    /// Loads and parses the backend config document at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Resolves the logging configuration, reading `logging_cfg` when set
    /// and falling back to defaults otherwise.
    pub fn logging(&self) -> Result<LoggingConfig, ConfigError> {
        match &self.logging_cfg {
            Some(path) => LoggingConfig::load(path),
            None => Ok(LoggingConfig::default()),
        }
    }
}
