//! Core types shared across the worker: config, errors, file nodes, and
//! event records.

pub mod config;
pub mod error;
pub mod event;
pub mod file;

pub use config::{
    BackendConfig, CoordinatorConfig, Limits, LogFormat, LoggingConfig, TastingConfig,
    DEFAULT_CONFIG_PATH,
};
pub use error::{ConfigError, CoordinatorError, ScanError, WorkerError};
pub use event::{EventRecord, FileRecord, TreeRecord, FIN};
pub use file::{FileNode, Flavors};
