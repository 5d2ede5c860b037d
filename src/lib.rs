//! # Scanfleet backend worker
//!
//! The backend worker of a distributed file-scanning fleet. Workers share
//! a coordinator (a keyed in-memory store) with a front-end that enqueues
//! scan requests and reads back events. Each worker repeatedly claims a
//! request, drains the file bytes from the coordinator, classifies them,
//! dispatches the file through its assigned scanners, recursively
//! processes extracted child files, and writes structured events back
//! under the request's event key, terminated by `FIN`.
//!
//! ## Architecture
//!
//! - **coordinator**: queue and key/value operations over the shared store
//! - **tasting**: MIME sniffing plus a rule-based content matcher
//! - **assign**: positive/negative rule matching and priority ordering
//! - **scanners**: the plugin contract, built-in scanners, and the lazy
//!   registry keyed by verbatim config names
//! - **distribute**: one file through classification and dispatch; one
//!   request through depth-first traversal under nested timeouts
//! - **worker**: the lease/retirement loop driven by the binary
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use scanfleet::{BackendConfig, RedisCoordinator, Worker};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = BackendConfig::load("/etc/scanfleet/backend.yaml".as_ref())?;
//! let coordinator = Arc::new(RedisCoordinator::connect(&config.coordinator).await?);
//! let mut worker = Worker::from_config(config, coordinator)?;
//! worker.run().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod assign;
pub mod coordinator;
pub mod core;
pub mod distribute;
pub mod scanners;
pub mod tasting;
pub mod worker;

pub use crate::assign::{Assignment, RuleMatch, ScannerMapping, ScannerRule};
pub use crate::coordinator::{
    ArcCoordinator, Coordinator, MemoryCoordinator, RedisCoordinator, Task,
};
pub use crate::core::{
    BackendConfig, ConfigError, CoordinatorError, EventRecord, FileNode, FileRecord, Flavors,
    Limits, LogFormat, LoggingConfig, ScanError, TastingConfig, TreeRecord, WorkerError,
    DEFAULT_CONFIG_PATH, FIN,
};
pub use crate::distribute::Distributor;
pub use crate::scanners::{FileScanner, Scanned, ScanOptions, ScannerRegistry};
pub use crate::tasting::{MimeSniffer, RuleMatcher, Taste, Tasting};
pub use crate::worker::{retry_async, RetryConfig, Worker};
