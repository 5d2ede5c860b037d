//! Error types for the scanfleet worker.
//!
//! Errors are split by domain: `CoordinatorError` for queue/store I/O,
//! `ScanError` for plugin dispatch, `ConfigError` for startup, and
//! `WorkerError` for the per-request propagation policy. The library never
//! panics; all failure modes are returned as `Result` values.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the coordinator client.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The coordinator could not be reached or the connection dropped.
    #[error("coordinator unavailable: {message}")]
    Unavailable {
        /// Human-readable reason.
        message: String,
    },

    /// An I/O round-trip failed mid-operation.
    #[error("coordinator {op} failed: {message}")]
    Io {
        /// The operation that failed (e.g. "zpopmin", "lpop").
        op: &'static str,
        /// Error message from the underlying client.
        message: String,
    },

    /// The coordinator replied with something the worker cannot decode.
    #[error("unexpected coordinator reply for {op}: {detail}")]
    Protocol {
        /// The operation whose reply was malformed.
        op: &'static str,
        /// Details about the malformed reply.
        detail: String,
    },
}

impl CoordinatorError {
    /// Creates an `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an `Io` error for the given operation.
    pub fn io(op: &'static str, message: impl Into<String>) -> Self {
        Self::Io {
            op,
            message: message.into(),
        }
    }

    /// Creates a `Protocol` error for the given operation.
    pub fn protocol(op: &'static str, detail: impl Into<String>) -> Self {
        Self::Protocol {
            op,
            detail: detail.into(),
        }
    }
}

/// Errors raised while dispatching a single scanner plugin.
///
/// Everything except `Coordinator` is contained at the dispatch site: the
/// scanner is skipped, the event record simply omits its key, and the rest
/// of the request proceeds.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scanner name in config has no registered constructor.
    #[error("scanner '{scanner}' is not registered")]
    Missing {
        /// The unresolvable scanner name.
        scanner: String,
    },

    /// The payload could not be parsed by the scanner's format.
    #[error("scanner '{scanner}' rejected the payload: {reason}")]
    Malformed {
        /// Name of the rejecting scanner.
        scanner: String,
        /// What was wrong with the payload.
        reason: String,
    },

    /// The scanner raised an unhandled internal error.
    #[error("scanner '{scanner}' failed: {message}")]
    Fault {
        /// Name of the failing scanner.
        scanner: String,
        /// Error message from the scanner.
        message: String,
    },

    /// A coordinator round-trip inside the scanner failed.
    ///
    /// Unlike the other variants this one is request-fatal: per the
    /// propagation policy a coordinator fault abandons the request.
    #[error("coordinator fault inside scanner: {0}")]
    Coordinator(#[from] CoordinatorError),
}

impl ScanError {
    /// Creates a `Missing` error.
    pub fn missing(scanner: impl Into<String>) -> Self {
        Self::Missing {
            scanner: scanner.into(),
        }
    }

    /// Creates a `Malformed` error.
    pub fn malformed(scanner: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            scanner: scanner.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Fault` error.
    pub fn fault(scanner: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fault {
            scanner: scanner.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error must abandon the whole request.
    pub fn is_request_fatal(&self) -> bool {
        matches!(self, Self::Coordinator(_))
    }

    /// Returns the scanner name if this error is tied to one.
    pub fn scanner(&self) -> Option<&str> {
        match self {
            Self::Missing { scanner }
            | Self::Malformed { scanner, .. }
            | Self::Fault { scanner, .. } => Some(scanner),
            Self::Coordinator(_) => None,
        }
    }
}

/// Errors raised while loading and compiling configuration at startup.
///
/// All of these are fatal: the worker refuses to start on a config it
/// cannot fully compile.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config document (or a file it references) could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config document could not be parsed.
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// Path of the unparseable document.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A scanner mapping rule is invalid (e.g. a bad regex or options shape).
    #[error("invalid rule for scanner '{scanner}': {reason}")]
    Rule {
        /// Scanner whose mapping is invalid.
        scanner: String,
        /// Why the rule cannot be compiled.
        reason: String,
    },

    /// A tasting source (mime overlay or rule file) is invalid.
    #[error("invalid tasting source: {reason}")]
    Taste {
        /// Why the source cannot be compiled.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an `Io` error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a `Rule` error for the given scanner.
    pub fn rule(scanner: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rule {
            scanner: scanner.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Taste` error.
    pub fn taste(reason: impl Into<String>) -> Self {
        Self::Taste {
            reason: reason.into(),
        }
    }
}

/// Request-level errors surfaced out of the distributor.
///
/// Only these cross a request boundary; everything scanner-shaped is
/// contained lower down.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The request's wall-clock budget expired. The request is abandoned
    /// silently and no FIN terminator is emitted.
    #[error("request budget expired")]
    RequestTimeout,

    /// A single file node's distribution budget expired. Logged per node;
    /// the node's event may be lost while already-collected children still
    /// recurse.
    #[error("distribution budget expired for file '{uid}'")]
    DistributionTimeout {
        /// Uid of the file node whose distribution was cut short.
        uid: String,
    },

    /// A coordinator round-trip failed; the request is abandoned without
    /// FIN and the worker moves on.
    #[error("coordinator fault: {0}")]
    Coordinator(#[from] CoordinatorError),
}

impl WorkerError {
    /// Returns `true` for the quiet abandonment path (request timeout),
    /// which is logged at debug rather than error level.
    pub fn is_quiet(&self) -> bool {
        matches!(self, Self::RequestTimeout)
    }
}
