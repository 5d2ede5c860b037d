//! Scanner plugins and their registry.
//!
//! A scanner receives the full payload bytes plus the file descriptor and
//! returns an opaque output document and any child files it extracted.
//! The registry is a static build-time mapping from the verbatim config
//! name to a constructor; instances are created lazily on first use and
//! cached for the worker's lifetime. An unresolvable name is a soft
//! failure at dispatch time, never a request failure.

mod breaker;
mod entropy;
mod hash;
mod header;
mod url;
mod zip;

pub use breaker::FaultBreaker;
pub use entropy::ScanEntropy;
pub use hash::ScanHash;
pub use header::{ScanFooter, ScanHeader};
pub use url::ScanUrl;
pub use zip::ScanZip;

use crate::coordinator::ArcCoordinator;
use crate::core::config::BackendConfig;
use crate::core::error::ScanError;
use crate::core::file::FileNode;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Opaque per-assignment options handed to a plugin.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions(Map<String, Value>);

impl ScanOptions {
    /// Wraps an options map.
    pub fn new(options: Map<String, Value>) -> Self {
        Self(options)
    }

    /// Returns the raw value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns an integer option, falling back to `default`.
    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    /// Returns a boolean option, falling back to `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }
}

impl From<Map<String, Value>> for ScanOptions {
    fn from(options: Map<String, Value>) -> Self {
        Self(options)
    }
}

/// What one scanner produced for one file.
#[derive(Debug, Clone, Default)]
pub struct Scanned {
    /// The scanner's output document, merged into the event's `scan` map
    /// under the scanner's name.
    pub output: Value,

    /// Child files the scanner extracted. Their bytes must already be
    /// staged in the coordinator under each child's pointer.
    pub children: Vec<FileNode>,
}

impl Scanned {
    /// Creates a result with an output document and no children.
    pub fn output(output: Value) -> Self {
        Self {
            output,
            children: Vec::new(),
        }
    }

    /// Attaches extracted children.
    pub fn with_children(mut self, children: Vec<FileNode>) -> Self {
        self.children = children;
        self
    }
}

/// The uniform scan contract every plugin implements.
///
/// Implementations must be `Send + Sync`, must never panic, and should
/// self-bound long work against `expire_at` (the absolute request
/// deadline, seconds since epoch).
#[async_trait]
pub trait FileScanner: Send + Sync + Debug {
    /// The registry name of this scanner, verbatim as written in config.
    fn name(&self) -> &'static str;

    /// Scans one payload.
    async fn scan(
        &self,
        data: &[u8],
        file: &FileNode,
        options: &ScanOptions,
        expire_at: i64,
    ) -> Result<Scanned, ScanError>;
}

/// An arc-wrapped scanner for shared ownership.
pub type ArcScanner = Arc<dyn FileScanner>;

/// Lazily instantiates and caches scanner plugins by name.
///
/// Owned exclusively by one worker; no synchronization needed.
#[derive(Debug)]
pub struct ScannerRegistry {
    #[allow(dead_code)]
    config: Arc<BackendConfig>,
    coordinator: ArcCoordinator,
    cache: HashMap<String, ArcScanner>,
}

impl ScannerRegistry {
    /// Creates a registry. Constructors receive the backend config and the
    /// coordinator; most built-ins need neither, extracting scanners need
    /// the coordinator to stage child payloads.
    pub fn new(config: Arc<BackendConfig>, coordinator: ArcCoordinator) -> Self {
        Self {
            config,
            coordinator,
            cache: HashMap::new(),
        }
    }

    /// Returns the live instance for a scanner name, constructing and
    /// caching it on first use.
    pub fn get(&mut self, name: &str) -> Result<ArcScanner, ScanError> {
        if let Some(scanner) = self.cache.get(name) {
            return Ok(Arc::clone(scanner));
        }

        let scanner = self
            .construct(name)
            .ok_or_else(|| ScanError::missing(name))?;
        tracing::debug!(scanner = name, "instantiated scanner");
        self.cache.insert(name.to_string(), Arc::clone(&scanner));
        Ok(scanner)
    }

    /// Returns how many instances are currently cached.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// The static name-to-constructor table. Names in config are these
    /// keys verbatim.
    fn construct(&self, name: &str) -> Option<ArcScanner> {
        let scanner: ArcScanner = match name {
            "ScanEntropy" => Arc::new(ScanEntropy::new()),
            "ScanFooter" => Arc::new(ScanFooter::new()),
            "ScanHash" => Arc::new(ScanHash::new()),
            "ScanHeader" => Arc::new(ScanHeader::new()),
            "ScanUrl" => Arc::new(ScanUrl::new()),
            "ScanZip" => Arc::new(ScanZip::new(Arc::clone(&self.coordinator))),
            _ => return None,
        };
        Some(scanner)
    }

    /// Seeds the cache with a prebuilt instance, bypassing the static
    /// table. Test hook for injecting synthetic scanners.
    #[cfg(test)]
    pub(crate) fn preload(&mut self, scanner: ArcScanner) {
        self.cache.insert(scanner.name().to_string(), scanner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::MemoryCoordinator;

    fn registry() -> ScannerRegistry {
        ScannerRegistry::new(
            Arc::new(BackendConfig::default()),
            Arc::new(MemoryCoordinator::new()),
        )
    }

    #[test]
    fn test_known_names_resolve() {
        let mut registry = registry();
        for name in ["ScanEntropy", "ScanFooter", "ScanHash", "ScanHeader", "ScanUrl", "ScanZip"] {
            let scanner = registry.get(name).unwrap();
            assert_eq!(scanner.name(), name);
        }
        assert_eq!(registry.cached(), 6);
    }

    #[test]
    fn test_unknown_name_is_soft_missing() {
        let mut registry = registry();
        let err = registry.get("ScanNope").unwrap_err();
        assert!(matches!(err, ScanError::Missing { .. }));
        assert_eq!(registry.cached(), 0);
    }

    #[test]
    fn test_instances_are_cached_and_reused() {
        let mut registry = registry();
        let first = registry.get("ScanHash").unwrap();
        let second = registry.get("ScanHash").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached(), 1);
    }

    #[test]
    fn test_scan_options_accessors() {
        let mut map = Map::new();
        map.insert("limit".into(), Value::from(7));
        map.insert("strict".into(), Value::from(true));
        let options = ScanOptions::new(map);

        assert_eq!(options.get_usize("limit", 100), 7);
        assert_eq!(options.get_usize("missing", 100), 100);
        assert!(options.get_bool("strict", false));
        assert!(options.get("limit").is_some());
    }
}
