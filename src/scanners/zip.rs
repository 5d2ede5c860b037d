//! ZIP archive expansion.
//!
//! Extracts archive entries as child files: each child's bytes are staged
//! in the coordinator under a fresh uid pointer stamped with the request
//! deadline, and the child node is handed back for recursive distribution.
//! Unreadable entries (including encrypted ones) are counted and skipped.

use crate::coordinator::{ArcCoordinator, Coordinator};
use crate::core::error::ScanError;
use crate::core::file::FileNode;
use crate::scanners::{FileScanner, Scanned, ScanOptions};

use async_trait::async_trait;
use serde_json::json;
use std::io::{Cursor, Read};

/// Entries extracted when the `limit` option is absent.
const DEFAULT_LIMIT: usize = 100;

/// Archive expansion scanner.
#[derive(Debug)]
pub struct ScanZip {
    coordinator: ArcCoordinator,
}

impl ScanZip {
    /// Creates the scanner. The coordinator is needed to stage the bytes
    /// of extracted children.
    pub fn new(coordinator: ArcCoordinator) -> Self {
        Self { coordinator }
    }
}

struct Expanded {
    total: usize,
    skipped: usize,
    entries: Vec<(String, Vec<u8>)>,
}

/// Reads up to `limit` file entries out of the archive. Synchronous on
/// purpose: archive handles borrow into the reader and must not be held
/// across await points.
fn expand(data: &[u8], limit: usize) -> Result<Expanded, ScanError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| ScanError::malformed("ScanZip", e.to_string()))?;

    let total = archive.len();
    let mut skipped = 0;
    let mut entries = Vec::new();

    for index in 0..total {
        if entries.len() >= limit {
            break;
        }

        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(index, error = %e, "skipping unreadable archive entry");
                skipped += 1;
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        let mut bytes = Vec::new();
        if let Err(e) = entry.read_to_end(&mut bytes) {
            tracing::debug!(index, error = %e, "skipping undecodable archive entry");
            skipped += 1;
            continue;
        }
        entries.push((entry.name().to_string(), bytes));
    }

    Ok(Expanded {
        total,
        skipped,
        entries,
    })
}

#[async_trait]
impl FileScanner for ScanZip {
    fn name(&self) -> &'static str {
        "ScanZip"
    }

    async fn scan(
        &self,
        data: &[u8],
        _file: &FileNode,
        options: &ScanOptions,
        expire_at: i64,
    ) -> Result<Scanned, ScanError> {
        let limit = options.get_usize("limit", DEFAULT_LIMIT);
        let expanded = expand(data, limit)?;

        let mut children = Vec::with_capacity(expanded.entries.len());
        for (name, bytes) in expanded.entries {
            let child = FileNode::extracted(self.name()).with_name(name);
            self.coordinator
                .push_bytes(&child.pointer, &bytes, expire_at)
                .await?;
            children.push(child);
        }

        Ok(Scanned::output(json!({
            "total": expanded.total,
            "extracted": children.len(),
            "skipped": expanded.skipped,
        }))
        .with_children(children))
    }
}
