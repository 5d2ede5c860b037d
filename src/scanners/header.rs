//! Leading and trailing payload previews.

use crate::core::error::ScanError;
use crate::core::file::FileNode;
use crate::scanners::{FileScanner, Scanned, ScanOptions};

use async_trait::async_trait;
use serde_json::json;

/// Bytes previewed when the `length` option is absent.
const DEFAULT_LENGTH: usize = 50;

fn escaped(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Previews the leading `length` bytes of the payload.
#[derive(Debug, Clone, Default)]
pub struct ScanHeader;

impl ScanHeader {
    /// Creates the scanner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileScanner for ScanHeader {
    fn name(&self) -> &'static str {
        "ScanHeader"
    }

    async fn scan(
        &self,
        data: &[u8],
        _file: &FileNode,
        options: &ScanOptions,
        _expire_at: i64,
    ) -> Result<Scanned, ScanError> {
        let length = options.get_usize("length", DEFAULT_LENGTH);
        let head = &data[..length.min(data.len())];

        Ok(Scanned::output(json!({
            "header": escaped(head),
            "hex": hex(head),
        })))
    }
}

/// Previews the trailing `length` bytes of the payload.
#[derive(Debug, Clone, Default)]
pub struct ScanFooter;

impl ScanFooter {
    /// Creates the scanner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileScanner for ScanFooter {
    fn name(&self) -> &'static str {
        "ScanFooter"
    }

    async fn scan(
        &self,
        data: &[u8],
        _file: &FileNode,
        options: &ScanOptions,
        _expire_at: i64,
    ) -> Result<Scanned, ScanError> {
        let length = options.get_usize("length", DEFAULT_LENGTH);
        let tail = &data[data.len().saturating_sub(length)..];

        Ok(Scanned::output(json!({
            "footer": escaped(tail),
            "hex": hex(tail),
        })))
    }
}
