//! URL extraction from raw payload bytes.

use crate::core::error::ScanError;
use crate::core::file::FileNode;
use crate::scanners::{FileScanner, Scanned, ScanOptions};

use async_trait::async_trait;
use regex::bytes::Regex;
use serde_json::json;

/// URLs reported when the `limit` option is absent.
const DEFAULT_LIMIT: usize = 100;

/// Extracts http/https URLs from the payload.
#[derive(Debug)]
pub struct ScanUrl {
    pattern: Regex,
}

impl Default for ScanUrl {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanUrl {
    /// Creates the scanner with its compiled pattern.
    pub fn new() -> Self {
        // Byte-oriented so it runs over binary payloads unchanged.
        let pattern = Regex::new(r#"https?://[^\s"'<>\\]+"#)
            .expect("url pattern is a valid regex");
        Self { pattern }
    }
}

#[async_trait]
impl FileScanner for ScanUrl {
    fn name(&self) -> &'static str {
        "ScanUrl"
    }

    async fn scan(
        &self,
        data: &[u8],
        _file: &FileNode,
        options: &ScanOptions,
        _expire_at: i64,
    ) -> Result<Scanned, ScanError> {
        let limit = options.get_usize("limit", DEFAULT_LIMIT);

        let mut urls: Vec<String> = Vec::new();
        for found in self.pattern.find_iter(data) {
            if urls.len() >= limit {
                break;
            }
            let url = String::from_utf8_lossy(found.as_bytes()).into_owned();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }

        Ok(Scanned::output(json!({
            "total": urls.len(),
            "urls": urls,
        })))
    }
}
