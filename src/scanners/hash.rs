//! Payload digests.
//!
//! BLAKE3 is the primary digest; SHA256 and MD5 are included for
//! compatibility with external intelligence systems keyed on them.

use crate::core::error::ScanError;
use crate::core::file::FileNode;
use crate::scanners::{FileScanner, Scanned, ScanOptions};

use async_trait::async_trait;
use md5::Md5;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Digest scanner.
#[derive(Debug, Clone, Default)]
pub struct ScanHash;

impl ScanHash {
    /// Creates the scanner.
    pub fn new() -> Self {
        Self
    }

    fn digests(data: &[u8]) -> (String, String, String) {
        let blake3 = blake3::hash(data).to_hex().to_string();
        let sha256 = format!("{:x}", Sha256::digest(data));
        let md5 = format!("{:x}", Md5::digest(data));
        (blake3, sha256, md5)
    }
}

#[async_trait]
impl FileScanner for ScanHash {
    fn name(&self) -> &'static str {
        "ScanHash"
    }

    async fn scan(
        &self,
        data: &[u8],
        _file: &FileNode,
        _options: &ScanOptions,
        _expire_at: i64,
    ) -> Result<Scanned, ScanError> {
        let (blake3, sha256, md5) = Self::digests(data);
        Ok(Scanned::output(json!({
            "blake3": blake3,
            "sha256": sha256,
            "md5": md5,
        })))
    }
}
