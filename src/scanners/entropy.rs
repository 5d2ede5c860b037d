//! Shannon entropy of the payload.

use crate::core::error::ScanError;
use crate::core::file::FileNode;
use crate::scanners::{FileScanner, Scanned, ScanOptions};

use async_trait::async_trait;
use serde_json::json;

/// Entropy scanner. High entropy is a weak packed/encrypted signal.
#[derive(Debug, Clone, Default)]
pub struct ScanEntropy;

impl ScanEntropy {
    /// Creates the scanner.
    pub fn new() -> Self {
        Self
    }
}

/// Shannon entropy in bits per byte; 0.0 for an empty payload.
fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let len = data.len() as f64;
    counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

#[async_trait]
impl FileScanner for ScanEntropy {
    fn name(&self) -> &'static str {
        "ScanEntropy"
    }

    async fn scan(
        &self,
        data: &[u8],
        _file: &FileNode,
        _options: &ScanOptions,
        _expire_at: i64,
    ) -> Result<Scanned, ScanError> {
        Ok(Scanned::output(json!({ "entropy": shannon_entropy(data) })))
    }
}
