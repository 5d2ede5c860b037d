//! Content-sniffed MIME classification.
//!
//! The sniffer layers three sources, first hit wins: an optional operator
//! overlay of custom magic prefixes, the built-in magic database, and a
//! plain-text/empty fallback. One label per invocation.

use crate::core::error::ConfigError;

use serde::Deserialize;
use std::path::Path;

/// Bytes examined by the printable-text fallback.
const TEXT_SAMPLE: usize = 1024;

/// One overlay entry as written in the `mime_db` document.
#[derive(Debug, Clone, Deserialize)]
struct OverlayEntry {
    /// Label to report on a prefix hit.
    mime: String,
    /// Leading bytes, hex-encoded.
    prefix: String,
}

#[derive(Debug, Clone)]
struct MagicPrefix {
    mime: String,
    prefix: Vec<u8>,
}

/// MIME sniffer producing one label per payload.
#[derive(Debug, Clone, Default)]
pub struct MimeSniffer {
    overlay: Vec<MagicPrefix>,
}

impl MimeSniffer {
    /// Creates a sniffer with no overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the sniffer, reading the overlay document when a path is given.
    pub fn load(mime_db: Option<&Path>) -> Result<Self, ConfigError> {
        match mime_db {
            Some(path) => Self::with_overlay(path),
            None => Ok(Self::new()),
        }
    }

    /// Loads a sniffer with the overlay document at `path`: a YAML list of
    /// `{ mime, prefix }` entries with hex-encoded prefixes, checked in
    /// order before the built-in magic database.
    pub fn with_overlay(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let entries: Vec<OverlayEntry> = serde_yaml::from_str(&raw).map_err(|e| {
            ConfigError::taste(format!("{}: {e}", path.display()))
        })?;

        let mut overlay = Vec::with_capacity(entries.len());
        for entry in entries {
            let prefix = decode_hex(&entry.prefix).map_err(|reason| {
                ConfigError::taste(format!("{}: prefix for '{}' {reason}", path.display(), entry.mime))
            })?;
            if prefix.is_empty() {
                return Err(ConfigError::taste(format!(
                    "{}: empty prefix for '{}'",
                    path.display(),
                    entry.mime
                )));
            }
            overlay.push(MagicPrefix {
                mime: entry.mime,
                prefix,
            });
        }

        Ok(Self { overlay })
    }

    /// Returns the number of overlay entries.
    pub fn overlay_len(&self) -> usize {
        self.overlay.len()
    }

    /// Sniffs one MIME label from the payload.
    pub fn sniff(&self, data: &[u8]) -> String {
        for magic in &self.overlay {
            if data.starts_with(&magic.prefix) {
                return magic.mime.clone();
            }
        }

        if let Some(kind) = infer::get(data) {
            return kind.mime_type().to_string();
        }

        if data.is_empty() {
            return "application/x-empty".to_string();
        }

        let printable = data
            .iter()
            .take(TEXT_SAMPLE)
            .all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace());
        if printable {
            "text/plain".to_string()
        } else {
            "application/octet-stream".to_string()
        }
    }
}

/// Decodes a hex string ("504b0304") into bytes.
fn decode_hex(hex: &str) -> Result<Vec<u8>, String> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err("has odd length".to_string());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| "is not valid hex".to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sniff_zip_magic() {
        let sniffer = MimeSniffer::new();
        // Minimal local-file-header magic is enough for the magic database.
        let mut data = b"PK\x03\x04".to_vec();
        data.extend_from_slice(&[0u8; 26]);
        assert_eq!(sniffer.sniff(&data), "application/zip");
    }

    #[test]
    fn test_sniff_text_and_empty() {
        let sniffer = MimeSniffer::new();
        assert_eq!(sniffer.sniff(b"hello world\n"), "text/plain");
        assert_eq!(sniffer.sniff(b""), "application/x-empty");
        assert_eq!(sniffer.sniff(&[0x00, 0x01, 0x02, 0xff]), "application/octet-stream");
    }

    #[test]
    fn test_sniff_is_idempotent() {
        let sniffer = MimeSniffer::new();
        let data = b"some plain text";
        assert_eq!(sniffer.sniff(data), sniffer.sniff(data));
    }

    #[test]
    fn test_overlay_wins_over_builtin() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "- mime: application/x-custom\n  prefix: \"504b0304\"").unwrap();

        let sniffer = MimeSniffer::with_overlay(tmp.path()).unwrap();
        assert_eq!(sniffer.overlay_len(), 1);

        let mut data = b"PK\x03\x04".to_vec();
        data.extend_from_slice(&[0u8; 26]);
        assert_eq!(sniffer.sniff(&data), "application/x-custom");
    }

    #[test]
    fn test_overlay_rejects_bad_hex() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "- mime: application/x-custom\n  prefix: \"zz\"").unwrap();

        assert!(matches!(
            MimeSniffer::with_overlay(tmp.path()),
            Err(ConfigError::Taste { .. })
        ));
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("504b"), Ok(vec![0x50, 0x4b]));
        assert!(decode_hex("504").is_err());
        assert!(decode_hex("gg").is_err());
    }
}
