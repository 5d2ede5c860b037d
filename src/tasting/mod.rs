//! Tasting: classification of raw bytes into flavor labels.
//!
//! Two independent classifiers run sequentially on every payload: the MIME
//! sniffer (one label) and the rule matcher (zero or more labels). Both are
//! built once at worker start and are pure with respect to the bytes.

mod mime;
mod rules;

pub use mime::MimeSniffer;
pub use rules::RuleMatcher;

use crate::core::config::TastingConfig;
use crate::core::error::ConfigError;

/// Labels produced by one tasting pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taste {
    /// MIME labels (currently always exactly one).
    pub mime: Vec<String>,

    /// Rule-matcher labels.
    pub rules: Vec<String>,
}

/// The classifier facade: both classifiers, built once.
#[derive(Debug)]
pub struct Tasting {
    mime: MimeSniffer,
    rules: RuleMatcher,
}

impl Tasting {
    /// Builds both classifiers from their configured sources.
    pub fn from_config(config: &TastingConfig) -> Result<Self, ConfigError> {
        let mime = MimeSniffer::load(config.mime_db.as_deref())?;
        let rules = match &config.yara_rules {
            Some(path) => RuleMatcher::load(path)?,
            None => RuleMatcher::empty(),
        };
        Ok(Self::new(mime, rules))
    }

    /// Assembles a tasting facade from prebuilt classifiers.
    pub fn new(mime: MimeSniffer, rules: RuleMatcher) -> Self {
        Self { mime, rules }
    }

    /// Classifies one payload.
    pub fn taste(&self, data: &[u8]) -> Taste {
        Taste {
            mime: vec![self.mime.sniff(data)],
            rules: self.rules.matches(data),
        }
    }
}
