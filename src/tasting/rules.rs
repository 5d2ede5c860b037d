//! Rule-based content matcher.
//!
//! Taste rules are byte-oriented regexes with a name; every rule whose
//! pattern matches the payload contributes its name as a flavor label. The
//! source is either a single rule file or a directory whose rule files are
//! each loaded as a distinct namespace (`namespace{i}`). Everything is
//! compiled once at worker start.

use crate::core::error::ConfigError;

use regex::bytes::{Regex, RegexBuilder};
use serde::Deserialize;
use std::path::Path;

/// One rule as written in a rule file.
#[derive(Debug, Clone, Deserialize)]
struct TasteRule {
    /// Label reported when the pattern matches.
    name: String,
    /// Byte-oriented regex applied to the whitespace-stripped payload.
    pattern: String,
}

#[derive(Debug)]
struct CompiledRule {
    namespace: String,
    name: String,
    pattern: Regex,
}

/// A compiled set of taste rules.
#[derive(Debug, Default)]
pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
}

impl RuleMatcher {
    /// Creates a matcher with no rules; every payload yields no labels.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads rules from `path`: a rule file, or a directory whose
    /// `*.yaml` / `*.yml` files are each compiled into their own namespace.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.is_dir() {
            let mut sources = Vec::new();
            for pattern in ["*.yaml", "*.yml"] {
                let joined = path.join(pattern);
                let glob_pattern = joined.to_string_lossy().into_owned();
                let paths = glob::glob(&glob_pattern)
                    .map_err(|e| ConfigError::taste(format!("{glob_pattern}: {e}")))?;
                for entry in paths {
                    let entry = entry.map_err(|e| ConfigError::taste(e.to_string()))?;
                    sources.push(entry);
                }
            }
            sources.sort();

            let mut matcher = Self::empty();
            for (index, source) in sources.iter().enumerate() {
                matcher.load_file(source, &format!("namespace{index}"))?;
            }
            Ok(matcher)
        } else {
            let mut matcher = Self::empty();
            matcher.load_file(path, "namespace0")?;
            Ok(matcher)
        }
    }

    /// Compiles one rule document into the given namespace.
    pub fn add_source(&mut self, raw: &str, namespace: &str) -> Result<(), ConfigError> {
        let rules: Vec<TasteRule> = serde_yaml::from_str(raw)
            .map_err(|e| ConfigError::taste(format!("{namespace}: {e}")))?;

        for rule in rules {
            let pattern = RegexBuilder::new(&rule.pattern)
                .unicode(false)
                .dot_matches_new_line(true)
                .build()
                .map_err(|e| {
                    ConfigError::taste(format!("{namespace}: rule '{}': {e}", rule.name))
                })?;
            self.rules.push(CompiledRule {
                namespace: namespace.to_string(),
                name: rule.name,
                pattern,
            });
        }
        Ok(())
    }

    fn load_file(&mut self, path: &Path, namespace: &str) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        self.add_source(&raw, namespace)
    }

    /// Returns the number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Returns the distinct namespaces in load order.
    pub fn namespaces(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            let namespace = rule.namespace.as_str();
            if !seen.contains(&namespace) {
                seen.push(namespace);
            }
        }
        seen
    }

    /// Matches the payload and returns the names of matching rules, in
    /// rule-load order with duplicates removed. Leading ASCII whitespace is
    /// stripped before matching.
    pub fn matches(&self, data: &[u8]) -> Vec<String> {
        let start = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(data.len());
        let stripped = &data[start..];

        let mut labels: Vec<String> = Vec::new();
        for rule in &self.rules {
            if rule.pattern.is_match(stripped) && !labels.contains(&rule.name) {
                labels.push(rule.name.clone());
            }
        }
        labels
    }
}
