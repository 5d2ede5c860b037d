//! The assignment engine: which scanners run on which file.
//!
//! Each scanner name in config carries an ordered rule list. Rules are
//! evaluated in configured order against a file's flavors, name, and
//! source; the first rule that produces an assignment wins. Negative
//! matchers veto: a negative hit on any rule disqualifies the scanner
//! outright and later rules are never consulted, while a positive miss
//! merely advances to the next rule. That asymmetry is load-bearing.
//!
//! Assignments collected across all scanners are sorted by priority
//! descending; ties keep configured order (the sort is stable).

use crate::core::error::ConfigError;
use crate::core::file::FileNode;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Reverse;

/// Default rule priority when the config omits one.
pub const DEFAULT_PRIORITY: i32 = 5;

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// One side (positive or negative) of a rule, as written in config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleMatch {
    /// Flavor labels to match. The wildcard `*` (positive side only)
    /// matches every file.
    pub flavors: Vec<String>,

    /// Regex matched against the file's name.
    pub filename: Option<String>,

    /// Regex matched against the file's source label.
    pub source: Option<String>,
}

/// One scanner rule, as written in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerRule {
    /// Matchers that assign the scanner.
    pub positive: Option<RuleMatch>,

    /// Matchers that veto the scanner outright.
    pub negative: Option<RuleMatch>,

    /// Assignment priority; higher runs earlier.
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Opaque options handed to the plugin on dispatch.
    #[serde(default)]
    pub options: Value,
}

impl Default for ScannerRule {
    fn default() -> Self {
        Self {
            positive: None,
            negative: None,
            priority: DEFAULT_PRIORITY,
            options: Value::Null,
        }
    }
}

/// The decision to run one scanner on one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Scanner name, verbatim from config.
    pub name: String,

    /// Priority of the matching rule.
    pub priority: i32,

    /// Options of the matching rule.
    pub options: Map<String, Value>,
}

#[derive(Debug)]
struct CompiledMatch {
    flavors: Vec<String>,
    filename: Option<Regex>,
    source: Option<Regex>,
}

impl CompiledMatch {
    fn compile(raw: &RuleMatch, scanner: &str) -> Result<Self, ConfigError> {
        let filename = raw
            .filename
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ConfigError::rule(scanner, format!("filename regex: {e}")))?;
        let source = raw
            .source
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ConfigError::rule(scanner, format!("source regex: {e}")))?;

        Ok(Self {
            flavors: raw.flavors.clone(),
            filename,
            source,
        })
    }

    /// Evaluates this matcher. `wildcard` enables the `*` flavor (positive
    /// side only).
    fn hits(&self, flavors: &[String], name: Option<&str>, source: Option<&str>, wildcard: bool) -> bool {
        if self
            .flavors
            .iter()
            .any(|f| (wildcard && f == "*") || flavors.iter().any(|have| have == f))
        {
            return true;
        }
        if let (Some(regex), Some(name)) = (&self.filename, name) {
            if regex.is_match(name) {
                return true;
            }
        }
        if let (Some(regex), Some(source)) = (&self.source, source) {
            if regex.is_match(source) {
                return true;
            }
        }
        false
    }
}

#[derive(Debug)]
struct CompiledRule {
    positive: Option<CompiledMatch>,
    negative: Option<CompiledMatch>,
    priority: i32,
    options: Map<String, Value>,
}

/// The compiled rule list of one configured scanner.
#[derive(Debug)]
pub struct ScannerMapping {
    name: String,
    rules: Vec<CompiledRule>,
}

impl ScannerMapping {
    /// Compiles one scanner's rule list.
    pub fn compile(name: &str, rules: &[ScannerRule]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let options = match &rule.options {
                Value::Null => Map::new(),
                Value::Object(map) => map.clone(),
                other => {
                    return Err(ConfigError::rule(
                        name,
                        format!("options must be a mapping, got {other}"),
                    ))
                }
            };
            compiled.push(CompiledRule {
                positive: rule
                    .positive
                    .as_ref()
                    .map(|m| CompiledMatch::compile(m, name))
                    .transpose()?,
                negative: rule
                    .negative
                    .as_ref()
                    .map(|m| CompiledMatch::compile(m, name))
                    .transpose()?,
                priority: rule.priority,
                options,
            });
        }

        Ok(Self {
            name: name.to_string(),
            rules: compiled,
        })
    }

    /// Returns the scanner name this mapping belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the rule list against a file and returns the assignment,
    /// if any.
    pub fn assign(
        &self,
        flavors: &[String],
        name: Option<&str>,
        source: Option<&str>,
    ) -> Option<Assignment> {
        for rule in &self.rules {
            // A negative hit disqualifies the scanner outright; later
            // rules are not consulted.
            if let Some(negative) = &rule.negative {
                if negative.hits(flavors, name, source, false) {
                    return None;
                }
            }

            if let Some(positive) = &rule.positive {
                if positive.hits(flavors, name, source, true) {
                    return Some(Assignment {
                        name: self.name.clone(),
                        priority: rule.priority,
                        options: rule.options.clone(),
                    });
                }
            }
        }
        None
    }

    /// Convenience wrapper evaluating against a file node and its merged
    /// flavor union.
    pub fn assign_file(&self, file: &FileNode, flavors: &[String]) -> Option<Assignment> {
        self.assign(flavors, file.name.as_deref(), file.source.as_deref())
    }
}

/// Compiles every configured scanner mapping, preserving configured order.
pub fn compile_mappings(
    scanners: &IndexMap<String, Vec<ScannerRule>>,
) -> Result<Vec<ScannerMapping>, ConfigError> {
    scanners
        .iter()
        .map(|(name, rules)| ScannerMapping::compile(name, rules))
        .collect()
}

/// Sorts assignments by priority descending. The sort is stable, so equal
/// priorities keep configured order.
pub fn sort_assignments(assignments: &mut [Assignment]) {
    assignments.sort_by_key(|a| Reverse(a.priority));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(name: &str, yaml: &str) -> ScannerMapping {
        let rules: Vec<ScannerRule> = serde_yaml::from_str(yaml).unwrap();
        ScannerMapping::compile(name, &rules).unwrap()
    }

    #[test]
    fn test_flavor_assignment() {
        let zip = mapping(
            "ScanZip",
            "- positive:\n    flavors: [\"application/zip\"]\n  priority: 7\n",
        );

        let assigned = zip.assign(&["application/zip".into()], None, None).unwrap();
        assert_eq!(assigned.name, "ScanZip");
        assert_eq!(assigned.priority, 7);

        assert!(zip.assign(&["text/plain".into()], None, None).is_none());
    }

    #[test]
    fn test_wildcard_matches_everything() {
        let hash = mapping("ScanHash", "- positive:\n    flavors: [\"*\"]\n");

        assert!(hash.assign(&[], None, None).is_some());
        assert!(hash.assign(&["anything".into()], None, None).is_some());
    }

    #[test]
    fn test_wildcard_is_positive_only() {
        // A literal "*" in a negative matcher must not veto every file.
        let scanner = mapping(
            "ScanHash",
            "- negative:\n    flavors: [\"*\"]\n  positive:\n    flavors: [\"text/plain\"]\n",
        );
        assert!(scanner.assign(&["text/plain".into()], None, None).is_some());
    }

    #[test]
    fn test_filename_and_source_regexes() {
        let scanner = mapping(
            "ScanUrl",
            "- positive:\n    filename: \"(?i)\\\\.eml$\"\n- positive:\n    source: \"^ScanZip$\"\n  priority: 9\n",
        );

        let by_name = scanner.assign(&[], Some("mail.EML"), None).unwrap();
        assert_eq!(by_name.priority, DEFAULT_PRIORITY);

        let by_source = scanner.assign(&[], None, Some("ScanZip")).unwrap();
        assert_eq!(by_source.priority, 9);

        assert!(scanner.assign(&[], Some("mail.txt"), Some("ScanRar")).is_none());
    }

    #[test]
    fn test_negative_veto_short_circuits_later_rules() {
        // Rule 1 vetoes text/plain; rule 2 would match everything. The
        // veto must win even though a later rule matches positively.
        let scanner = mapping(
            "ScanNoisy",
            "- negative:\n    flavors: [\"text/plain\"]\n- positive:\n    flavors: [\"*\"]\n",
        );

        assert!(scanner.assign(&["text/plain".into()], None, None).is_none());
        assert!(scanner.assign(&["application/zip".into()], None, None).is_some());
    }

    #[test]
    fn test_positive_miss_advances_to_next_rule() {
        let scanner = mapping(
            "ScanPick",
            "- positive:\n    flavors: [\"application/zip\"]\n  priority: 9\n- positive:\n    flavors: [\"text/plain\"]\n  priority: 1\n",
        );

        let assigned = scanner.assign(&["text/plain".into()], None, None).unwrap();
        assert_eq!(assigned.priority, 1);
    }

    #[test]
    fn test_negative_and_positive_same_rule() {
        let scanner = mapping(
            "ScanPicky",
            "- negative:\n    source: \"^ScanZip$\"\n  positive:\n    flavors: [\"*\"]\n",
        );

        assert!(scanner.assign(&[], None, Some("ScanZip")).is_none());
        assert!(scanner.assign(&[], None, Some("producer")).is_some());
    }

    #[test]
    fn test_assignment_determinism() {
        let scanner = mapping(
            "ScanZip",
            "- positive:\n    flavors: [\"application/zip\"]\n",
        );
        let flavors = vec!["application/zip".to_string()];

        let first = scanner.assign(&flavors, Some("a.zip"), None);
        let second = scanner.assign(&flavors, Some("a.zip"), None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_priority_sort_stable() {
        let mut assignments = vec![
            Assignment { name: "A".into(), priority: 5, options: Map::new() },
            Assignment { name: "B".into(), priority: 7, options: Map::new() },
            Assignment { name: "C".into(), priority: 5, options: Map::new() },
            Assignment { name: "D".into(), priority: 3, options: Map::new() },
        ];
        sort_assignments(&mut assignments);

        let names: Vec<&str> = assignments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["B", "A", "C", "D"]);
    }

    #[test]
    fn test_bad_regex_is_config_error() {
        let rules: Vec<ScannerRule> =
            serde_yaml::from_str("- positive:\n    filename: \"(\"\n").unwrap();
        assert!(matches!(
            ScannerMapping::compile("ScanBroken", &rules),
            Err(ConfigError::Rule { .. })
        ));
    }

    #[test]
    fn test_non_mapping_options_rejected() {
        let rules: Vec<ScannerRule> =
            serde_yaml::from_str("- positive:\n    flavors: [\"*\"]\n  options: 3\n").unwrap();
        assert!(matches!(
            ScannerMapping::compile("ScanBroken", &rules),
            Err(ConfigError::Rule { .. })
        ));
    }

    #[test]
    fn test_compile_mappings_preserves_config_order() {
        let yaml = "ScanZip:\n- positive:\n    flavors: [\"*\"]\nScanHash:\n- positive:\n    flavors: [\"*\"]\n";
        let scanners: IndexMap<String, Vec<ScannerRule>> = serde_yaml::from_str(yaml).unwrap();
        let mappings = compile_mappings(&scanners).unwrap();

        let names: Vec<&str> = mappings.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["ScanZip", "ScanHash"]);
    }
}
