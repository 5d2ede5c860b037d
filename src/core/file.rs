//! File node descriptors carried through request traversal.
//!
//! A request decomposes into a tree of file nodes: the root payload plus
//! every file a scanner extracts from it. `FileNode` is the in-memory
//! descriptor for one node; its bytes live in the coordinator under
//! `data:{pointer}` and are only materialized during distribution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classifier labels for one file node, grouped by namespace.
///
/// `external` labels are producer-supplied hints; `mime` and `yara` are
/// populated by the tasting step during distribution. Each namespace is an
/// ordered, deduplicated list so event records serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavors {
    /// Labels supplied from outside the worker (producer hints).
    #[serde(default)]
    pub external: Vec<String>,

    /// Content-sniffed MIME labels.
    #[serde(default)]
    pub mime: Vec<String>,

    /// Rule-matcher labels.
    #[serde(default)]
    pub yara: Vec<String>,
}

impl Flavors {
    /// Creates an empty flavor set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a label to a namespace list, skipping duplicates.
    pub fn push_label(list: &mut Vec<String>, label: impl Into<String>) {
        let label = label.into();
        if !list.contains(&label) {
            list.push(label);
        }
    }

    /// Returns the union of all namespaces, in namespace order
    /// (external, mime, yara) with duplicates removed.
    pub fn union(&self) -> Vec<String> {
        let mut merged = Vec::with_capacity(
            self.external.len() + self.mime.len() + self.yara.len(),
        );
        for label in self
            .external
            .iter()
            .chain(self.mime.iter())
            .chain(self.yara.iter())
        {
            if !merged.contains(label) {
                merged.push(label.clone());
            }
        }
        merged
    }

    /// Returns `true` if no namespace holds any label.
    pub fn is_empty(&self) -> bool {
        self.external.is_empty() && self.mime.is_empty() && self.yara.is_empty()
    }
}

/// One file in the recursive decomposition of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Fresh opaque identifier for this node.
    pub uid: String,

    /// Key suffix where the node's bytes live in the coordinator
    /// (`data:{pointer}`). Equals the root id for the root node.
    pub pointer: String,

    /// Uid of the parent node; unset for the root.
    pub parent: Option<String>,

    /// Distance from the root (root = 0).
    pub depth: u32,

    /// Original filename, if known.
    pub name: Option<String>,

    /// Label of whatever produced this node: the extracting scanner's name,
    /// or a producer-supplied label for the root.
    pub source: Option<String>,

    /// Classifier labels accumulated for this node.
    pub flavors: Flavors,
}

impl FileNode {
    /// Creates the root node of a request. The bytes are addressed by the
    /// root id itself; the uid is fresh.
    pub fn root(root_id: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            pointer: root_id.into(),
            parent: None,
            depth: 0,
            name: None,
            source: None,
            flavors: Flavors::new(),
        }
    }

    /// Creates a child node extracted by a scanner. The node addresses its
    /// own bytes by its fresh uid; the extracting scanner is expected to
    /// push those bytes under `data:{uid}` before returning the node.
    /// Parent and depth are filled in by the distributor on adoption.
    pub fn extracted(source: impl Into<String>) -> Self {
        let uid = Uuid::new_v4().to_string();
        Self {
            pointer: uid.clone(),
            uid,
            parent: None,
            depth: 0,
            name: None,
            source: Some(source.into()),
            flavors: Flavors::new(),
        }
    }

    /// Sets the filename.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the source label.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
