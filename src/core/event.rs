//! Event records written back to the coordinator.
//!
//! Each file node that completes distribution produces exactly one event
//! record on `event:{root_id}`, serialized as one single-line JSON document.
//! The request's stream is terminated by the literal `FIN` sentinel.

use crate::core::file::{FileNode, Flavors};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel entry marking the end of a request's event stream.
pub const FIN: &[u8] = b"FIN";

/// Position of a file node within its request tree.
///
/// The tree is anchored to the root id even though the root file carries a
/// fresh uid: the root's `node` is the root id itself, and depth-1 children
/// point their `parent` at the root id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRecord {
    /// Identifier of this node within the tree.
    pub node: String,

    /// Identifier of the parent node; absent for the root.
    pub parent: Option<String>,

    /// Root id of the enclosing request.
    pub root: String,
}

/// The `file` sub-record of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Distance from the root.
    pub depth: u32,

    /// Original filename, if known.
    pub name: Option<String>,

    /// Classifier labels, by namespace.
    pub flavors: Flavors,

    /// Names of the scanners assigned to this node, in dispatch order.
    pub scanners: Vec<String>,

    /// Payload size in bytes.
    pub size: u64,

    /// Label of whatever produced this node.
    pub source: Option<String>,

    /// Position of this node within the request tree.
    pub tree: TreeRecord,
}

impl FileRecord {
    /// Builds the record for one file node.
    ///
    /// `scanners` must already be in dispatch (priority) order; `size` is
    /// the drained payload length.
    pub fn new(file: &FileNode, scanners: Vec<String>, size: u64, root_id: &str) -> Self {
        let node = if file.depth == 0 {
            root_id.to_string()
        } else {
            file.uid.clone()
        };
        let parent = if file.depth == 1 {
            Some(root_id.to_string())
        } else {
            file.parent.clone()
        };

        Self {
            depth: file.depth,
            name: file.name.clone(),
            flavors: file.flavors.clone(),
            scanners,
            size,
            source: file.source.clone(),
            tree: TreeRecord {
                node,
                parent,
                root: root_id.to_string(),
            },
        }
    }
}

/// One complete event document: the file sub-record plus the merged
/// per-scanner outputs, keyed by scanner name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Description of the file node.
    pub file: FileRecord,

    /// Scanner outputs keyed by scanner name. Scanners that failed or were
    /// skipped are simply absent.
    pub scan: Map<String, Value>,
}

impl EventRecord {
    /// Serializes the record to its single-line JSON wire form.
    pub fn to_wire(&self) -> Vec<u8> {
        // serde_json cannot fail here: the record contains no non-string
        // keys and no non-finite floats.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
