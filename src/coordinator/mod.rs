//! The coordinator client: the fleet's shared queue and per-request store.
//!
//! The coordinator is a keyed in-memory store holding three kinds of keys:
//!
//! - `tasks`, a sorted set of pending root ids scored by their absolute
//!   expiry (seconds since epoch), consumed with atomic pop-min;
//! - `data:{pointer}`, a list of byte chunks for one file node, consumed
//!   with left-pop until empty;
//! - `event:{root_id}`, a list of event records terminated by `FIN`,
//!   produced with right-push and stamped with the request expiry.
//!
//! The trait below is the only surface the core uses; the production
//! implementation speaks to Redis, and an in-memory double backs the test
//! suite.

mod memory;
mod redis;

pub use memory::MemoryCoordinator;
pub use redis::RedisCoordinator;

use crate::core::error::CoordinatorError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// One claimed scan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Root id of the request.
    pub root_id: String,

    /// Absolute expiry of the request, seconds since epoch.
    pub expire_at: i64,
}

/// Returns the data key for a pointer.
pub fn data_key(pointer: &str) -> String {
    format!("data:{pointer}")
}

/// Returns the event key for a root id.
pub fn event_key(root_id: &str) -> String {
    format!("event:{root_id}")
}

/// Client contract over the coordinator.
///
/// Every operation maps to a single server-atomic command (or one pipelined
/// batch with no cross-key atomicity); the pop-min on `tasks` is the only
/// synchronization primitive the fleet relies on.
#[async_trait]
pub trait Coordinator: Send + Sync + Debug {
    /// Atomically claims the lowest-scored pending request, if any.
    async fn pop_task(&self) -> Result<Option<Task>, CoordinatorError>;

    /// Left-pops `data:{pointer}` until empty and returns the concatenated
    /// bytes. An empty or missing list yields an empty payload.
    async fn drain_bytes(&self, pointer: &str) -> Result<Vec<u8>, CoordinatorError>;

    /// Right-pushes one chunk onto `data:{pointer}` and stamps the key's
    /// expiry. Used by extracting scanners to stage child payloads.
    async fn push_bytes(
        &self,
        pointer: &str,
        chunk: &[u8],
        expire_at: i64,
    ) -> Result<(), CoordinatorError>;

    /// Right-pushes one record onto `event:{root_id}` and stamps the key's
    /// expiry, as one pipelined batch.
    async fn emit(
        &self,
        root_id: &str,
        record: &[u8],
        expire_at: i64,
    ) -> Result<(), CoordinatorError>;

    /// Round-trip liveness check.
    async fn ping(&self) -> Result<(), CoordinatorError>;
}

/// An arc-wrapped coordinator for shared ownership.
pub type ArcCoordinator = Arc<dyn Coordinator>;
