//! In-memory coordinator double.
//!
//! Mirrors the production client's semantics closely enough for the test
//! suite: pop-min ordering on the task set, chunked data lists drained by
//! left-pop, append-only event lists, and expiry stamps recorded per key.
//! Exported so downstream consumers can drive a worker without a server.

use crate::coordinator::{data_key, event_key, Coordinator, Task};
use crate::core::error::CoordinatorError;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    /// Pending tasks as (root_id, score) pairs.
    tasks: Vec<(String, i64)>,
    /// Chunked payloads keyed by their full data key.
    data: HashMap<String, VecDeque<Vec<u8>>>,
    /// Event lists keyed by their full event key.
    events: HashMap<String, Vec<Vec<u8>>>,
    /// Latest expiry stamp per key.
    expiry: HashMap<String, i64>,
    /// Whether operations should fail (fault injection).
    faulty: bool,
}

/// A deterministic, fully in-memory coordinator.
#[derive(Debug, Default)]
pub struct MemoryCoordinator {
    inner: Mutex<Inner>,
}

impl MemoryCoordinator {
    /// Creates an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueues a request on the task set.
    pub fn enqueue(&self, root_id: impl Into<String>, expire_at: i64) {
        self.lock().tasks.push((root_id.into(), expire_at));
    }

    /// Stages one payload chunk under `data:{pointer}`, the way a producer
    /// (or an extracting scanner) would.
    pub fn stage_bytes(&self, pointer: &str, chunk: impl Into<Vec<u8>>) {
        self.lock()
            .data
            .entry(data_key(pointer))
            .or_default()
            .push_back(chunk.into());
    }

    /// Returns the event list recorded for a root id, in emission order.
    pub fn events(&self, root_id: &str) -> Vec<Vec<u8>> {
        self.lock()
            .events
            .get(&event_key(root_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the expiry stamp recorded for a key, if any.
    pub fn expiry(&self, key: &str) -> Option<i64> {
        self.lock().expiry.get(key).copied()
    }

    /// Returns the number of chunks still staged under `data:{pointer}`.
    pub fn staged_chunks(&self, pointer: &str) -> usize {
        self.lock()
            .data
            .get(&data_key(pointer))
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Makes every subsequent operation fail (fault injection).
    pub fn set_faulty(&self, faulty: bool) {
        self.lock().faulty = faulty;
    }

    fn check(inner: &Inner, op: &'static str) -> Result<(), CoordinatorError> {
        if inner.faulty {
            Err(CoordinatorError::io(op, "injected fault"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn pop_task(&self) -> Result<Option<Task>, CoordinatorError> {
        let mut inner = self.lock();
        Self::check(&inner, "zpopmin")?;

        // Pop-min over (score, member), matching sorted-set ordering.
        let min = inner
            .tasks
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.1, &a.0).cmp(&(b.1, &b.0)))
            .map(|(index, _)| index);

        Ok(min.map(|index| {
            let (root_id, expire_at) = inner.tasks.remove(index);
            Task { root_id, expire_at }
        }))
    }

    async fn drain_bytes(&self, pointer: &str) -> Result<Vec<u8>, CoordinatorError> {
        let mut inner = self.lock();
        Self::check(&inner, "lpop")?;

        let mut data = Vec::new();
        if let Some(chunks) = inner.data.get_mut(&data_key(pointer)) {
            while let Some(chunk) = chunks.pop_front() {
                data.extend_from_slice(&chunk);
            }
        }
        Ok(data)
    }

    async fn push_bytes(
        &self,
        pointer: &str,
        chunk: &[u8],
        expire_at: i64,
    ) -> Result<(), CoordinatorError> {
        let mut inner = self.lock();
        Self::check(&inner, "rpush data")?;

        let key = data_key(pointer);
        inner.data.entry(key.clone()).or_default().push_back(chunk.to_vec());
        inner.expiry.insert(key, expire_at);
        Ok(())
    }

    async fn emit(
        &self,
        root_id: &str,
        record: &[u8],
        expire_at: i64,
    ) -> Result<(), CoordinatorError> {
        let mut inner = self.lock();
        Self::check(&inner, "rpush event")?;

        let key = event_key(root_id);
        inner.events.entry(key.clone()).or_default().push(record.to_vec());
        inner.expiry.insert(key, expire_at);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CoordinatorError> {
        let inner = self.lock();
        Self::check(&inner, "ping")
    }
}
