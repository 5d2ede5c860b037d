//! Per-scanner fault breaker.
//!
//! A plugin that fails deterministically would otherwise burn its share of
//! every request budget. The dispatch path records consecutive faults per
//! scanner name; once a scanner trips the threshold it is skipped until a
//! cooldown elapses, after which one probe dispatch is allowed through. A
//! success closes the breaker, a failed probe reopens it immediately.
//!
//! The breaker is exclusively owned by one worker's dispatch path, so no
//! synchronization is involved.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Consecutive faults before a scanner is skipped.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// How long a tripped scanner stays skipped.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct Entry {
    consecutive: u32,
    open_until: Option<Instant>,
}

/// Tracks consecutive faults per scanner name.
#[derive(Debug)]
pub struct FaultBreaker {
    threshold: u32,
    cooldown: Duration,
    entries: HashMap<String, Entry>,
}

impl Default for FaultBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl FaultBreaker {
    /// Creates a breaker with the given threshold and cooldown.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            entries: HashMap::new(),
        }
    }

    /// Returns whether the scanner may be dispatched right now. Crossing
    /// an elapsed cooldown converts the entry into a single probe.
    pub fn allows(&mut self, name: &str) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => match entry.open_until {
                Some(until) if Instant::now() < until => false,
                Some(_) => {
                    // Cooldown elapsed: let one probe through. The fault
                    // count stays at the threshold so a failed probe
                    // reopens immediately.
                    entry.open_until = None;
                    true
                }
                None => true,
            },
            None => true,
        }
    }

    /// Returns whether the scanner is currently skipped.
    pub fn is_open(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .and_then(|entry| entry.open_until)
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    /// Records a successful dispatch, closing the breaker for the scanner.
    pub fn record_success(&mut self, name: &str) {
        self.entries.remove(name);
    }

    /// Records a faulted dispatch; trips the breaker at the threshold.
    pub fn record_failure(&mut self, name: &str) {
        let entry = self.entries.entry(name.to_string()).or_default();
        entry.consecutive += 1;
        if entry.consecutive >= self.threshold {
            entry.open_until = Some(Instant::now() + self.cooldown);
            tracing::warn!(
                scanner = name,
                consecutive = entry.consecutive,
                "scanner breaker opened"
            );
        }
    }
}
