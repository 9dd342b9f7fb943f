//! Monotonic counter sink
//!
//! Replaces package-level metrics globals with an explicit dependency:
//! every component receives a shared [`MetricsSink`] and increments named
//! counters. Increments are atomic and safe under concurrent invocation
//! from multiple checkers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// A set of named monotonic counters
#[derive(Debug, Default)]
pub struct MetricsSink {
    counters: RwLock<HashMap<&'static str, Arc<AtomicU64>>>,
}

impl MetricsSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the named counter by one
    pub fn incr(&self, name: &'static str) {
        self.counter(name).fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of the named counter (zero if never incremented)
    pub fn get(&self, name: &'static str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Handle to the named counter, creating it on first use
    pub fn counter(&self, name: &'static str) -> Arc<AtomicU64> {
        if let Some(c) = self.counters.read().get(name) {
            return c.clone();
        }
        self.counters
            .write()
            .entry(name)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    /// Snapshot of all counters, for export
    pub fn dump(&self) -> HashMap<&'static str, u64> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (*k, v.load(Ordering::Relaxed)))
            .collect()
    }
}
