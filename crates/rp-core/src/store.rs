//! Store information definitions

use serde::{Deserialize, Serialize};

/// Store ID type
pub type StoreId = u64;

/// Store operational state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreState {
    /// Serving normally
    Up,
    /// Being drained; peers must move away
    Offline,
    /// Fully removed; must host nothing
    Tombstone,
}

impl Default for StoreState {
    fn default() -> Self {
        Self::Up
    }
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreState::Up => write!(f, "up"),
            StoreState::Offline => write!(f, "offline"),
            StoreState::Tombstone => write!(f, "tombstone"),
        }
    }
}

/// An ordered key-value label used for placement isolation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLabel {
    /// Label key (e.g. "zone", "rack", "host")
    pub key: String,
    /// Label value
    pub value: String,
}

impl StoreLabel {
    /// Create a new label
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Store information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    /// Store ID
    pub id: StoreId,
    /// Network address (host:port)
    pub address: String,
    /// Placement labels, ordered from coarsest to finest
    pub labels: Vec<StoreLabel>,
    /// Operational state
    pub state: StoreState,
    /// Total capacity in MiB
    pub capacity: u64,
    /// Used capacity in MiB
    pub used: u64,
    /// Number of region peers hosted
    pub region_count: u64,
    /// Number of region leaders hosted
    pub leader_count: u64,
}

impl Store {
    /// Create a new store
    pub fn new(id: StoreId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            labels: Vec::new(),
            state: StoreState::Up,
            capacity: 0,
            used: 0,
            region_count: 0,
            leader_count: 0,
        }
    }

    /// Attach a placement label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(StoreLabel::new(key, value));
        self
    }

    /// Look up a label value by key
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }

    /// Whether the store is accepting new peers
    pub fn is_up(&self) -> bool {
        self.state == StoreState::Up
    }

    /// Whether peers must be moved off this store
    pub fn is_removing(&self) -> bool {
        matches!(self.state, StoreState::Offline | StoreState::Tombstone)
    }

    /// Fraction of capacity in use, or 0.0 when capacity is unknown
    pub fn usage(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.used as f64 / self.capacity as f64
        }
    }
}
