//! Core cluster data model for the RangePilot control plane
//!
//! Provides the read-only view of cluster state consumed by the
//! reconciliation engine:
//! - Regions (key-range partitions), peers and epochs
//! - Stores, labels and operational states
//! - The immutable per-tick cluster snapshot with key-range queries

pub mod keys;
pub mod region;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use region::{DownPeer, Peer, PeerRole, Region, RegionEpoch, RegionId};
pub use snapshot::{ClusterFlags, ClusterSnapshot, SnapshotBuilder};
pub use store::{Store, StoreId, StoreLabel, StoreState};

/// Peer ID type
pub type PeerId = u64;

/// Region keys are opaque byte strings over an ordered key space
pub type Key = Vec<u8>;
