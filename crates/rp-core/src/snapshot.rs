//! Immutable point-in-time cluster snapshot
//!
//! A snapshot is built once per reconciliation tick from externally managed
//! cluster state and then shared read-only across every checker. Because it
//! never mutates after construction, concurrent readers need no coordination;
//! a new tick obtains a fresh snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::keys;
use crate::region::{Region, RegionId};
use crate::store::{Store, StoreId};
use crate::Key;

/// Cluster-level configuration flags carried by the snapshot
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClusterFlags {
    /// Whether placement rules drive replica repair (vs. plain replica count)
    pub placement_rules_enabled: bool,
}

/// Immutable point-in-time view of regions and stores
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    /// Regions ordered by start key
    regions: BTreeMap<Key, Arc<Region>>,
    /// Regions indexed by ID
    by_id: HashMap<RegionId, Arc<Region>>,
    /// Stores indexed by ID
    stores: HashMap<StoreId, Store>,
    /// Configuration flags
    flags: ClusterFlags,
}

impl ClusterSnapshot {
    /// Start building a snapshot
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Look up a region by ID
    pub fn region(&self, id: RegionId) -> Option<&Arc<Region>> {
        self.by_id.get(&id)
    }

    /// Find the region whose range contains `key`
    pub fn region_at(&self, key: &[u8]) -> Option<&Arc<Region>> {
        self.regions
            .range(..=key.to_vec())
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| r.contains_key(key))
    }

    /// The region immediately before `region` in key order, if adjacent
    pub fn prev_region(&self, region: &Region) -> Option<&Arc<Region>> {
        if region.start_key.is_empty() {
            return None;
        }
        self.regions
            .range(..region.start_key.clone())
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| r.end_key == region.start_key)
    }

    /// The region immediately after `region` in key order, if adjacent
    pub fn next_region(&self, region: &Region) -> Option<&Arc<Region>> {
        if region.end_key.is_empty() {
            return None;
        }
        self.regions
            .get(&region.end_key)
            .filter(|r| r.start_key == region.end_key)
    }

    /// Both key-adjacent neighbors of `region`
    pub fn adjacent_regions(
        &self,
        region: &Region,
    ) -> (Option<&Arc<Region>>, Option<&Arc<Region>>) {
        (self.prev_region(region), self.next_region(region))
    }

    /// All regions overlapping `[start, end)`, in key order
    pub fn scan_range(&self, start: &[u8], end: &[u8]) -> Vec<&Arc<Region>> {
        self.regions
            .values()
            .filter(|r| keys::ranges_overlap(&r.start_key, &r.end_key, start, end))
            .collect()
    }

    /// All regions in key order
    pub fn regions(&self) -> impl Iterator<Item = &Arc<Region>> {
        self.regions.values()
    }

    /// Number of regions
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Look up a store by ID
    pub fn store(&self, id: StoreId) -> Option<&Store> {
        self.stores.get(&id)
    }

    /// All stores, in unspecified order
    pub fn stores(&self) -> impl Iterator<Item = &Store> {
        self.stores.values()
    }

    /// Stores currently accepting new peers
    pub fn up_stores(&self) -> Vec<&Store> {
        self.stores.values().filter(|s| s.is_up()).collect()
    }

    /// Configuration flags
    pub fn flags(&self) -> ClusterFlags {
        self.flags
    }

    /// Whether placement rules are enabled for this snapshot
    pub fn placement_rules_enabled(&self) -> bool {
        self.flags.placement_rules_enabled
    }
}

/// Builder assembling an immutable [`ClusterSnapshot`]
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    regions: Vec<Region>,
    stores: Vec<Store>,
    flags: ClusterFlags,
}

impl SnapshotBuilder {
    /// Add a region
    pub fn region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    /// Add a store
    pub fn store(mut self, store: Store) -> Self {
        self.stores.push(store);
        self
    }

    /// Set configuration flags
    pub fn flags(mut self, flags: ClusterFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Enable or disable placement rules
    pub fn placement_rules(mut self, enabled: bool) -> Self {
        self.flags.placement_rules_enabled = enabled;
        self
    }

    /// Freeze into an immutable snapshot
    pub fn build(self) -> ClusterSnapshot {
        let mut regions = BTreeMap::new();
        let mut by_id = HashMap::new();
        for region in self.regions {
            let region = Arc::new(region);
            by_id.insert(region.id, region.clone());
            regions.insert(region.start_key.clone(), region);
        }
        let stores = self.stores.into_iter().map(|s| (s.id, s)).collect();
        ClusterSnapshot {
            regions,
            by_id,
            stores,
            flags: self.flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Peer, PeerRole};

    fn make_region(id: RegionId, start: &[u8], end: &[u8]) -> Region {
        let mut r = Region::new(id, start.to_vec(), end.to_vec());
        r.peers = vec![Peer::new(id * 10, 1, PeerRole::Voter)];
        r.leader = Some(id * 10);
        r
    }

    fn tiled_snapshot() -> ClusterSnapshot {
        ClusterSnapshot::builder()
            .region(make_region(1, b"", b"f"))
            .region(make_region(2, b"f", b"m"))
            .region(make_region(3, b"m", b""))
            .store(Store::new(1, "s1"))
            .build()
    }

    #[test]
    fn test_region_at() {
        let snap = tiled_snapshot();
        assert_eq!(snap.region_at(b"a").unwrap().id, 1);
        assert_eq!(snap.region_at(b"f").unwrap().id, 2);
        assert_eq!(snap.region_at(b"zzz").unwrap().id, 3);
    }

    #[test]
    fn test_adjacent_regions() {
        let snap = tiled_snapshot();
        let mid = snap.region(2).unwrap().clone();
        let (prev, next) = snap.adjacent_regions(&mid);
        assert_eq!(prev.unwrap().id, 1);
        assert_eq!(next.unwrap().id, 3);

        let first = snap.region(1).unwrap().clone();
        assert!(snap.prev_region(&first).is_none());
        let last = snap.region(3).unwrap().clone();
        assert!(snap.next_region(&last).is_none());
    }

    #[test]
    fn test_scan_range() {
        let snap = tiled_snapshot();
        let hits = snap.scan_range(b"e", b"n");
        let ids: Vec<_> = hits.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let hits = snap.scan_range(b"g", b"h");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }
}
