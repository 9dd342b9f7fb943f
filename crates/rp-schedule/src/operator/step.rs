//! Operator steps
//!
//! Each step is self-contained: it names the target stores, peers or keys
//! and is meaningful only relative to the region state at the moment it
//! executes. The variant set is a closed sum type; executors must match
//! exhaustively so a new step kind cannot be silently ignored.

use serde::{Deserialize, Serialize};

use rp_core::{keys, Key, PeerId, PeerRole, RegionId, StoreId};

/// Which per-store concurrency ceiling a step counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKindClass {
    /// Leadership movement only
    Leader,
    /// Replica/data movement
    Region,
}

impl std::fmt::Display for OpKindClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKindClass::Leader => write!(f, "leader"),
            OpKindClass::Region => write!(f, "region"),
        }
    }
}

/// One peer touched by a joint configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerChange {
    /// Store hosting the peer
    pub store_id: StoreId,
    /// Peer ID
    pub peer_id: PeerId,
}

/// One atomic unit of an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpStep {
    /// Add a new peer on `store_id`
    AddPeer {
        store_id: StoreId,
        peer_id: PeerId,
        role: PeerRole,
    },
    /// Remove the peer on `store_id`
    RemovePeer { store_id: StoreId, peer_id: PeerId },
    /// Promote a learner to voter
    PromoteLearner { store_id: StoreId, peer_id: PeerId },
    /// Demote a voter to learner
    DemoteVoter { store_id: StoreId, peer_id: PeerId },
    /// Move region leadership between stores
    TransferLeader { from_store: StoreId, to_store: StoreId },
    /// Joint configuration change: all listed promotions and demotions pass
    /// through an intermediate joint config so no single failure can leave
    /// the voter set without a common majority
    ChangePeerV2 {
        promotes: Vec<PeerChange>,
        demotes: Vec<PeerChange>,
    },
    /// Split the region at the given keys
    SplitRegion { split_keys: Vec<Key> },
    /// Merge this region into the adjacent target region
    MergeRegion { target_region: RegionId },
}

impl OpStep {
    /// Stores whose concurrency slots this step consumes
    pub fn involved_stores(&self) -> Vec<StoreId> {
        match self {
            OpStep::AddPeer { store_id, .. }
            | OpStep::RemovePeer { store_id, .. }
            | OpStep::PromoteLearner { store_id, .. }
            | OpStep::DemoteVoter { store_id, .. } => vec![*store_id],
            OpStep::TransferLeader { from_store, to_store } => vec![*from_store, *to_store],
            OpStep::ChangePeerV2 { promotes, demotes } => promotes
                .iter()
                .chain(demotes.iter())
                .map(|c| c.store_id)
                .collect(),
            OpStep::SplitRegion { .. } => Vec::new(),
            OpStep::MergeRegion { .. } => Vec::new(),
        }
    }

    /// Ceiling class this step counts against
    pub fn kind_class(&self) -> OpKindClass {
        match self {
            OpStep::TransferLeader { .. } => OpKindClass::Leader,
            OpStep::AddPeer { .. }
            | OpStep::RemovePeer { .. }
            | OpStep::PromoteLearner { .. }
            | OpStep::DemoteVoter { .. }
            | OpStep::ChangePeerV2 { .. }
            | OpStep::SplitRegion { .. }
            | OpStep::MergeRegion { .. } => OpKindClass::Region,
        }
    }

    /// Per-step execution timeout in seconds.
    ///
    /// Data movement waits on snapshot transfer and is given far longer than
    /// metadata-only transitions.
    pub fn timeout_secs(&self) -> i64 {
        match self {
            OpStep::AddPeer { .. } => 600,
            OpStep::RemovePeer { .. } => 60,
            OpStep::PromoteLearner { .. } => 60,
            OpStep::DemoteVoter { .. } => 60,
            OpStep::TransferLeader { .. } => 10,
            OpStep::ChangePeerV2 { .. } => 120,
            OpStep::SplitRegion { .. } => 60,
            OpStep::MergeRegion { .. } => 600,
        }
    }
}

impl std::fmt::Display for OpStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpStep::AddPeer { store_id, peer_id, role } => {
                write!(f, "add {} peer {} on store {}", role, peer_id, store_id)
            }
            OpStep::RemovePeer { store_id, peer_id } => {
                write!(f, "remove peer {} on store {}", peer_id, store_id)
            }
            OpStep::PromoteLearner { store_id, peer_id } => {
                write!(f, "promote learner {} on store {}", peer_id, store_id)
            }
            OpStep::DemoteVoter { store_id, peer_id } => {
                write!(f, "demote voter {} on store {}", peer_id, store_id)
            }
            OpStep::TransferLeader { from_store, to_store } => {
                write!(f, "transfer leader: store {} -> store {}", from_store, to_store)
            }
            OpStep::ChangePeerV2 { promotes, demotes } => {
                write!(
                    f,
                    "joint change: promote {:?}, demote {:?}",
                    promotes.iter().map(|c| c.peer_id).collect::<Vec<_>>(),
                    demotes.iter().map(|c| c.peer_id).collect::<Vec<_>>()
                )
            }
            OpStep::SplitRegion { split_keys } => {
                let rendered: Vec<String> =
                    split_keys.iter().map(|k| keys::hex(k)).collect();
                write!(f, "split at [{}]", rendered.join(", "))
            }
            OpStep::MergeRegion { target_region } => {
                write!(f, "merge into region {}", target_region)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_involved_stores() {
        let step = OpStep::TransferLeader { from_store: 1, to_store: 2 };
        assert_eq!(step.involved_stores(), vec![1, 2]);

        let joint = OpStep::ChangePeerV2 {
            promotes: vec![PeerChange { store_id: 4, peer_id: 40 }],
            demotes: vec![PeerChange { store_id: 1, peer_id: 10 }],
        };
        assert_eq!(joint.involved_stores(), vec![4, 1]);

        let split = OpStep::SplitRegion { split_keys: vec![b"f".to_vec()] };
        assert!(split.involved_stores().is_empty());
    }

    #[test]
    fn test_kind_class() {
        let lead = OpStep::TransferLeader { from_store: 1, to_store: 2 };
        assert_eq!(lead.kind_class(), OpKindClass::Leader);
        let add = OpStep::AddPeer { store_id: 3, peer_id: 30, role: PeerRole::Learner };
        assert_eq!(add.kind_class(), OpKindClass::Region);
    }
}
