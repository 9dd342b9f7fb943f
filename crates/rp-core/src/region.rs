//! Region information definitions
//!
//! A region is a contiguous key-range partition of the key space, replicated
//! across stores. Regions are owned and mutated by the external cluster-state
//! manager; the engine only reads them.

use serde::{Deserialize, Serialize};

use crate::keys;
use crate::store::StoreId;
use crate::{Key, PeerId};

/// Region ID type
pub type RegionId = u64;

/// Role of a peer within its region's raft group
///
/// `IncomingVoter` and `DemotingVoter` only appear while a joint
/// configuration change is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerRole {
    /// Full voter in the current configuration
    Voter,
    /// Non-voting replica
    Learner,
    /// Learner being promoted through a joint configuration
    IncomingVoter,
    /// Voter being demoted through a joint configuration
    DemotingVoter,
}

impl PeerRole {
    /// Whether this peer counts toward the outgoing (old) voter set
    pub fn in_old_voters(&self) -> bool {
        matches!(self, PeerRole::Voter | PeerRole::DemotingVoter)
    }

    /// Whether this peer counts toward the incoming (new) voter set
    pub fn in_new_voters(&self) -> bool {
        matches!(self, PeerRole::Voter | PeerRole::IncomingVoter)
    }

    /// Whether this peer is part of an unfinished joint change
    pub fn is_joint(&self) -> bool {
        matches!(self, PeerRole::IncomingVoter | PeerRole::DemotingVoter)
    }
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Voter => write!(f, "voter"),
            PeerRole::Learner => write!(f, "learner"),
            PeerRole::IncomingVoter => write!(f, "incoming_voter"),
            PeerRole::DemotingVoter => write!(f, "demoting_voter"),
        }
    }
}

/// One replica of a region on a specific store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Peer ID (cluster-unique)
    pub id: PeerId,
    /// Store hosting this peer
    pub store_id: StoreId,
    /// Peer role
    pub role: PeerRole,
}

impl Peer {
    /// Create a new peer
    pub fn new(id: PeerId, store_id: StoreId, role: PeerRole) -> Self {
        Self { id, store_id, role }
    }
}

/// A peer reported as unreachable by the region leader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownPeer {
    /// The unreachable peer
    pub peer: Peer,
    /// Seconds since the peer last responded
    pub down_secs: u64,
}

/// Region configuration/boundary epoch
///
/// `conf_ver` increases on membership changes, `version` on boundary changes
/// (split/merge). An epoch is stale relative to another when both components
/// are less than or equal and at least one is strictly less.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEpoch {
    /// Configuration version
    pub conf_ver: u64,
    /// Boundary version
    pub version: u64,
}

impl RegionEpoch {
    /// Create a new epoch
    pub fn new(conf_ver: u64, version: u64) -> Self {
        Self { conf_ver, version }
    }

    /// Whether `self` is strictly newer than `other` in either dimension
    pub fn is_newer_than(&self, other: &RegionEpoch) -> bool {
        self.conf_ver > other.conf_ver || self.version > other.version
    }
}

impl std::fmt::Display for RegionEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(conf_ver={}, version={})", self.conf_ver, self.version)
    }
}

/// Region information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// Region ID
    pub id: RegionId,
    /// Start key (inclusive, empty = beginning of key space)
    pub start_key: Key,
    /// End key (exclusive, empty = end of key space)
    pub end_key: Key,
    /// Configuration/boundary epoch
    pub epoch: RegionEpoch,
    /// Replica peers
    pub peers: Vec<Peer>,
    /// Current leader peer ID
    pub leader: Option<PeerId>,
    /// Approximate data size in MiB
    pub approximate_size: u64,
    /// Approximate key count
    pub approximate_keys: u64,
    /// Peers with an unconfirmed configuration change in flight
    pub pending_peers: Vec<PeerId>,
    /// Peers reported as unreachable
    pub down_peers: Vec<DownPeer>,
}

impl Region {
    /// Create a new region with the given boundary
    pub fn new(id: RegionId, start_key: Key, end_key: Key) -> Self {
        Self {
            id,
            start_key,
            end_key,
            epoch: RegionEpoch::default(),
            peers: Vec::new(),
            leader: None,
            approximate_size: 0,
            approximate_keys: 0,
            pending_peers: Vec::new(),
            down_peers: Vec::new(),
        }
    }

    /// Check whether `key` falls within this region's range
    pub fn contains_key(&self, key: &[u8]) -> bool {
        keys::in_range(key, &self.start_key, &self.end_key)
    }

    /// All voter peers of the current configuration
    pub fn voters(&self) -> Vec<&Peer> {
        self.peers.iter().filter(|p| p.role.in_new_voters()).collect()
    }

    /// All learner peers
    pub fn learners(&self) -> Vec<&Peer> {
        self.peers
            .iter()
            .filter(|p| p.role == PeerRole::Learner)
            .collect()
    }

    /// Find the peer hosted on `store_id`
    pub fn peer_on_store(&self, store_id: StoreId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.store_id == store_id)
    }

    /// Find a peer by ID
    pub fn peer(&self, peer_id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == peer_id)
    }

    /// The current leader peer, if any
    pub fn leader_peer(&self) -> Option<&Peer> {
        self.leader.and_then(|id| self.peer(id))
    }

    /// Store hosting the current leader, if any
    pub fn leader_store(&self) -> Option<StoreId> {
        self.leader_peer().map(|p| p.store_id)
    }

    /// Whether any peer is still inside a joint configuration change
    pub fn in_joint_state(&self) -> bool {
        self.peers.iter().any(|p| p.role.is_joint())
    }

    /// Whether the peer with `peer_id` has a pending configuration change
    pub fn is_pending(&self, peer_id: PeerId) -> bool {
        self.pending_peers.contains(&peer_id)
    }

    /// Whether the region has no down or pending peers
    pub fn is_healthy(&self) -> bool {
        self.down_peers.is_empty() && self.pending_peers.is_empty()
    }
}
