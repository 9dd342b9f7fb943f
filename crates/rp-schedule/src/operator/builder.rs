//! Step planning
//!
//! Turns a desired peer-set change into an ordered step sequence that never
//! leaves the voter set without a majority recognized by both the old and
//! new configurations. A single voter change is always safe step-by-step;
//! two or more voter changes must pass through one joint `ChangePeerV2`.

use rp_core::{Peer, PeerId, PeerRole, Region, StoreId};

use super::step::{OpStep, PeerChange};
use super::OperatorError;

/// A desired peer-set change for one region
#[derive(Debug, Clone, Default)]
pub struct ChangePlan {
    /// New voters to add: (target store, allocated peer ID)
    pub add_voters: Vec<(StoreId, PeerId)>,
    /// New learners to add: (target store, allocated peer ID)
    pub add_learners: Vec<(StoreId, PeerId)>,
    /// Existing learners to promote to voter
    pub promote: Vec<Peer>,
    /// Existing voters to demote to learner (and keep)
    pub demote: Vec<Peer>,
    /// Existing peers to remove entirely
    pub remove: Vec<Peer>,
}

impl ChangePlan {
    /// An empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the plan changes nothing
    pub fn is_empty(&self) -> bool {
        self.add_voters.is_empty()
            && self.add_learners.is_empty()
            && self.promote.is_empty()
            && self.demote.is_empty()
            && self.remove.is_empty()
    }
}

/// Build the step sequence realizing `plan` against `region`.
///
/// New voters always enter as learners and are promoted once caught up.
/// When the plan performs two or more voter-set changes they are collapsed
/// into one joint `ChangePeerV2`; otherwise plain single steps are emitted.
pub fn build_change_steps(region: &Region, plan: &ChangePlan) -> Result<Vec<OpStep>, OperatorError> {
    let mut steps = Vec::new();

    // Voters leaving the voter set, whether demoted in place or removed.
    let voter_removals: Vec<&Peer> = plan
        .remove
        .iter()
        .filter(|p| p.role.in_new_voters())
        .collect();
    let demotions: Vec<&Peer> = plan.demote.iter().chain(voter_removals.clone()).collect();

    // Leadership must leave any store whose voter is being demoted or
    // removed before that change executes.
    if let Some(leader_store) = region.leader_store() {
        let leader_affected = demotions.iter().any(|p| p.store_id == leader_store);
        if leader_affected {
            let target = region
                .voters()
                .into_iter()
                .find(|v| {
                    v.store_id != leader_store && !demotions.iter().any(|d| d.id == v.id)
                })
                .ok_or(OperatorError::NoLeaderTarget)?;
            steps.push(OpStep::TransferLeader {
                from_store: leader_store,
                to_store: target.store_id,
            });
        }
    }

    // New peers enter as learners regardless of their final role.
    for (store_id, peer_id) in plan.add_voters.iter().chain(plan.add_learners.iter()) {
        steps.push(OpStep::AddPeer {
            store_id: *store_id,
            peer_id: *peer_id,
            role: PeerRole::Learner,
        });
    }

    let mut promotions: Vec<PeerChange> = plan
        .add_voters
        .iter()
        .map(|(store_id, peer_id)| PeerChange {
            store_id: *store_id,
            peer_id: *peer_id,
        })
        .collect();
    promotions.extend(plan.promote.iter().map(|p| PeerChange {
        store_id: p.store_id,
        peer_id: p.id,
    }));
    let demote_changes: Vec<PeerChange> = demotions
        .iter()
        .map(|p| PeerChange {
            store_id: p.store_id,
            peer_id: p.id,
        })
        .collect();

    if promotions.len() + demote_changes.len() >= 2 {
        // Multiple voter changes: a sequential rendition would pass through
        // a configuration where old and new majorities diverge.
        steps.push(OpStep::ChangePeerV2 {
            promotes: promotions,
            demotes: demote_changes,
        });
        for peer in &voter_removals {
            steps.push(OpStep::RemovePeer {
                store_id: peer.store_id,
                peer_id: peer.id,
            });
        }
    } else {
        for change in promotions {
            steps.push(OpStep::PromoteLearner {
                store_id: change.store_id,
                peer_id: change.peer_id,
            });
        }
        for peer in &plan.demote {
            steps.push(OpStep::DemoteVoter {
                store_id: peer.store_id,
                peer_id: peer.id,
            });
        }
        // A lone voter removal keeps a common majority without a demotion.
        for peer in &voter_removals {
            steps.push(OpStep::RemovePeer {
                store_id: peer.store_id,
                peer_id: peer.id,
            });
        }
    }

    // Learner removals never affect quorum.
    for peer in plan.remove.iter().filter(|p| !p.role.in_new_voters()) {
        steps.push(OpStep::RemovePeer {
            store_id: peer.store_id,
            peer_id: peer.id,
        });
    }

    Ok(steps)
}
