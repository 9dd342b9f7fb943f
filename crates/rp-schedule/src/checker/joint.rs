//! Joint-state checker
//!
//! A region reporting peers in the intermediate joint-consensus roles has an
//! unfinished configuration change, typically abandoned by a failed operator.
//! Leaving the region in that state halves its fault tolerance, so this
//! checker runs before every other and emits the exit step directly.

use std::sync::Arc;

use tracing::debug;

use rp_core::{ClusterSnapshot, PeerRole, Region};

use crate::metrics::MetricsSink;
use crate::operator::{OpKind, OpPriority, OpStep, Operator, PeerChange};
use crate::pause::PauseController;

use super::Checker;

/// Finishes abandoned joint configuration changes
pub struct JointStateChecker {
    metrics: Arc<MetricsSink>,
    pause: PauseController,
}

impl JointStateChecker {
    /// Create a joint-state checker
    pub fn new(metrics: Arc<MetricsSink>) -> Self {
        Self {
            metrics,
            pause: PauseController::new(),
        }
    }

    /// Pause switch for administrative control
    pub fn pause_controller(&self) -> &PauseController {
        &self.pause
    }
}

impl Checker for JointStateChecker {
    fn type_name(&self) -> &'static str {
        "joint-state-checker"
    }

    fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    fn check(&self, _snapshot: &ClusterSnapshot, region: &Region) -> Option<Operator> {
        self.metrics.incr("joint-state-checker");
        if self.is_paused() {
            self.metrics.incr("joint-state-checker-paused");
            return None;
        }
        if !region.in_joint_state() {
            return None;
        }

        let promotes: Vec<PeerChange> = region
            .peers
            .iter()
            .filter(|p| p.role == PeerRole::IncomingVoter)
            .map(|p| PeerChange { store_id: p.store_id, peer_id: p.id })
            .collect();
        let demotes: Vec<PeerChange> = region
            .peers
            .iter()
            .filter(|p| p.role == PeerRole::DemotingVoter)
            .map(|p| PeerChange { store_id: p.store_id, peer_id: p.id })
            .collect();

        let mut steps = Vec::new();
        // Leaving the joint state demotes the demoting voters for real; if
        // the leader sits on one of those stores, move leadership to a peer
        // staying in the voter set first.
        if let Some(leader_store) = region.leader_store() {
            if demotes.iter().any(|c| c.store_id == leader_store) {
                let target = region
                    .peers
                    .iter()
                    .find(|p| p.store_id != leader_store && p.role.in_new_voters())?;
                steps.push(OpStep::TransferLeader {
                    from_store: leader_store,
                    to_store: target.store_id,
                });
            }
        }
        steps.push(OpStep::ChangePeerV2 { promotes, demotes });

        match Operator::new(
            region,
            "leave-joint-state",
            OpKind::LeaveJoint,
            OpPriority::High,
            steps,
        ) {
            Ok(op) => {
                self.metrics.incr("joint-state-checker-operator");
                Some(op)
            }
            Err(e) => {
                debug!(
                    "create leave-joint operator failed for region {}: {}",
                    region.id, e
                );
                None
            }
        }
    }
}
