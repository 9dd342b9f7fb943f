//! Operator model
//!
//! An operator is an ordered repair plan for one region: a sequence of steps
//! plus lifecycle state. Checkers construct candidates; once admitted, an
//! operator is owned and mutated exclusively by the controller.

mod builder;
mod controller;
mod step;

pub use builder::{build_change_steps, ChangePlan};
pub use controller::{AdmissionError, OperatorController};
pub use step::{OpKindClass, OpStep, PeerChange};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use rp_core::{Region, RegionEpoch, RegionId, StoreId};

/// Operator construction failure
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("operator has no steps")]
    EmptySteps,
    #[error("step sequence removes the region leader on store {0} without transferring first")]
    RemovesLeader(StoreId),
    #[error("no surviving voter to transfer leadership to")]
    NoLeaderTarget,
    #[error("step sequence touches store {0} twice with conflicting actions")]
    ConflictingSteps(StoreId),
}

/// What produced an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Region split
    Split,
    /// Region merge
    Merge,
    /// Replica-count repair (rules disabled)
    ReplicaRepair,
    /// Placement-rule repair
    RuleRepair,
    /// Finishing a stale joint configuration change
    LeaveJoint,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Split => write!(f, "split"),
            OpKind::Merge => write!(f, "merge"),
            OpKind::ReplicaRepair => write!(f, "replica-repair"),
            OpKind::RuleRepair => write!(f, "rule-repair"),
            OpKind::LeaveJoint => write!(f, "leave-joint"),
        }
    }
}

/// Priority class driving conflict resolution between candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpPriority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Operator lifecycle state
///
/// `Created -> Started -> {Success | Timeout | Canceled | Expired | Replaced}`;
/// the bracketed states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpStatus {
    /// Constructed, not yet dispatched
    Created,
    /// First step dispatched
    Started,
    /// All steps confirmed complete
    Success,
    /// Started but ran past its deadline
    Timeout,
    /// Canceled administratively or invalidated at dispatch time
    Canceled,
    /// Never dispatched before its deadline passed
    Expired,
    /// Preempted by a higher-priority candidate before dispatch
    Replaced,
}

impl OpStatus {
    /// Whether this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OpStatus::Created | OpStatus::Started)
    }
}

impl std::fmt::Display for OpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpStatus::Created => write!(f, "created"),
            OpStatus::Started => write!(f, "started"),
            OpStatus::Success => write!(f, "success"),
            OpStatus::Timeout => write!(f, "timeout"),
            OpStatus::Canceled => write!(f, "canceled"),
            OpStatus::Expired => write!(f, "expired"),
            OpStatus::Replaced => write!(f, "replaced"),
        }
    }
}

/// An ordered repair plan for one region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    /// Target region
    pub region_id: RegionId,
    /// Region epoch at construction; stale reports are ignored against it
    pub region_epoch: RegionEpoch,
    /// Human-readable description, e.g. `rule-split-region`
    pub desc: String,
    /// Producing kind
    pub kind: OpKind,
    /// Priority class
    pub priority: OpPriority,
    /// Ordered steps
    steps: Vec<OpStep>,
    /// Rule-set version the plan was derived from, if rule-driven
    pub rule_version: Option<u64>,
    status: OpStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    current_step: usize,
    /// Total allowed wall-clock duration in seconds
    max_duration_secs: i64,
}

impl Operator {
    /// Build an operator, validating the step sequence.
    ///
    /// The region leader must not be removed or demoted by a later step
    /// unless an earlier step moves leadership away first.
    pub fn new(
        region: &Region,
        desc: impl Into<String>,
        kind: OpKind,
        priority: OpPriority,
        steps: Vec<OpStep>,
    ) -> Result<Self, OperatorError> {
        if steps.is_empty() {
            return Err(OperatorError::EmptySteps);
        }

        let added: Vec<StoreId> = steps
            .iter()
            .filter_map(|s| match s {
                OpStep::AddPeer { store_id, .. } => Some(*store_id),
                _ => None,
            })
            .collect();
        for step in &steps {
            if let OpStep::RemovePeer { store_id, .. } = step {
                if added.contains(store_id) {
                    return Err(OperatorError::ConflictingSteps(*store_id));
                }
            }
        }

        let mut leader_store = region.leader_store();
        for step in &steps {
            match step {
                OpStep::TransferLeader { to_store, .. } => {
                    leader_store = Some(*to_store);
                }
                OpStep::RemovePeer { store_id, .. } | OpStep::DemoteVoter { store_id, .. } => {
                    if leader_store == Some(*store_id) {
                        return Err(OperatorError::RemovesLeader(*store_id));
                    }
                }
                OpStep::ChangePeerV2 { demotes, .. } => {
                    if let Some(ls) = leader_store {
                        if demotes.iter().any(|c| c.store_id == ls) {
                            return Err(OperatorError::RemovesLeader(ls));
                        }
                    }
                }
                OpStep::AddPeer { .. }
                | OpStep::PromoteLearner { .. }
                | OpStep::SplitRegion { .. }
                | OpStep::MergeRegion { .. } => {}
            }
        }

        let max_duration_secs = steps.iter().map(|s| s.timeout_secs()).sum();
        Ok(Self {
            region_id: region.id,
            region_epoch: region.epoch,
            desc: desc.into(),
            kind,
            priority,
            steps,
            rule_version: None,
            status: OpStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            current_step: 0,
            max_duration_secs,
        })
    }

    /// Record the rule-set version this plan was derived from
    pub fn with_rule_version(mut self, version: u64) -> Self {
        self.rule_version = Some(version);
        self
    }

    /// Override the total allowed duration
    pub fn with_max_duration_secs(mut self, secs: i64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Current lifecycle state
    pub fn status(&self) -> OpStatus {
        self.status
    }

    /// The steps, in order
    pub fn steps(&self) -> &[OpStep] {
        &self.steps
    }

    /// Index of the step currently awaiting completion
    pub fn current_step_index(&self) -> usize {
        self.current_step
    }

    /// The step currently awaiting completion, if any remain
    pub fn current_step(&self) -> Option<&OpStep> {
        self.steps.get(self.current_step)
    }

    /// Creation timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Total allowed duration in seconds
    pub fn max_duration_secs(&self) -> i64 {
        self.max_duration_secs
    }

    /// Mark the first step as dispatched
    pub(crate) fn mark_started(&mut self) {
        if self.status == OpStatus::Created {
            self.status = OpStatus::Started;
            self.started_at = Some(Utc::now());
        }
    }

    /// Advance past the current step; returns true when all steps are done
    pub(crate) fn advance(&mut self) -> bool {
        if self.current_step < self.steps.len() {
            self.current_step += 1;
        }
        self.current_step >= self.steps.len()
    }

    /// Move to a terminal state; later calls on a terminal operator are no-ops
    pub(crate) fn finish(&mut self, status: OpStatus) {
        if self.status.is_terminal() {
            return;
        }
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Whether the wall-clock deadline has passed
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        let reference = self.started_at.unwrap_or(self.created_at);
        now.signed_duration_since(reference) > ChronoDuration::seconds(self.max_duration_secs)
    }

    /// Every store touched by any step, deduplicated, with the ceiling class
    /// each occurrence counts against
    pub fn store_slots(&self) -> Vec<(StoreId, OpKindClass)> {
        let mut slots: Vec<(StoreId, OpKindClass)> = Vec::new();
        for step in &self.steps {
            let class = step.kind_class();
            for store in step.involved_stores() {
                if !slots.contains(&(store, class)) {
                    slots.push((store, class));
                }
            }
        }
        slots
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "operator[{}] region {} ({} steps, {})",
            self.desc,
            self.region_id,
            self.steps.len(),
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rp_core::{Peer, PeerRole};

    fn region() -> Region {
        let mut r = Region::new(7, b"a".to_vec(), b"m".to_vec());
        r.peers = vec![
            Peer::new(71, 1, PeerRole::Voter),
            Peer::new(72, 2, PeerRole::Voter),
            Peer::new(73, 3, PeerRole::Voter),
        ];
        r.leader = Some(71);
        r
    }

    #[test]
    fn test_lifecycle_transitions() {
        let r = region();
        let steps = vec![
            OpStep::AddPeer { store_id: 4, peer_id: 74, role: PeerRole::Learner },
            OpStep::PromoteLearner { store_id: 4, peer_id: 74 },
        ];
        let mut op =
            Operator::new(&r, "test", OpKind::RuleRepair, OpPriority::Normal, steps).unwrap();

        assert_eq!(op.status(), OpStatus::Created);
        op.mark_started();
        assert_eq!(op.status(), OpStatus::Started);
        assert!(!op.advance());
        assert!(op.advance());
        op.finish(OpStatus::Success);
        assert_eq!(op.status(), OpStatus::Success);

        // Terminal states are sticky.
        op.finish(OpStatus::Canceled);
        assert_eq!(op.status(), OpStatus::Success);
    }

    #[test]
    fn test_empty_steps_rejected() {
        let r = region();
        let err = Operator::new(&r, "x", OpKind::RuleRepair, OpPriority::Normal, vec![]);
        assert!(matches!(err, Err(OperatorError::EmptySteps)));
    }

    #[test]
    fn test_removing_leader_without_transfer_rejected() {
        let r = region();
        let steps = vec![OpStep::RemovePeer { store_id: 1, peer_id: 71 }];
        let err = Operator::new(&r, "x", OpKind::ReplicaRepair, OpPriority::Normal, steps);
        assert!(matches!(err, Err(OperatorError::RemovesLeader(1))));

        // With a preceding transfer, the same removal is fine.
        let steps = vec![
            OpStep::TransferLeader { from_store: 1, to_store: 2 },
            OpStep::RemovePeer { store_id: 1, peer_id: 71 },
        ];
        let op = Operator::new(&r, "x", OpKind::ReplicaRepair, OpPriority::Normal, steps);
        assert!(op.is_ok());
    }

    #[test]
    fn test_deadline_from_step_timeouts() {
        let r = region();
        let steps = vec![
            OpStep::AddPeer { store_id: 4, peer_id: 74, role: PeerRole::Learner },
            OpStep::TransferLeader { from_store: 1, to_store: 2 },
        ];
        let op =
            Operator::new(&r, "x", OpKind::RuleRepair, OpPriority::Normal, steps).unwrap();
        assert_eq!(op.max_duration_secs(), 610);
        assert!(!op.is_past_deadline(Utc::now()));
        assert!(op.is_past_deadline(Utc::now() + ChronoDuration::seconds(611)));
    }

    #[test]
    fn test_store_slots_dedup() {
        let r = region();
        let steps = vec![
            OpStep::AddPeer { store_id: 4, peer_id: 74, role: PeerRole::Learner },
            OpStep::PromoteLearner { store_id: 4, peer_id: 74 },
            OpStep::TransferLeader { from_store: 1, to_store: 2 },
        ];
        let op =
            Operator::new(&r, "x", OpKind::RuleRepair, OpPriority::Normal, steps).unwrap();
        let slots = op.store_slots();
        assert_eq!(
            slots,
            vec![
                (4, OpKindClass::Region),
                (1, OpKindClass::Leader),
                (2, OpKindClass::Leader),
            ]
        );
    }
}
