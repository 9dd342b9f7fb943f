//! Merge checker
//!
//! Folds undersized regions into a key-adjacent neighbor. The candidate and
//! the target must both be stable: healthy, out of joint state, and free of
//! live operators, and under placement rules both sides must be governed by
//! the same rule set or the merged range could not satisfy either side's
//! constraints.

use std::sync::Arc;

use tracing::debug;

use rp_core::{ClusterSnapshot, Region};

use crate::config::ScheduleConfig;
use crate::metrics::MetricsSink;
use crate::operator::{OpKind, OpPriority, OpStep, Operator, OperatorController};
use crate::pause::PauseController;
use crate::placement::RuleManager;

use super::Checker;

/// Merges undersized regions into an adjacent neighbor
pub struct MergeChecker {
    config: Arc<ScheduleConfig>,
    rule_manager: Arc<RuleManager>,
    controller: Arc<OperatorController>,
    metrics: Arc<MetricsSink>,
    pause: PauseController,
}

impl MergeChecker {
    /// Create a merge checker
    pub fn new(
        config: Arc<ScheduleConfig>,
        rule_manager: Arc<RuleManager>,
        controller: Arc<OperatorController>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            config,
            rule_manager,
            controller,
            metrics,
            pause: PauseController::new(),
        }
    }

    /// Pause switch for administrative control
    pub fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    /// Whether `neighbor` can absorb `region`.
    fn can_absorb(&self, snapshot: &ClusterSnapshot, region: &Region, neighbor: &Region) -> bool {
        if neighbor.leader.is_none() || !neighbor.is_healthy() || neighbor.in_joint_state() {
            return false;
        }
        if neighbor.approximate_size < self.config.min_joinable_region_size {
            return false;
        }
        if self.controller.has_live(neighbor.id) {
            return false;
        }
        // Merging across a rule boundary would produce a range no single
        // rule set governs.
        if snapshot.placement_rules_enabled()
            && self.rule_manager.rules_for_region(region)
                != self.rule_manager.rules_for_region(neighbor)
        {
            return false;
        }
        true
    }
}

impl Checker for MergeChecker {
    fn type_name(&self) -> &'static str {
        "merge-checker"
    }

    fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    fn check(&self, snapshot: &ClusterSnapshot, region: &Region) -> Option<Operator> {
        self.metrics.incr("merge-checker");
        if self.is_paused() {
            self.metrics.incr("merge-checker-paused");
            return None;
        }

        // Only regions small on both dimensions are worth merging.
        if region.approximate_size >= self.config.max_merge_region_size
            || region.approximate_keys >= self.config.max_merge_region_keys
        {
            return None;
        }
        // A merge is negotiated between both leaders; a leaderless or
        // unstable region cannot take part.
        if region.leader.is_none() || !region.is_healthy() || region.in_joint_state() {
            return None;
        }
        if self.controller.has_live(region.id) {
            return None;
        }

        let (prev, next) = snapshot.adjacent_regions(region);
        let candidates: Vec<&Arc<Region>> = prev
            .into_iter()
            .chain(next)
            .filter(|n| self.can_absorb(snapshot, region, n))
            .collect();
        // The smaller neighbor keeps the combined region small.
        let target = candidates
            .into_iter()
            .min_by_key(|n| n.approximate_size)?;

        let steps = vec![OpStep::MergeRegion { target_region: target.id }];
        match Operator::new(region, "merge-region", OpKind::Merge, OpPriority::Low, steps) {
            Ok(op) => {
                self.metrics.incr("merge-checker-operator");
                Some(op)
            }
            Err(e) => {
                debug!("create merge operator failed for region {}: {}", region.id, e);
                None
            }
        }
    }
}
