//! Split checker
//!
//! Splits a region whose key range spans a label or rule boundary. Labeler
//! boundaries take precedence; rule boundaries are only consulted when the
//! labeler has none and placement rules are enabled. Handling the two
//! sources separately keeps the reason for a split visible in the operator
//! description.

use std::sync::Arc;

use tracing::debug;

use rp_core::{ClusterSnapshot, Region};

use crate::labeler::RegionLabeler;
use crate::metrics::MetricsSink;
use crate::operator::{OpKind, OpPriority, OpStep, Operator};
use crate::pause::PauseController;
use crate::placement::RuleManager;

use super::Checker;

/// Splits regions crossing label or rule boundaries
pub struct SplitChecker {
    rule_manager: Arc<RuleManager>,
    labeler: Arc<dyn RegionLabeler>,
    metrics: Arc<MetricsSink>,
    pause: PauseController,
}

impl SplitChecker {
    /// Create a split checker
    pub fn new(
        rule_manager: Arc<RuleManager>,
        labeler: Arc<dyn RegionLabeler>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            rule_manager,
            labeler,
            metrics,
            pause: PauseController::new(),
        }
    }

    /// Pause switch for administrative control
    pub fn pause_controller(&self) -> &PauseController {
        &self.pause
    }
}

impl Checker for SplitChecker {
    fn type_name(&self) -> &'static str {
        "split-checker"
    }

    fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    fn check(&self, snapshot: &ClusterSnapshot, region: &Region) -> Option<Operator> {
        self.metrics.incr("split-checker");
        if self.is_paused() {
            self.metrics.incr("split-checker-paused");
            return None;
        }

        let (start, end) = (&region.start_key, &region.end_key);
        let mut desc = "labeler-split-region";
        let mut keys = self.labeler.get_split_keys(start, end);

        if keys.is_empty() && snapshot.placement_rules_enabled() {
            desc = "rule-split-region";
            keys = self.rule_manager.get_split_keys(start, end);
        }

        if keys.is_empty() {
            return None;
        }

        let steps = vec![OpStep::SplitRegion { split_keys: keys }];
        match Operator::new(region, desc, OpKind::Split, OpPriority::Normal, steps) {
            Ok(op) => {
                self.metrics.incr("split-checker-operator");
                Some(op)
            }
            Err(e) => {
                debug!("create split operator failed for region {}: {}", region.id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeler::{KeyRangeLabeler, LabelRule};
    use rp_core::{ClusterSnapshot, Peer, PeerRole};

    fn region_a_to_m() -> Region {
        let mut r = Region::new(1, b"a".to_vec(), b"m".to_vec());
        r.peers = vec![Peer::new(11, 1, PeerRole::Voter)];
        r.leader = Some(11);
        r
    }

    fn rule_with_boundary_at_f() -> Arc<RuleManager> {
        let mgr = Arc::new(RuleManager::new(3));
        let low = crate::placement::Rule {
            group_id: "rp".to_string(),
            id: "low".to_string(),
            index: 0,
            start_key: Vec::new(),
            end_key: b"f".to_vec(),
            role: crate::placement::RuleRole::Voter,
            count: 3,
            label_constraints: Vec::new(),
            location_labels: Vec::new(),
        };
        let mut high = low.clone();
        high.id = "high".to_string();
        high.start_key = b"f".to_vec();
        high.end_key = Vec::new();
        mgr.set_rules(vec![low, high]).unwrap();
        mgr
    }

    fn checker(
        rule_manager: Arc<RuleManager>,
        labeler: Arc<KeyRangeLabeler>,
    ) -> (SplitChecker, Arc<MetricsSink>) {
        let metrics = Arc::new(MetricsSink::new());
        let checker = SplitChecker::new(rule_manager, labeler, metrics.clone());
        (checker, metrics)
    }

    fn snapshot(rules_enabled: bool) -> ClusterSnapshot {
        ClusterSnapshot::builder()
            .placement_rules(rules_enabled)
            .build()
    }

    #[test]
    fn test_rule_boundary_split() {
        let (checker, _) = checker(rule_with_boundary_at_f(), Arc::new(KeyRangeLabeler::new()));
        let op = checker.check(&snapshot(true), &region_a_to_m()).unwrap();

        assert_eq!(op.desc, "rule-split-region");
        assert_eq!(
            op.steps(),
            &[OpStep::SplitRegion { split_keys: vec![b"f".to_vec()] }]
        );
    }

    #[test]
    fn test_labeler_takes_precedence_over_rules() {
        let labeler = Arc::new(KeyRangeLabeler::new());
        labeler.set_rules(vec![LabelRule {
            id: "hot".to_string(),
            labels: Vec::new(),
            start_key: b"h".to_vec(),
            end_key: b"m".to_vec(),
        }]);
        let (checker, _) = checker(rule_with_boundary_at_f(), labeler);
        let op = checker.check(&snapshot(true), &region_a_to_m()).unwrap();

        assert_eq!(op.desc, "labeler-split-region");
        assert_eq!(
            op.steps(),
            &[OpStep::SplitRegion { split_keys: vec![b"h".to_vec()] }]
        );
    }

    #[test]
    fn test_rules_disabled_declines_rule_split() {
        let (checker, _) = checker(rule_with_boundary_at_f(), Arc::new(KeyRangeLabeler::new()));
        assert!(checker.check(&snapshot(false), &region_a_to_m()).is_none());
    }

    #[test]
    fn test_no_boundaries_declines() {
        let (checker, _) = checker(Arc::new(RuleManager::new(3)), Arc::new(KeyRangeLabeler::new()));
        assert!(checker.check(&snapshot(true), &region_a_to_m()).is_none());
    }

    #[test]
    fn test_paused_skip_counts_once() {
        let (checker, metrics) =
            checker(rule_with_boundary_at_f(), Arc::new(KeyRangeLabeler::new()));
        checker.pause_controller().pause(std::time::Duration::from_secs(3600));

        assert!(checker.check(&snapshot(true), &region_a_to_m()).is_none());
        assert_eq!(metrics.get("split-checker"), 1);
        assert_eq!(metrics.get("split-checker-paused"), 1);
    }
}
