//! Rule checker
//!
//! Repairs a region whose replicas do not satisfy the placement rules:
//! adds peers for deficient rules, replaces peers stuck on down or offline
//! stores, fixes role drift, and removes orphans. Whenever the resulting
//! plan would change the voter set more than once, the steps collapse into
//! a single joint change so no intermediate configuration can lose a common
//! majority.

use std::sync::Arc;

use tracing::debug;

use rp_core::{ClusterSnapshot, Peer, Region, StoreId};

use crate::config::ScheduleConfig;
use crate::id::IdAllocator;
use crate::metrics::MetricsSink;
use crate::operator::{build_change_steps, ChangePlan, OpKind, OpPriority, OpStep, Operator};
use crate::pause::PauseController;
use crate::placement::{pick_store, RuleManager, RuleRole};

use super::Checker;

/// Repairs placement-rule violations
pub struct RuleChecker {
    config: Arc<ScheduleConfig>,
    rule_manager: Arc<RuleManager>,
    id_allocator: Arc<dyn IdAllocator>,
    metrics: Arc<MetricsSink>,
    pause: PauseController,
}

impl RuleChecker {
    /// Create a rule checker
    pub fn new(
        config: Arc<ScheduleConfig>,
        rule_manager: Arc<RuleManager>,
        id_allocator: Arc<dyn IdAllocator>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            config,
            rule_manager,
            id_allocator,
            metrics,
            pause: PauseController::new(),
        }
    }

    /// Pause switch for administrative control
    pub fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    /// Peers that must be replaced: hosted on a missing/removing store or
    /// reported down past the staleness threshold.
    fn peers_to_replace(&self, snapshot: &ClusterSnapshot, region: &Region) -> Vec<Peer> {
        let mut out = Vec::new();
        for peer in &region.peers {
            let store_gone = match snapshot.store(peer.store_id) {
                Some(store) => store.is_removing(),
                None => true,
            };
            let down_too_long = region
                .down_peers
                .iter()
                .any(|d| d.peer.id == peer.id && d.down_secs >= self.config.max_store_down_secs);
            if store_gone || down_too_long {
                out.push(*peer);
            }
        }
        out
    }
}

impl Checker for RuleChecker {
    fn type_name(&self) -> &'static str {
        "rule-checker"
    }

    fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    fn check(&self, snapshot: &ClusterSnapshot, region: &Region) -> Option<Operator> {
        self.metrics.incr("rule-checker");
        if self.is_paused() {
            self.metrics.incr("rule-checker-paused");
            return None;
        }
        if !snapshot.placement_rules_enabled() {
            return None;
        }
        // Unfinished joint changes are the joint-state checker's to fix.
        if region.in_joint_state() {
            return None;
        }

        let fit = self.rule_manager.fit_region(snapshot, region);
        let replace = self.peers_to_replace(snapshot, region);
        if !fit.needs_repair() && replace.is_empty() {
            return None;
        }

        let mut plan = ChangePlan::new();
        let mut desc = "remove-orphan-peer";
        let mut occupied: Vec<StoreId> = region.peers.iter().map(|p| p.store_id).collect();

        for matched in &fit.matched {
            // Replacements re-satisfy the rule the bad peer was assigned to.
            let bad: Vec<&Peer> = matched
                .peers
                .iter()
                .filter(|p| replace.iter().any(|r| r.id == p.id))
                .collect();
            let wanted = matched.missing() + bad.len();

            for _ in 0..wanted {
                let picked = pick_store(snapshot, &occupied, &matched.rule.location_labels, |s| {
                    matched.rule.matches_store(s)
                });
                match picked {
                    Some(store) => {
                        let peer_id = self.id_allocator.alloc();
                        occupied.push(store);
                        if matched.rule.role == RuleRole::Learner {
                            plan.add_learners.push((store, peer_id));
                        } else {
                            plan.add_voters.push((store, peer_id));
                        }
                        desc = if bad.is_empty() {
                            "add-rule-peer"
                        } else {
                            "replace-rule-peer"
                        };
                    }
                    None => {
                        // Unsatisfiable here and now; repair what we can and
                        // let a later pass finish once stores qualify.
                        debug!(
                            "no store satisfies rule {}/{} for region {}",
                            matched.rule.group_id, matched.rule.id, region.id
                        );
                        break;
                    }
                }
            }

            for peer in bad {
                plan.remove.push(*peer);
                desc = "replace-rule-peer";
            }

            for peer in matched.role_drift() {
                if replace.iter().any(|r| r.id == peer.id) {
                    continue;
                }
                if matched.rule.role == RuleRole::Learner {
                    plan.demote.push(*peer);
                } else {
                    plan.promote.push(*peer);
                }
                desc = "fix-peer-role";
            }
        }

        for orphan in &fit.orphan_peers {
            plan.remove.push(*orphan);
        }

        if plan.is_empty() {
            // The only drift left may be leadership demanded by a leader rule.
            for matched in &fit.matched {
                if matched.rule.role != RuleRole::Leader {
                    continue;
                }
                let holds_leader = matched
                    .peers
                    .iter()
                    .any(|p| Some(p.id) == region.leader);
                if holds_leader {
                    continue;
                }
                let (from, to) = match (region.leader_store(), matched.peers.first()) {
                    (Some(from), Some(to)) => (from, to.store_id),
                    _ => continue,
                };
                let steps = vec![OpStep::TransferLeader { from_store: from, to_store: to }];
                return match Operator::new(
                    region,
                    "fix-leader-role",
                    OpKind::RuleRepair,
                    OpPriority::Normal,
                    steps,
                ) {
                    Ok(op) => {
                        self.metrics.incr("rule-checker-operator");
                        Some(op.with_rule_version(fit.rule_version))
                    }
                    Err(e) => {
                        debug!("create leader-fix operator failed: {}", e);
                        None
                    }
                };
            }
            return None;
        }

        let steps = match build_change_steps(region, &plan) {
            Ok(steps) => steps,
            Err(e) => {
                debug!(
                    "rule repair plan rejected for region {}: {}",
                    region.id, e
                );
                return None;
            }
        };
        match Operator::new(region, desc, OpKind::RuleRepair, OpPriority::Normal, steps) {
            Ok(op) => {
                self.metrics.incr("rule-checker-operator");
                Some(op.with_rule_version(fit.rule_version))
            }
            Err(e) => {
                debug!("create rule repair operator failed: {}", e);
                None
            }
        }
    }
}
