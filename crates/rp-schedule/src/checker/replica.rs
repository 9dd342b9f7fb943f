//! Replica checker
//!
//! Plain replica-count repair for clusters that have not enabled placement
//! rules: keep every region at the configured voter count, replace replicas
//! stuck on dead or draining stores, and spread replicas across the
//! configured location labels. One category of repair per invocation; the
//! next tick picks up whatever remains.

use std::sync::Arc;

use tracing::debug;

use rp_core::{ClusterSnapshot, Peer, Region, StoreId};

use crate::config::ScheduleConfig;
use crate::id::IdAllocator;
use crate::metrics::MetricsSink;
use crate::operator::{build_change_steps, ChangePlan, OpKind, OpPriority, Operator};
use crate::pause::PauseController;
use crate::placement::pick_store;

use super::Checker;

/// Keeps regions at the configured replica count
pub struct ReplicaChecker {
    config: Arc<ScheduleConfig>,
    id_allocator: Arc<dyn IdAllocator>,
    metrics: Arc<MetricsSink>,
    pause: PauseController,
}

impl ReplicaChecker {
    /// Create a replica checker
    pub fn new(
        config: Arc<ScheduleConfig>,
        id_allocator: Arc<dyn IdAllocator>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            config,
            id_allocator,
            metrics,
            pause: PauseController::new(),
        }
    }

    /// Pause switch for administrative control
    pub fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    fn build(
        &self,
        region: &Region,
        desc: &'static str,
        priority: OpPriority,
        plan: &ChangePlan,
    ) -> Option<Operator> {
        let steps = match build_change_steps(region, plan) {
            Ok(steps) => steps,
            Err(e) => {
                debug!("replica repair plan rejected for region {}: {}", region.id, e);
                return None;
            }
        };
        match Operator::new(region, desc, OpKind::ReplicaRepair, priority, steps) {
            Ok(op) => {
                self.metrics.incr("replica-checker-operator");
                Some(op)
            }
            Err(e) => {
                debug!("create replica repair operator failed: {}", e);
                None
            }
        }
    }

    /// Replace `victims`, adding one substitute per replaced peer.
    fn replace(
        &self,
        snapshot: &ClusterSnapshot,
        region: &Region,
        victims: &[Peer],
        desc: &'static str,
        priority: OpPriority,
    ) -> Option<Operator> {
        let mut plan = ChangePlan::new();
        let mut occupied: Vec<StoreId> = region.peers.iter().map(|p| p.store_id).collect();
        for victim in victims {
            if let Some(store) =
                pick_store(snapshot, &occupied, &self.config.location_labels, |_| true)
            {
                occupied.push(store);
                plan.add_voters.push((store, self.id_allocator.alloc()));
            }
            plan.remove.push(*victim);
        }
        self.build(region, desc, priority, &plan)
    }
}

impl Checker for ReplicaChecker {
    fn type_name(&self) -> &'static str {
        "replica-checker"
    }

    fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    fn check(&self, snapshot: &ClusterSnapshot, region: &Region) -> Option<Operator> {
        self.metrics.incr("replica-checker");
        if self.is_paused() {
            self.metrics.incr("replica-checker-paused");
            return None;
        }
        if snapshot.placement_rules_enabled() {
            return None;
        }
        if region.in_joint_state() {
            return None;
        }

        // Replicas down past the staleness threshold are treated as lost.
        let down: Vec<Peer> = region
            .down_peers
            .iter()
            .filter(|d| d.down_secs >= self.config.max_store_down_secs)
            .filter_map(|d| region.peer(d.peer.id).copied())
            .collect();
        if !down.is_empty() {
            return self.replace(
                snapshot,
                region,
                &down,
                "replace-down-replica",
                OpPriority::High,
            );
        }

        // Replicas on draining or vanished stores move off before the store
        // goes away entirely.
        let offline: Vec<Peer> = region
            .peers
            .iter()
            .filter(|p| match snapshot.store(p.store_id) {
                Some(store) => store.is_removing(),
                None => true,
            })
            .copied()
            .collect();
        if !offline.is_empty() {
            return self.replace(
                snapshot,
                region,
                &offline,
                "replace-offline-replica",
                OpPriority::Normal,
            );
        }

        let voters = region.voters();
        if voters.len() < self.config.max_replicas {
            let mut plan = ChangePlan::new();
            let mut occupied: Vec<StoreId> = region.peers.iter().map(|p| p.store_id).collect();
            for _ in voters.len()..self.config.max_replicas {
                match pick_store(snapshot, &occupied, &self.config.location_labels, |_| true) {
                    Some(store) => {
                        occupied.push(store);
                        plan.add_voters.push((store, self.id_allocator.alloc()));
                    }
                    None => break,
                }
            }
            if plan.is_empty() {
                debug!("region {} under-replicated but no store qualifies", region.id);
                return None;
            }
            return self.build(region, "make-up-replica", OpPriority::High, &plan);
        }

        if voters.len() > self.config.max_replicas {
            // Prefer shedding load from the busiest store; never pick the
            // leader's replica when another voter qualifies.
            let extra = voters
                .iter()
                .filter(|p| Some(p.id) != region.leader)
                .max_by_key(|p| {
                    snapshot
                        .store(p.store_id)
                        .map(|s| s.region_count)
                        .unwrap_or(u64::MAX)
                })
                .or_else(|| voters.first())?;
            let mut plan = ChangePlan::new();
            plan.remove.push(**extra);
            return self.build(region, "remove-extra-replica", OpPriority::Normal, &plan);
        }

        None
    }
}
