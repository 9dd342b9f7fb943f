//! Operator controller
//!
//! The single owner of live operators. Admits candidates (conflict and
//! concurrency checks), hands out steps for external dispatch, tracks
//! completions reported back from heartbeats, and finalizes terminal states.
//! All bookkeeping lives behind one mutex: candidate production from many
//! concurrent checkers and completion reporting from many heartbeat handlers
//! both race against it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rp_core::{RegionEpoch, RegionId, StoreId};

use crate::config::ScheduleConfig;
use crate::metrics::MetricsSink;
use crate::placement::RuleManager;

use super::step::{OpKindClass, OpStep};
use super::{OpStatus, Operator};

/// Why a candidate operator was refused admission
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("region {0} already has a live operator")]
    Conflict(RegionId),
    #[error("store {store} is at its {class} operator ceiling")]
    ExceedsStoreLimit { store: StoreId, class: OpKindClass },
}

/// A live operator with its reserved concurrency slots
#[derive(Debug)]
struct OperatorRecord {
    op: Operator,
    slots: Vec<(StoreId, OpKindClass)>,
    /// Guards against double-release of concurrency slots
    released: bool,
}

#[derive(Debug, Default)]
struct ControllerInner {
    /// Live operators, at most one per region
    operators: HashMap<RegionId, OperatorRecord>,
    /// In-flight operator counts per (store, class)
    store_slots: HashMap<(StoreId, OpKindClass), usize>,
    /// Recent terminal operators, newest first
    finished: VecDeque<Operator>,
}

impl ControllerInner {
    fn slot_count(&self, store: StoreId, class: OpKindClass) -> usize {
        self.store_slots.get(&(store, class)).copied().unwrap_or(0)
    }

    fn reserve(&mut self, slots: &[(StoreId, OpKindClass)]) {
        for slot in slots {
            *self.store_slots.entry(*slot).or_insert(0) += 1;
        }
    }

    fn release(&mut self, record: &mut OperatorRecord) {
        if record.released {
            return;
        }
        record.released = true;
        for slot in &record.slots {
            if let Some(count) = self.store_slots.get_mut(slot) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.store_slots.remove(slot);
                }
            }
        }
    }

    /// Finalize a record: release slots exactly once and archive it.
    fn finish(&mut self, mut record: OperatorRecord, status: OpStatus, history: usize) {
        record.op.finish(status);
        self.release(&mut record);
        info!("{}", record.op);
        self.finished.push_front(record.op);
        while self.finished.len() > history {
            self.finished.pop_back();
        }
    }
}

/// Admits, limits and tracks execution of operators
pub struct OperatorController {
    config: Arc<ScheduleConfig>,
    rule_manager: Arc<RuleManager>,
    metrics: Arc<MetricsSink>,
    inner: Mutex<ControllerInner>,
}

impl OperatorController {
    /// Create a controller
    pub fn new(
        config: Arc<ScheduleConfig>,
        rule_manager: Arc<RuleManager>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            config,
            rule_manager,
            metrics,
            inner: Mutex::new(ControllerInner::default()),
        }
    }

    fn ceiling(&self, class: OpKindClass) -> usize {
        match class {
            OpKindClass::Leader => self.config.leader_store_limit,
            OpKindClass::Region => self.config.region_store_limit,
        }
    }

    /// Admit a candidate operator.
    ///
    /// At most one live operator per region: a candidate for a busy region
    /// preempts the incumbent only when it has strictly higher priority and
    /// the incumbent has not started; otherwise it is rejected. A candidate
    /// that would push any involved store past its ceiling is rejected, not
    /// queued; the producing checker re-proposes on its next pass.
    pub fn submit(&self, op: Operator) -> Result<(), AdmissionError> {
        let slots = op.store_slots();
        let mut inner = self.inner.lock();

        let preempting = match inner.operators.get(&op.region_id) {
            Some(incumbent) => {
                let preemptable = incumbent.op.status() == OpStatus::Created
                    && op.priority > incumbent.op.priority;
                if !preemptable {
                    self.metrics.incr("operator-reject-conflict");
                    return Err(AdmissionError::Conflict(op.region_id));
                }
                true
            }
            None => false,
        };

        // Ceilings are checked before the incumbent is touched, with the
        // incumbent's slots counted as released: a candidate that fails
        // admission must leave the incumbent live, and one that replaces
        // the incumbent should reuse the slots it frees.
        for (store, class) in &slots {
            let mut in_flight = inner.slot_count(*store, *class);
            if preempting {
                let incumbent = &inner.operators[&op.region_id];
                if incumbent.slots.contains(&(*store, *class)) {
                    in_flight = in_flight.saturating_sub(1);
                }
            }
            if in_flight + 1 > self.ceiling(*class) {
                self.metrics.incr("operator-reject-limit");
                return Err(AdmissionError::ExceedsStoreLimit {
                    store: *store,
                    class: *class,
                });
            }
        }

        if preempting {
            if let Some(record) = inner.operators.remove(&op.region_id) {
                debug!(
                    "Preempting pending operator for region {}: {} -> {}",
                    op.region_id, record.op.desc, op.desc
                );
                let history = self.config.finished_operator_history;
                inner.finish(record, OpStatus::Replaced, history);
                self.metrics.incr("operator-replaced");
            }
        }

        inner.reserve(&slots);
        info!(
            "Operator admitted for region {}: {} ({} steps)",
            op.region_id,
            op.desc,
            op.steps().len()
        );
        self.metrics.incr("operator-admitted");
        inner.operators.insert(
            op.region_id,
            OperatorRecord {
                op,
                slots,
                released: false,
            },
        );
        Ok(())
    }

    /// Hand out the next step of a region's operator for external dispatch.
    ///
    /// Re-validates rule-driven operators against the current rule-set
    /// version: a plan derived from rules that no longer exist is canceled
    /// here rather than executed. Marks the operator started on first call.
    pub fn dispatch(&self, region_id: RegionId) -> Option<OpStep> {
        let mut inner = self.inner.lock();

        let current_version = self.rule_manager.version();
        let rule_stale = inner
            .operators
            .get(&region_id)?
            .op
            .rule_version
            .is_some_and(|v| v != current_version);
        if rule_stale {
            warn!(
                "Canceling operator for region {}: rule set changed (now version {})",
                region_id, current_version
            );
            let record = inner.operators.remove(&region_id)?;
            let history = self.config.finished_operator_history;
            inner.finish(record, OpStatus::Canceled, history);
            self.metrics.incr("operator-canceled-stale-rules");
            return None;
        }

        let record = inner.operators.get_mut(&region_id)?;
        record.op.mark_started();
        record.op.current_step().cloned()
    }

    /// Record completion of the current step, reported by the external
    /// heartbeat handler along with the region's epoch at report time.
    ///
    /// A report carrying an epoch older than the operator's creation epoch
    /// is stale and ignored. Returns the operator's status after the report.
    pub fn report_step_complete(
        &self,
        region_id: RegionId,
        reported_epoch: RegionEpoch,
    ) -> Option<OpStatus> {
        let mut inner = self.inner.lock();
        let record = inner.operators.get_mut(&region_id)?;

        if record.op.region_epoch.is_newer_than(&reported_epoch) {
            debug!(
                "Ignoring stale step report for region {}: {} < {}",
                region_id, reported_epoch, record.op.region_epoch
            );
            return Some(record.op.status());
        }

        if record.op.status() != OpStatus::Started {
            return Some(record.op.status());
        }

        if record.op.advance() {
            let record = inner.operators.remove(&region_id)?;
            let history = self.config.finished_operator_history;
            inner.finish(record, OpStatus::Success, history);
            self.metrics.incr("operator-success");
            return Some(OpStatus::Success);
        }
        Some(OpStatus::Started)
    }

    /// Cancel a region's live operator, cooperatively: the flag takes effect
    /// at this state-transition point, never by unwinding a dispatched step.
    pub fn cancel(&self, region_id: RegionId) -> bool {
        let mut inner = self.inner.lock();
        match inner.operators.remove(&region_id) {
            Some(record) => {
                let history = self.config.finished_operator_history;
                inner.finish(record, OpStatus::Canceled, history);
                self.metrics.incr("operator-canceled");
                true
            }
            None => false,
        }
    }

    /// Terminate every live operator past its deadline. Returns how many
    /// were terminated.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let expired: Vec<RegionId> = inner
            .operators
            .iter()
            .filter(|(_, r)| r.op.is_past_deadline(now))
            .map(|(id, _)| *id)
            .collect();

        for region_id in &expired {
            if let Some(record) = inner.operators.remove(region_id) {
                // A never-dispatched operator expires; a started one times out.
                let status = if record.op.status() == OpStatus::Started {
                    OpStatus::Timeout
                } else {
                    OpStatus::Expired
                };
                warn!(
                    "Operator for region {} past deadline after {}s: {}",
                    region_id,
                    record.op.max_duration_secs(),
                    status
                );
                let history = self.config.finished_operator_history;
                inner.finish(record, status, history);
                self.metrics.incr("operator-expired");
            }
        }
        expired.len()
    }

    /// Spawn the periodic expiry sweep task
    pub fn start_expiry_sweep(self: Arc<Self>) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let swept = self.sweep_expired();
                if swept > 0 {
                    info!("Expiry sweep terminated {} operators", swept);
                }
            }
        })
    }

    /// Whether a region has a live operator
    pub fn has_live(&self, region_id: RegionId) -> bool {
        self.inner.lock().operators.contains_key(&region_id)
    }

    /// Snapshot of a region's live operator
    pub fn get(&self, region_id: RegionId) -> Option<Operator> {
        self.inner.lock().operators.get(&region_id).map(|r| r.op.clone())
    }

    /// Number of live operators
    pub fn live_count(&self) -> usize {
        self.inner.lock().operators.len()
    }

    /// In-flight operator count for one (store, class) slot
    pub fn store_in_flight(&self, store: StoreId, class: OpKindClass) -> usize {
        self.inner.lock().slot_count(store, class)
    }

    /// Recent terminal operators, newest first
    pub fn finished_recent(&self) -> Vec<Operator> {
        self.inner.lock().finished.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{OpKind, OpPriority};
    use rp_core::{Peer, PeerRole, Region};

    fn region(id: RegionId) -> Region {
        let mut r = Region::new(id, vec![id as u8], vec![id as u8 + 1]);
        r.peers = vec![
            Peer::new(id * 10 + 1, 1, PeerRole::Voter),
            Peer::new(id * 10 + 2, 2, PeerRole::Voter),
            Peer::new(id * 10 + 3, 3, PeerRole::Voter),
        ];
        r.leader = Some(id * 10 + 1);
        r
    }

    fn add_peer_op(r: &Region, store: StoreId, priority: OpPriority) -> Operator {
        let steps = vec![OpStep::AddPeer {
            store_id: store,
            peer_id: 900 + r.id,
            role: PeerRole::Learner,
        }];
        Operator::new(r, "test-add", OpKind::ReplicaRepair, priority, steps).unwrap()
    }

    fn controller() -> OperatorController {
        controller_with(ScheduleConfig::default())
    }

    fn controller_with(config: ScheduleConfig) -> OperatorController {
        OperatorController::new(
            Arc::new(config),
            Arc::new(RuleManager::new(3)),
            Arc::new(MetricsSink::new()),
        )
    }

    #[test]
    fn test_one_live_operator_per_region() {
        let ctl = controller();
        let r = region(1);
        ctl.submit(add_peer_op(&r, 4, OpPriority::Normal)).unwrap();
        let err = ctl.submit(add_peer_op(&r, 5, OpPriority::Normal));
        assert!(matches!(err, Err(AdmissionError::Conflict(1))));
        assert_eq!(ctl.live_count(), 1);
    }

    #[test]
    fn test_higher_priority_preempts_pending() {
        let ctl = controller();
        let r = region(1);
        ctl.submit(add_peer_op(&r, 4, OpPriority::Normal)).unwrap();
        ctl.submit(add_peer_op(&r, 5, OpPriority::High)).unwrap();

        assert_eq!(ctl.live_count(), 1);
        let finished = ctl.finished_recent();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status(), OpStatus::Replaced);
    }

    #[test]
    fn test_started_operator_not_preempted() {
        let ctl = controller();
        let r = region(1);
        ctl.submit(add_peer_op(&r, 4, OpPriority::Normal)).unwrap();
        ctl.dispatch(r.id).unwrap();

        let err = ctl.submit(add_peer_op(&r, 5, OpPriority::Urgent));
        assert!(matches!(err, Err(AdmissionError::Conflict(1))));
    }

    #[test]
    fn test_store_ceiling_rejects_not_queues() {
        let mut config = ScheduleConfig::default();
        config.region_store_limit = 1;
        let ctl = controller_with(config);

        ctl.submit(add_peer_op(&region(1), 4, OpPriority::Normal))
            .unwrap();
        let err = ctl.submit(add_peer_op(&region(2), 4, OpPriority::Normal));
        assert!(matches!(
            err,
            Err(AdmissionError::ExceedsStoreLimit { store: 4, .. })
        ));
        // A different store is unaffected.
        ctl.submit(add_peer_op(&region(3), 5, OpPriority::Normal))
            .unwrap();
    }

    #[test]
    fn test_rejected_preemption_keeps_incumbent() {
        let mut config = ScheduleConfig::default();
        config.region_store_limit = 1;
        let ctl = controller_with(config);

        // Saturate store 5 through another region.
        ctl.submit(add_peer_op(&region(2), 5, OpPriority::Normal))
            .unwrap();
        ctl.submit(add_peer_op(&region(1), 4, OpPriority::Normal))
            .unwrap();

        // The urgent candidate outranks the incumbent but cannot fit
        // store 5; the incumbent must survive untouched.
        let err = ctl.submit(add_peer_op(&region(1), 5, OpPriority::Urgent));
        assert!(matches!(
            err,
            Err(AdmissionError::ExceedsStoreLimit { store: 5, .. })
        ));
        assert!(ctl.has_live(1));
        assert_eq!(ctl.get(1).unwrap().priority, OpPriority::Normal);
        assert!(ctl.finished_recent().is_empty());
        assert_eq!(ctl.store_in_flight(4, OpKindClass::Region), 1);
    }

    #[test]
    fn test_preemption_reuses_incumbent_slot_at_ceiling() {
        let mut config = ScheduleConfig::default();
        config.region_store_limit = 1;
        let ctl = controller_with(config);

        ctl.submit(add_peer_op(&region(1), 4, OpPriority::Normal))
            .unwrap();
        // Same store, higher priority: the incumbent's slot is freed by the
        // replacement, so the ceiling of one is not exceeded.
        ctl.submit(add_peer_op(&region(1), 4, OpPriority::High))
            .unwrap();

        assert_eq!(ctl.get(1).unwrap().priority, OpPriority::High);
        assert_eq!(ctl.store_in_flight(4, OpKindClass::Region), 1);
        assert_eq!(ctl.finished_recent()[0].status(), OpStatus::Replaced);
    }

    #[test]
    fn test_concurrent_submits_never_exceed_ceiling() {
        let mut config = ScheduleConfig::default();
        config.region_store_limit = 2;
        let ctl = Arc::new(controller_with(config));

        let handles: Vec<_> = (1..=8u64)
            .map(|id| {
                let ctl = ctl.clone();
                std::thread::spawn(move || {
                    ctl.submit(add_peer_op(&region(id), 9, OpPriority::Normal))
                        .is_ok()
                })
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 2);
        assert_eq!(ctl.live_count(), 2);
        assert_eq!(ctl.store_in_flight(9, OpKindClass::Region), 2);
    }

    #[test]
    fn test_success_path_releases_slot_once() {
        let ctl = controller();
        let r = region(1);
        ctl.submit(add_peer_op(&r, 4, OpPriority::Normal)).unwrap();
        assert_eq!(ctl.store_in_flight(4, OpKindClass::Region), 1);

        ctl.dispatch(r.id).unwrap();
        let status = ctl.report_step_complete(r.id, r.epoch).unwrap();
        assert_eq!(status, OpStatus::Success);
        assert_eq!(ctl.store_in_flight(4, OpKindClass::Region), 0);
        assert!(!ctl.has_live(r.id));

        // Duplicate completion reports for a finished operator are no-ops.
        assert!(ctl.report_step_complete(r.id, r.epoch).is_none());
        assert_eq!(ctl.store_in_flight(4, OpKindClass::Region), 0);
    }

    #[test]
    fn test_stale_epoch_report_ignored() {
        let ctl = controller();
        let mut r = region(1);
        r.epoch = RegionEpoch::new(5, 5);
        ctl.submit(add_peer_op(&r, 4, OpPriority::Normal)).unwrap();
        ctl.dispatch(r.id).unwrap();

        let status = ctl
            .report_step_complete(r.id, RegionEpoch::new(4, 5))
            .unwrap();
        assert_eq!(status, OpStatus::Started);
        assert!(ctl.has_live(r.id));
    }

    #[test]
    fn test_sweep_expires_pending_and_times_out_started() {
        let ctl = controller();
        let r1 = region(1);
        let r2 = region(2);
        let pending = add_peer_op(&r1, 4, OpPriority::Normal).with_max_duration_secs(0);
        let started = add_peer_op(&r2, 5, OpPriority::Normal).with_max_duration_secs(0);
        ctl.submit(pending).unwrap();
        ctl.submit(started).unwrap();
        ctl.dispatch(r2.id).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1100));
        let swept = ctl.sweep_expired();
        assert_eq!(swept, 2);
        assert_eq!(ctl.store_in_flight(4, OpKindClass::Region), 0);
        assert_eq!(ctl.store_in_flight(5, OpKindClass::Region), 0);

        let statuses: Vec<OpStatus> = ctl
            .finished_recent()
            .iter()
            .map(|op| op.status())
            .collect();
        assert!(statuses.contains(&OpStatus::Expired));
        assert!(statuses.contains(&OpStatus::Timeout));
    }

    #[test]
    fn test_dispatch_cancels_on_rule_version_change() {
        let rule_manager = Arc::new(RuleManager::new(3));
        let ctl = OperatorController::new(
            Arc::new(ScheduleConfig::default()),
            rule_manager.clone(),
            Arc::new(MetricsSink::new()),
        );
        let r = region(1);
        let op = add_peer_op(&r, 4, OpPriority::Normal).with_rule_version(rule_manager.version());
        ctl.submit(op).unwrap();

        rule_manager.set_rules(Vec::new()).unwrap();
        assert!(ctl.dispatch(r.id).is_none());
        assert!(!ctl.has_live(r.id));
        assert_eq!(ctl.finished_recent()[0].status(), OpStatus::Canceled);
    }

    #[test]
    fn test_cancel_live_operator() {
        let ctl = controller();
        let r = region(1);
        ctl.submit(add_peer_op(&r, 4, OpPriority::Normal)).unwrap();
        assert!(ctl.cancel(r.id));
        assert!(!ctl.cancel(r.id));
        assert_eq!(ctl.store_in_flight(4, OpKindClass::Region), 0);
    }
}
