//! Placement checkers
//!
//! Each checker inspects one region against the snapshot, the rule manager
//! and the labeler, and either produces an operator or declines. Checkers
//! are pure functions of their inputs apart from the pause flag and metric
//! counters, and are invoked by an external scheduling loop once per region
//! per tick.

mod joint;
mod merge;
mod replica;
mod rule;
mod split;

pub use joint::JointStateChecker;
pub use merge::MergeChecker;
pub use replica::ReplicaChecker;
pub use rule::RuleChecker;
pub use split::SplitChecker;

use std::sync::Arc;

use rp_core::{ClusterSnapshot, Region};

use crate::config::ScheduleConfig;
use crate::id::IdAllocator;
use crate::labeler::RegionLabeler;
use crate::metrics::MetricsSink;
use crate::operator::{Operator, OperatorController};
use crate::placement::RuleManager;

/// Diagnostic unit producing at most one operator per invocation
pub trait Checker: Send + Sync {
    /// Checker type name, e.g. `"split-checker"`
    fn type_name(&self) -> &'static str;

    /// Whether this checker is administratively paused
    fn is_paused(&self) -> bool;

    /// Inspect one region; `None` means nothing actionable
    fn check(&self, snapshot: &ClusterSnapshot, region: &Region) -> Option<Operator>;
}

/// Explicit ordered set of checkers
///
/// The first checker producing an operator wins for a given region; order is
/// therefore part of policy: stale joint states are finished before anything
/// else, boundaries are corrected before replica repair, and merges run last.
#[derive(Default)]
pub struct CheckerRegistry {
    checkers: Vec<Arc<dyn Checker>>,
}

impl CheckerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a checker; earlier registrations take precedence
    pub fn register(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.push(checker);
    }

    /// The standard checker set in standard order
    #[allow(clippy::too_many_arguments)]
    pub fn standard(
        config: Arc<ScheduleConfig>,
        rule_manager: Arc<RuleManager>,
        labeler: Arc<dyn RegionLabeler>,
        id_allocator: Arc<dyn IdAllocator>,
        controller: Arc<OperatorController>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JointStateChecker::new(metrics.clone())));
        registry.register(Arc::new(SplitChecker::new(
            rule_manager.clone(),
            labeler,
            metrics.clone(),
        )));
        registry.register(Arc::new(RuleChecker::new(
            config.clone(),
            rule_manager.clone(),
            id_allocator.clone(),
            metrics.clone(),
        )));
        registry.register(Arc::new(ReplicaChecker::new(
            config.clone(),
            id_allocator,
            metrics.clone(),
        )));
        registry.register(Arc::new(MergeChecker::new(
            config,
            rule_manager,
            controller,
            metrics,
        )));
        registry
    }

    /// Run the registered checkers in order; the first operator wins
    pub fn check_region(&self, snapshot: &ClusterSnapshot, region: &Region) -> Option<Operator> {
        self.checkers
            .iter()
            .find_map(|c| c.check(snapshot, region))
    }

    /// The registered checkers, in order
    pub fn checkers(&self) -> &[Arc<dyn Checker>] {
        &self.checkers
    }
}
