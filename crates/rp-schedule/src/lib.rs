//! RangePilot placement reconciliation engine
//!
//! Diagnoses region placement problems against a point-in-time cluster
//! snapshot and drives repair plans (operators) to completion:
//! - Placement rules and the rule-fitting algorithm
//! - Checkers (split, rule, replica, merge, joint-state)
//! - The operator model and its lifecycle state machine
//! - The operator controller (admission, limits, tracking, expiry)
//!
//! # Usage Example
//! ```ignore
//! use rp_schedule::{CheckerRegistry, OperatorController, RuleManager, ScheduleConfig};
//!
//! let registry = CheckerRegistry::standard(/* wiring */);
//! for region in snapshot.regions() {
//!     if let Some(op) = registry.check_region(&snapshot, region) {
//!         let _ = controller.submit(op);
//!     }
//! }
//! ```

pub mod checker;
pub mod config;
pub mod id;
pub mod labeler;
pub mod metrics;
pub mod operator;
pub mod pause;
pub mod placement;

// Re-export commonly used types
pub use checker::{Checker, CheckerRegistry};
pub use config::ScheduleConfig;
pub use id::{IdAllocator, SequentialIdAllocator};
pub use labeler::{KeyRangeLabeler, LabelRule, RegionLabeler};
pub use metrics::MetricsSink;
pub use operator::{
    AdmissionError, OpKind, OpKindClass, OpPriority, OpStatus, OpStep, Operator,
    OperatorController, OperatorError,
};
pub use pause::PauseController;
pub use placement::{ConstraintOp, LabelConstraint, Rule, RuleError, RuleFit, RuleManager, RuleRole};
