//! Placement rule management
//!
//! Stores the in-memory rule set (fed from external persistence), computes
//! rule-implied split boundaries, and fits a region's replicas to rules.

mod fit;
mod rule;

pub use fit::{MatchedRule, RuleFit};
pub use rule::{ConstraintOp, LabelConstraint, Rule, RuleRole};

pub(crate) use fit::{isolation_score, pick_store};

use parking_lot::RwLock;
use tracing::info;

use rp_core::{keys, ClusterSnapshot, Key, Region};

/// Rule validation or ingestion failure
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("rule {group}/{id} requires a positive replica count")]
    ZeroCount { group: String, id: String },
    #[error("rule {group}/{id} has an inverted key range")]
    InvertedRange { group: String, id: String },
    #[error("duplicate rule {group}/{id}")]
    Duplicate { group: String, id: String },
    #[error("rule decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Versioned rule set
#[derive(Debug)]
struct RuleSet {
    /// Rules in resolution order
    rules: Vec<Rule>,
    /// Bumped on every administrative update
    version: u64,
}

/// Placement rule manager
///
/// Reads vastly outnumber administrative writes, so the rule set lives
/// behind a single `RwLock` and every read path clones what it needs.
#[derive(Debug)]
pub struct RuleManager {
    inner: RwLock<RuleSet>,
}

impl RuleManager {
    /// Create a manager holding one default full-range voter rule
    pub fn new(default_replicas: usize) -> Self {
        let default_rule = Rule {
            group_id: "rp".to_string(),
            id: "default".to_string(),
            index: 0,
            start_key: Vec::new(),
            end_key: Vec::new(),
            role: RuleRole::Voter,
            count: default_replicas,
            label_constraints: Vec::new(),
            location_labels: Vec::new(),
        };
        Self {
            inner: RwLock::new(RuleSet {
                rules: vec![default_rule],
                version: 1,
            }),
        }
    }

    /// Replace the full rule set, bumping the version
    pub fn set_rules(&self, mut rules: Vec<Rule>) -> Result<(), RuleError> {
        for rule in &rules {
            if rule.count == 0 {
                return Err(RuleError::ZeroCount {
                    group: rule.group_id.clone(),
                    id: rule.id.clone(),
                });
            }
            if !rule.end_key.is_empty() && rule.start_key >= rule.end_key {
                return Err(RuleError::InvertedRange {
                    group: rule.group_id.clone(),
                    id: rule.id.clone(),
                });
            }
        }
        rules.sort_by_key(|r| r.order_key());
        for pair in rules.windows(2) {
            if pair[0].key() == pair[1].key() {
                return Err(RuleError::Duplicate {
                    group: pair[0].group_id.clone(),
                    id: pair[0].id.clone(),
                });
            }
        }

        let mut inner = self.inner.write();
        inner.rules = rules;
        inner.version += 1;
        info!(
            "Placement rules replaced: {} rules, version {}",
            inner.rules.len(),
            inner.version
        );
        Ok(())
    }

    /// Ingest a JSON-encoded rule list from the external rule store
    pub fn load_rules_json(&self, json: &str) -> Result<(), RuleError> {
        let rules: Vec<Rule> = serde_json::from_str(json)?;
        self.set_rules(rules)
    }

    /// Current rule-set version
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Current rules, in resolution order
    pub fn rules(&self) -> Vec<Rule> {
        self.inner.read().rules.clone()
    }

    /// Rules whose coverage overlaps the region's range
    pub fn rules_for_region(&self, region: &Region) -> Vec<Rule> {
        self.inner
            .read()
            .rules
            .iter()
            .filter(|r| r.applies_to(region))
            .cloned()
            .collect()
    }

    /// Keys strictly inside `(start, end)` where a rule boundary crosses,
    /// ascending and deduplicated
    pub fn get_split_keys(&self, start: &[u8], end: &[u8]) -> Vec<Key> {
        let inner = self.inner.read();
        let mut out: Vec<Key> = Vec::new();
        for rule in &inner.rules {
            for key in [&rule.start_key, &rule.end_key] {
                if keys::strictly_inside(key, start, end) {
                    out.push(key.clone());
                }
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// Compute the best assignment of the region's peers to rules.
    ///
    /// An unsatisfiable rule yields a degraded fit, never an error; callers
    /// repair whatever subset they can.
    pub fn fit_region(&self, snapshot: &ClusterSnapshot, region: &Region) -> RuleFit {
        let inner = self.inner.read();
        fit::fit_region(snapshot, region, &inner.rules, inner.version)
    }
}
