//! Placement rule definitions

use serde::{Deserialize, Serialize};

use rp_core::{keys, PeerRole, Region, Store};

/// Role a rule requires of its peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleRole {
    /// Full voter
    Voter,
    /// Voter that should also hold region leadership
    Leader,
    /// Non-voting replica
    Learner,
}

impl RuleRole {
    /// The peer role a replica satisfying this rule should hold
    pub fn peer_role(&self) -> PeerRole {
        match self {
            RuleRole::Voter | RuleRole::Leader => PeerRole::Voter,
            RuleRole::Learner => PeerRole::Learner,
        }
    }

    /// Whether `role` already satisfies this rule's role requirement
    pub fn accepts(&self, role: PeerRole) -> bool {
        match self {
            RuleRole::Voter | RuleRole::Leader => role.in_new_voters(),
            RuleRole::Learner => role == PeerRole::Learner,
        }
    }
}

impl std::fmt::Display for RuleRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleRole::Voter => write!(f, "voter"),
            RuleRole::Leader => write!(f, "leader"),
            RuleRole::Learner => write!(f, "learner"),
        }
    }
}

/// Operator of a label constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOp {
    /// Label value must be one of the listed values
    In,
    /// Label value must not be one of the listed values
    NotIn,
    /// Label key must be present
    Exists,
    /// Label key must be absent
    NotExists,
}

/// A single label constraint on candidate stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConstraint {
    /// Label key
    pub key: String,
    /// Constraint operator
    pub op: ConstraintOp,
    /// Values compared against (unused for Exists/NotExists)
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelConstraint {
    /// Check whether `store` satisfies this constraint
    pub fn matches(&self, store: &Store) -> bool {
        let value = store.label(&self.key);
        match self.op {
            ConstraintOp::In => value.is_some_and(|v| self.values.iter().any(|x| x == v)),
            ConstraintOp::NotIn => !value.is_some_and(|v| self.values.iter().any(|x| x == v)),
            ConstraintOp::Exists => value.is_some(),
            ConstraintOp::NotExists => value.is_none(),
        }
    }
}

/// A declarative placement constraint over a key range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule group
    pub group_id: String,
    /// Rule ID, unique within its group
    pub id: String,
    /// Ordering within the group; lower index resolves first
    #[serde(default)]
    pub index: u32,
    /// Covered range start (inclusive)
    #[serde(default)]
    pub start_key: Vec<u8>,
    /// Covered range end (exclusive, empty = end of key space)
    #[serde(default)]
    pub end_key: Vec<u8>,
    /// Required role
    pub role: RuleRole,
    /// Required replica count
    pub count: usize,
    /// Constraints candidate stores must satisfy
    #[serde(default)]
    pub label_constraints: Vec<LabelConstraint>,
    /// Label keys defining the isolation dimension for this rule
    #[serde(default)]
    pub location_labels: Vec<String>,
}

impl Rule {
    /// Stable identity key, used for deterministic ordering
    pub fn key(&self) -> (&str, &str) {
        (&self.group_id, &self.id)
    }

    /// Whether this rule's coverage overlaps the region's range
    pub fn applies_to(&self, region: &Region) -> bool {
        keys::ranges_overlap(
            &self.start_key,
            &self.end_key,
            &region.start_key,
            &region.end_key,
        )
    }

    /// Whether `store` satisfies every label constraint
    pub fn matches_store(&self, store: &Store) -> bool {
        self.label_constraints.iter().all(|c| c.matches(store))
    }

    /// How specifically this rule selects stores; more constraints win ties
    pub fn specificity(&self) -> usize {
        self.label_constraints.len()
    }

    /// Deterministic resolution order: group, then index, then id
    pub fn order_key(&self) -> (String, u32, String) {
        (self.group_id.clone(), self.index, self.id.clone())
    }
}
