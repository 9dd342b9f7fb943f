//! Region labeler interface
//!
//! The labeler supplies label-driven split boundaries and is consulted with
//! priority over rule-driven boundaries. The engine only depends on the
//! trait; [`KeyRangeLabeler`] is the standard implementation fed from an
//! external label-rule store.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use rp_core::{keys, Key};

/// Supplies label-driven region split boundaries
pub trait RegionLabeler: Send + Sync {
    /// Keys strictly inside `(start, end)` where a label boundary crosses,
    /// ascending and deduplicated
    fn get_split_keys(&self, start: &[u8], end: &[u8]) -> Vec<Key>;
}

/// A label attached to a key range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionLabel {
    /// Label key
    pub key: String,
    /// Label value
    pub value: String,
}

/// A labeling rule covering one key range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRule {
    /// Rule identifier
    pub id: String,
    /// Labels applied to the covered range
    pub labels: Vec<RegionLabel>,
    /// Covered range start (inclusive)
    pub start_key: Key,
    /// Covered range end (exclusive, empty = end of key space)
    pub end_key: Key,
}

/// Label-rule-backed [`RegionLabeler`]
#[derive(Debug, Default)]
pub struct KeyRangeLabeler {
    rules: RwLock<Vec<LabelRule>>,
}

impl KeyRangeLabeler {
    /// Create an empty labeler
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full label-rule set
    pub fn set_rules(&self, rules: Vec<LabelRule>) {
        *self.rules.write() = rules;
    }

    /// Current label rules
    pub fn rules(&self) -> Vec<LabelRule> {
        self.rules.read().clone()
    }
}

impl RegionLabeler for KeyRangeLabeler {
    fn get_split_keys(&self, start: &[u8], end: &[u8]) -> Vec<Key> {
        let rules = self.rules.read();
        let mut out: Vec<Key> = Vec::new();
        for rule in rules.iter() {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, start: &[u8], end: &[u8]) -> LabelRule {
        LabelRule {
            id: id.to_string(),
            labels: vec![RegionLabel {
                key: "tier".to_string(),
                value: "hot".to_string(),
            }],
            start_key: start.to_vec(),
            end_key: end.to_vec(),
        }
    }

    #[test]
    fn test_split_keys_strictly_inside() {
        let labeler = KeyRangeLabeler::new();
        labeler.set_rules(vec![rule("r1", b"c", b"h"), rule("r2", b"h", b"p")]);

        let keys = labeler.get_split_keys(b"a", b"m");
        assert_eq!(keys, vec![b"c".to_vec(), b"h".to_vec()]);

        // Boundaries equal to the region boundary are not split keys.
        let keys = labeler.get_split_keys(b"c", b"h");
        assert!(keys.is_empty());
    }

    #[test]
    fn test_split_keys_sorted_dedup() {
        let labeler = KeyRangeLabeler::new();
        labeler.set_rules(vec![rule("r1", b"f", b"z"), rule("r2", b"b", b"f")]);

        let keys = labeler.get_split_keys(b"a", b"");
        assert_eq!(keys, vec![b"b".to_vec(), b"f".to_vec(), b"z".to_vec()]);
    }

    #[test]
    fn test_no_rules_no_keys() {
        let labeler = KeyRangeLabeler::new();
        assert!(labeler.get_split_keys(b"a", b"z").is_empty());
    }
}
