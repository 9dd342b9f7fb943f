//! Rule fitting
//!
//! Computes the best assignment of a region's peers to the applicable
//! placement rules. The fit is created, used, and discarded within a single
//! checker invocation; it is never persisted.

use std::collections::HashSet;

use rp_core::{ClusterSnapshot, Peer, Region, RegionId, Store, StoreId};

use super::rule::Rule;

/// One rule with the peers assigned to it
#[derive(Debug, Clone)]
pub struct MatchedRule {
    /// The rule
    pub rule: Rule,
    /// Peers assigned to this rule, in assignment order
    pub peers: Vec<Peer>,
}

impl MatchedRule {
    /// Number of replicas still missing for this rule
    pub fn missing(&self) -> usize {
        self.rule.count.saturating_sub(self.peers.len())
    }

    /// Assigned peers whose current role does not satisfy the rule's role
    pub fn role_drift(&self) -> Vec<&Peer> {
        self.peers
            .iter()
            .filter(|p| !self.rule.role.accepts(p.role))
            .collect()
    }
}

/// The computed assignment of a region's peers to rules
#[derive(Debug, Clone)]
pub struct RuleFit {
    /// Region the fit was computed for
    pub region_id: RegionId,
    /// Rule-set version the fit was computed against
    pub rule_version: u64,
    /// Per-rule assignments, in rule resolution order
    pub matched: Vec<MatchedRule>,
    /// Peers matching no rule; removal candidates
    pub orphan_peers: Vec<Peer>,
    /// How well assigned peers spread across distinct label values
    pub isolation_score: u64,
}

impl RuleFit {
    /// Rules with unmet replica counts, with the number missing
    pub fn deficient(&self) -> Vec<(&Rule, usize)> {
        self.matched
            .iter()
            .filter(|m| m.missing() > 0)
            .map(|m| (&m.rule, m.missing()))
            .collect()
    }

    /// Whether every applicable rule is fully satisfied
    pub fn is_satisfied(&self) -> bool {
        self.matched
            .iter()
            .all(|m| m.missing() == 0 && m.role_drift().is_empty())
    }

    /// Whether any repair action is warranted
    pub fn needs_repair(&self) -> bool {
        !self.is_satisfied() || !self.orphan_peers.is_empty()
    }
}

/// Spread score of `stores` across the `location_labels` dimensions.
///
/// Coarser labels weigh more; a missing label value counts as a value of its
/// own per store, so unlabeled stores never collapse into one bucket.
pub(crate) fn isolation_score(
    snapshot: &ClusterSnapshot,
    store_ids: &[StoreId],
    location_labels: &[String],
) -> u64 {
    if location_labels.is_empty() || store_ids.is_empty() {
        return 0;
    }
    let mut score = 0u64;
    let mut weight = 10u64.saturating_pow(location_labels.len() as u32 - 1);
    for label in location_labels {
        let mut values: HashSet<String> = HashSet::new();
        for id in store_ids {
            let value = snapshot
                .store(*id)
                .and_then(|s| s.label(label))
                .map(|v| v.to_string())
                .unwrap_or_else(|| format!("store-{}", id));
            values.insert(value);
        }
        score += values.len() as u64 * weight;
        weight /= 10;
    }
    score
}

/// Pick the best up-store for a new replica.
///
/// Candidates must satisfy `accepts`, not already appear in `occupied`, and
/// are ranked by isolation gain, then lighter region load, then lower ID for
/// determinism. Returns `None` when no store qualifies.
pub(crate) fn pick_store(
    snapshot: &ClusterSnapshot,
    occupied: &[StoreId],
    location_labels: &[String],
    accepts: impl Fn(&Store) -> bool,
) -> Option<StoreId> {
    let base = isolation_score(snapshot, occupied, location_labels);
    let mut best: Option<(u64, u64, StoreId)> = None;
    for store in snapshot.up_stores() {
        if occupied.contains(&store.id) || !accepts(store) {
            continue;
        }
        let mut with = occupied.to_vec();
        with.push(store.id);
        let gain = isolation_score(snapshot, &with, location_labels).saturating_sub(base);
        let candidate = (gain, store.region_count, store.id);
        let better = match best {
            None => true,
            Some((g, load, id)) => {
                candidate.0 > g
                    || (candidate.0 == g && candidate.1 < load)
                    || (candidate.0 == g && candidate.1 == load && candidate.2 < id)
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best.map(|(_, _, id)| id)
}

/// Compute the fit of `region` against `rules` (already in resolution order).
pub(crate) fn fit_region(
    snapshot: &ClusterSnapshot,
    region: &Region,
    rules: &[Rule],
    rule_version: u64,
) -> RuleFit {
    // Most specific rules claim peers first so broad fallback rules cannot
    // starve them; resolution order breaks specificity ties.
    let mut applicable: Vec<&Rule> = rules.iter().filter(|r| r.applies_to(region)).collect();
    applicable.sort_by(|a, b| {
        b.specificity()
            .cmp(&a.specificity())
            .then_with(|| a.order_key().cmp(&b.order_key()))
    });

    let mut unassigned: Vec<Peer> = region.peers.clone();
    let mut matched = Vec::with_capacity(applicable.len());
    let mut total_score = 0u64;

    for rule in applicable {
        let mut chosen: Vec<Peer> = Vec::new();
        for _ in 0..rule.count {
            let chosen_stores: Vec<StoreId> = chosen.iter().map(|p| p.store_id).collect();
            let base = isolation_score(snapshot, &chosen_stores, &rule.location_labels);
            let mut best: Option<(usize, (bool, u64, u64))> = None;
            for (idx, peer) in unassigned.iter().enumerate() {
                let store = match snapshot.store(peer.store_id) {
                    Some(s) => s,
                    None => continue,
                };
                if !rule.matches_store(store) {
                    continue;
                }
                // Reusing a peer already in the required role minimizes
                // churn; among equals, prefer the one improving isolation.
                let role_match = rule.role.accepts(peer.role);
                let mut with = chosen_stores.clone();
                with.push(peer.store_id);
                let gain = isolation_score(snapshot, &with, &rule.location_labels)
                    .saturating_sub(base);
                let rank = (role_match, gain, u64::MAX - peer.id);
                if best.map_or(true, |(_, r)| rank > r) {
                    best = Some((idx, rank));
                }
            }
            match best {
                Some((idx, _)) => chosen.push(unassigned.remove(idx)),
                None => break,
            }
        }
        let stores: Vec<StoreId> = chosen.iter().map(|p| p.store_id).collect();
        total_score += isolation_score(snapshot, &stores, &rule.location_labels);
        matched.push(MatchedRule {
            rule: rule.clone(),
            peers: chosen,
        });
    }

    RuleFit {
        region_id: region.id,
        rule_version,
        matched,
        orphan_peers: unassigned,
        isolation_score: total_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::rule::{ConstraintOp, LabelConstraint, RuleRole};
    use rp_core::{ClusterSnapshot, PeerRole, Store};

    fn voter_rule(count: usize) -> Rule {
        Rule {
            group_id: "rp".to_string(),
            id: "default".to_string(),
            index: 0,
            start_key: Vec::new(),
            end_key: Vec::new(),
            role: RuleRole::Voter,
            count,
            label_constraints: Vec::new(),
            location_labels: vec!["zone".to_string()],
        }
    }

    fn snapshot_with_zones() -> ClusterSnapshot {
        ClusterSnapshot::builder()
            .store(Store::new(1, "s1").with_label("zone", "z1"))
            .store(Store::new(2, "s2").with_label("zone", "z2"))
            .store(Store::new(3, "s3").with_label("zone", "z3"))
            .store(Store::new(4, "s4").with_label("zone", "z1"))
            .build()
    }

    fn region_on_stores(stores: &[StoreId]) -> Region {
        let mut r = Region::new(1, Vec::new(), Vec::new());
        for (i, s) in stores.iter().enumerate() {
            r.peers.push(Peer::new(10 + i as u64, *s, PeerRole::Voter));
        }
        r.leader = r.peers.first().map(|p| p.id);
        r
    }

    #[test]
    fn test_satisfied_fit_has_no_deficiency_or_orphans() {
        let snap = snapshot_with_zones();
        let region = region_on_stores(&[1, 2, 3]);
        let fit = fit_region(&snap, &region, &[voter_rule(3)], 1);

        assert!(fit.is_satisfied());
        assert!(fit.deficient().is_empty());
        assert!(fit.orphan_peers.is_empty());
        assert!(!fit.needs_repair());
    }

    #[test]
    fn test_deficient_rule_reports_missing_count() {
        let snap = snapshot_with_zones();
        let region = region_on_stores(&[1]);
        let fit = fit_region(&snap, &region, &[voter_rule(3)], 1);

        let deficient = fit.deficient();
        assert_eq!(deficient.len(), 1);
        assert_eq!(deficient[0].1, 2);
        assert!(fit.needs_repair());
    }

    #[test]
    fn test_extra_peer_becomes_orphan() {
        let snap = snapshot_with_zones();
        let region = region_on_stores(&[1, 2, 3, 4]);
        let fit = fit_region(&snap, &region, &[voter_rule(3)], 1);

        assert_eq!(fit.orphan_peers.len(), 1);
        assert!(fit.needs_repair());
    }

    #[test]
    fn test_assignment_prefers_isolation_spread() {
        // Stores 1 and 4 share zone z1; with count 2 the fit should keep
        // peers from two distinct zones and orphan one of the z1 peers.
        let snap = snapshot_with_zones();
        let region = region_on_stores(&[1, 4, 2]);
        let fit = fit_region(&snap, &region, &[voter_rule(2)], 1);

        let zones: Vec<_> = fit.matched[0]
            .peers
            .iter()
            .map(|p| snap.store(p.store_id).unwrap().label("zone").unwrap())
            .collect();
        assert!(zones.contains(&"z1"));
        assert!(zones.contains(&"z2"));
        assert_eq!(fit.orphan_peers.len(), 1);
    }

    #[test]
    fn test_unsatisfiable_constraint_degrades_not_errors() {
        let snap = snapshot_with_zones();
        let mut rule = voter_rule(3);
        rule.label_constraints = vec![LabelConstraint {
            key: "zone".to_string(),
            op: ConstraintOp::In,
            values: vec!["nowhere".to_string()],
        }];
        let region = region_on_stores(&[1, 2, 3]);
        let fit = fit_region(&snap, &region, &[rule], 1);

        // No peer can match; all become orphans and the rule is deficient.
        assert_eq!(fit.deficient().len(), 1);
        assert_eq!(fit.orphan_peers.len(), 3);
        assert!(!fit.is_satisfied());
    }

    #[test]
    fn test_pick_store_prefers_new_zone() {
        let snap = snapshot_with_zones();
        let labels = vec!["zone".to_string()];
        // Occupying z1 and z2: z3 (store 3) beats the second z1 store (4).
        let picked = pick_store(&snap, &[1, 2], &labels, |_| true).unwrap();
        assert_eq!(picked, 3);
    }

    #[test]
    fn test_pick_store_none_when_exhausted() {
        let snap = snapshot_with_zones();
        let picked = pick_store(&snap, &[1, 2, 3, 4], &[], |_| true);
        assert!(picked.is_none());
    }
}
