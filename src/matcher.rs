use crate::baseline::{Baseline, BaselineSet, StructuralRef};
use crate::fingerprint::Fingerprint;
use crate::tree::RoleTag;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Minimum score for a positive match. Scores strictly below are a
/// normal negative result, not an error.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

const WEIGHT_COVERAGE: f64 = 0.4;
const WEIGHT_STRUCTURE: f64 = 0.4;
const WEIGHT_ROLES: f64 = 0.2;

/// Outcome of matching one observation against the baseline set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub baseline_id: Option<String>,
    pub score: f64,
}

/// Scores a fingerprinted tree against every baseline and selects the
/// best one at or above `threshold`. Ties break on ascending baseline id,
/// so the result is a deterministic reduction whatever order the
/// per-baseline scores are computed in.
pub fn best_match(
    names: &BTreeSet<String>,
    fp: &Fingerprint,
    baselines: &BaselineSet,
    threshold: f64,
) -> MatchResult {
    let mut best: Option<(&Baseline, f64)> = None;
    for baseline in baselines.iter() {
        let candidate = score(names, fp, baseline);
        // Strictly-greater keeps the lexically first id on ties, since
        // iteration is in ascending id order.
        if best.map(|(_, s)| candidate > s).unwrap_or(true) {
            best = Some((baseline, candidate));
        }
    }

    match best {
        Some((baseline, s)) if s >= threshold => MatchResult {
            baseline_id: Some(baseline.id.clone()),
            score: s,
        },
        Some((_, s)) => MatchResult {
            baseline_id: None,
            score: s,
        },
        None => MatchResult {
            baseline_id: None,
            score: 0.0,
        },
    }
}

/// Weighted similarity in [0, 1]: 0.4 node coverage, 0.4 structural
/// similarity, 0.2 role-histogram similarity.
pub fn score(names: &BTreeSet<String>, fp: &Fingerprint, baseline: &Baseline) -> f64 {
    WEIGHT_COVERAGE * node_coverage(names, baseline)
        + WEIGHT_STRUCTURE * structural_similarity(fp, &baseline.structural)
        + WEIGHT_ROLES * role_similarity(&fp.role_histogram, &baseline.structural.role_histogram)
}

/// Fraction of required node names present in the tree; 1.0 when the
/// baseline requires nothing.
fn node_coverage(names: &BTreeSet<String>, baseline: &Baseline) -> f64 {
    if baseline.required_nodes.is_empty() {
        return 1.0;
    }
    let found = baseline
        .required_nodes
        .iter()
        .filter(|required| names.contains(*required))
        .count();
    found as f64 / baseline.required_nodes.len() as f64
}

fn structural_similarity(fp: &Fingerprint, reference: &StructuralRef) -> f64 {
    let count_delta = normalized_delta(fp.node_count, reference.node_count);
    let depth_delta = normalized_delta(fp.max_depth, reference.max_depth);
    1.0 - (count_delta + depth_delta) / 2.0
}

/// |a − b| normalized by the larger value; 0 when both are 0.
fn normalized_delta(a: u32, b: u32) -> f64 {
    let max = a.max(b);
    if max == 0 {
        return 0.0;
    }
    (a.abs_diff(b)) as f64 / max as f64
}

/// 1 − L1 distance between the normalized histograms, halved so the
/// result stays in [0, 1]. Identical histograms score 1.0.
fn role_similarity(observed: &BTreeMap<RoleTag, u32>, expected: &BTreeMap<RoleTag, u32>) -> f64 {
    let observed_total: u32 = observed.values().sum();
    let expected_total: u32 = expected.values().sum();
    if observed_total == 0 && expected_total == 0 {
        return 1.0;
    }
    if observed_total == 0 || expected_total == 0 {
        return 0.0;
    }

    let mut l1 = 0.0;
    for tag in RoleTag::ALL {
        let o = *observed.get(&tag).unwrap_or(&0) as f64 / observed_total as f64;
        let e = *expected.get(&tag).unwrap_or(&0) as f64 / expected_total as f64;
        l1 += (o - e).abs();
    }
    1.0 - l1 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::Baseline;

    fn histogram(pairs: &[(RoleTag, u32)]) -> BTreeMap<RoleTag, u32> {
        pairs.iter().copied().collect()
    }

    fn login_baseline() -> Baseline {
        Baseline {
            id: "login".into(),
            required_nodes: ["submit_button", "username_field"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            structural: StructuralRef {
                node_count: 3,
                max_depth: 2,
                role_histogram: histogram(&[
                    (RoleTag::Container, 1),
                    (RoleTag::Interactive, 1),
                    (RoleTag::Input, 1),
                ]),
            },
            allowed_next: BTreeSet::new(),
        }
    }

    fn matching_fp() -> Fingerprint {
        Fingerprint {
            full: crate::digest::Digest::zero(),
            structural: crate::digest::Digest::zero(),
            content: crate::digest::Digest::zero(),
            node_count: 3,
            max_depth: 2,
            role_histogram: histogram(&[
                (RoleTag::Container, 1),
                (RoleTag::Interactive, 1),
                (RoleTag::Input, 1),
            ]),
        }
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn perfect_match_scores_one() {
        let s = score(
            &names(&["submit_button", "username_field", "login"]),
            &matching_fp(),
            &login_baseline(),
        );
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_required_node_lands_on_threshold() {
        // Half coverage with perfect structure and roles: 0.4*0.5 + 0.4 + 0.2.
        let s = score(
            &names(&["username_field"]),
            &matching_fp(),
            &login_baseline(),
        );
        assert!((s - 0.8).abs() < 1e-12);

        // The default threshold is inclusive: exactly 0.8 still matches.
        let mut set = BaselineSet::new();
        set.insert(login_baseline()).unwrap();
        let at = best_match(
            &names(&["username_field"]),
            &matching_fp(),
            &set,
            DEFAULT_THRESHOLD,
        );
        assert_eq!(at.baseline_id.as_deref(), Some("login"));

        // Any strictly higher threshold rejects it.
        let above = best_match(&names(&["username_field"]), &matching_fp(), &set, 0.81);
        assert_eq!(above.baseline_id, None);
        assert!((above.score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn scores_stay_bounded() {
        let empty_fp = Fingerprint {
            node_count: 0,
            max_depth: 0,
            role_histogram: BTreeMap::new(),
            ..matching_fp()
        };
        let s = score(&BTreeSet::new(), &empty_fp, &login_baseline());
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn empty_set_is_a_negative_result() {
        let result = best_match(
            &names(&["x"]),
            &matching_fp(),
            &BaselineSet::new(),
            DEFAULT_THRESHOLD,
        );
        assert_eq!(result.baseline_id, None);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn ties_break_on_ascending_id() {
        let mut a = login_baseline();
        a.id = "alpha".into();
        a.required_nodes.clear();
        let mut b = login_baseline();
        b.id = "beta".into();
        b.required_nodes.clear();

        let mut set = BaselineSet::new();
        set.insert(b).unwrap();
        set.insert(a).unwrap();

        let result = best_match(&names(&["x"]), &matching_fp(), &set, 0.5);
        assert_eq!(result.baseline_id.as_deref(), Some("alpha"));
    }
}
