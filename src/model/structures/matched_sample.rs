use serde::Serialize;

use crate::model::{constants::WEIGHT_EPSILON, structures::match_policy::MatchPolicy};

/// A group of comparable units: at least one treated and at least one
/// control. For 1:1 policies every set is a pair.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedSet {
    pub treated: Vec<usize>,
    pub controls: Vec<usize>
}

impl MatchedSet {
    pub fn pair(treated: usize, control: usize) -> MatchedSet {
        MatchedSet {
            treated: vec![treated],
            controls: vec![control]
        }
    }

    pub fn size(&self) -> usize {
        self.treated.len() + self.controls.len()
    }
}

/// The matching engine's output: matched sets plus a per-unit weight vector
/// aligned with cohort order. A weight of 0.0 means the unit was excluded
/// from the matched sample. Immutable once produced; downstream stages only
/// aggregate over it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedSample {
    pub policy: MatchPolicy,
    pub sets: Vec<MatchedSet>,
    pub weights: Vec<f64>,
    pub dropped_treated: usize,
    pub dropped_controls: usize,
    /// Sum of the pair/attachment distances the construction accumulated.
    /// Not meaningful for subclass samples, which report 0.0.
    pub total_distance: f64
}

impl MatchedSample {
    /// Number of units carrying positive weight.
    pub fn matched_units(&self) -> usize {
        self.weights.iter().filter(|w| **w > WEIGHT_EPSILON).count()
    }

    pub fn weight_of(&self, unit_id: usize) -> f64 {
        self.weights.get(unit_id).copied().unwrap_or(0.0)
    }

    /// 1:1 pairs, for policies that produce them.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sets
            .iter()
            .filter(|s| s.treated.len() == 1 && s.controls.len() == 1)
            .map(|s| (s.treated[0], s.controls[0]))
    }

    /// Every set must contain both arms; this is the structural invariant
    /// shared by all policies.
    pub fn assert_sets_valid(&self) {
        for (i, set) in self.sets.iter().enumerate() {
            assert!(
                !set.treated.is_empty() && !set.controls.is_empty(),
                "matched set {i} is missing an arm"
            );
        }
    }
}
