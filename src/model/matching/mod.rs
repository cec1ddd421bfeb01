pub mod full;
pub mod nearest;
pub mod optimal;
pub mod subclass;

use serde::{Deserialize, Serialize};

use crate::model::{
    constants::DEFAULT_SUBCLASSES,
    error::ModelError,
    structures::{
        match_policy::{MatchPolicy, NearestOrder},
        matched_sample::MatchedSample,
        unit::Cohort
    }
};

/// Per-policy knobs. Policies ignore the options that do not apply to them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    /// Treated visit order (nearest-neighbor only).
    pub order: NearestOrder,
    /// Maximum score distance for a nearest-neighbor pair.
    pub caliper: Option<f64>,
    /// Controls per treated unit (optimal only).
    pub ratio: usize,
    /// Stratum count (subclass only).
    pub subclasses: usize
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions {
            order: NearestOrder::Descending,
            caliper: None,
            ratio: 1,
            subclasses: DEFAULT_SUBCLASSES
        }
    }
}

/// Builds a matched sample from scored units under the selected policy.
///
/// Every policy is deterministic for a fixed cohort order and score vector:
/// distance ties always resolve toward the lower unit id, and no policy
/// consults a random source.
pub fn match_units(
    cohort: &Cohort,
    scores: &[f64],
    policy: MatchPolicy,
    options: &MatchOptions
) -> Result<MatchedSample, ModelError> {
    validate_scores(cohort, scores)?;
    cohort.require_both_arms()?;

    match policy {
        MatchPolicy::Nearest => nearest::match_nearest(cohort, scores, options.order, options.caliper),
        MatchPolicy::Optimal => optimal::match_optimal(cohort, scores, options.ratio),
        MatchPolicy::Full => full::match_full(cohort, scores),
        MatchPolicy::Subclass => subclass::match_subclass(cohort, scores, options.subclasses)
    }
}

fn validate_scores(cohort: &Cohort, scores: &[f64]) -> Result<(), ModelError> {
    if scores.len() != cohort.len() {
        return Err(ModelError::ScoreArity {
            scores: scores.len(),
            units: cohort.len()
        });
    }

    for (i, score) in scores.iter().enumerate() {
        if !score.is_finite() || *score <= 0.0 || *score >= 1.0 {
            return Err(ModelError::PositivityViolation {
                unit: cohort.units()[i].name.clone(),
                score: *score,
                count: 1
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        model::{
            error::ModelError,
            matching::{match_units, MatchOptions},
            structures::match_policy::MatchPolicy
        },
        utils::test_utils::generate_scored_cohort
    };

    #[test]
    fn test_score_arity_is_checked() {
        let (cohort, _) = generate_scored_cohort(&[0.6], &[0.5]);

        let result = match_units(&cohort, &[0.5], MatchPolicy::Nearest, &MatchOptions::default());
        assert!(matches!(result, Err(ModelError::ScoreArity { .. })));
    }

    #[test]
    fn test_boundary_scores_rejected() {
        let (cohort, mut scores) = generate_scored_cohort(&[0.6, 0.4], &[0.5, 0.3]);
        scores[0] = 1.0;

        let result = match_units(&cohort, &scores, MatchPolicy::Nearest, &MatchOptions::default());
        assert!(matches!(result, Err(ModelError::PositivityViolation { .. })));
    }

    #[test]
    fn test_all_policies_are_deterministic() {
        let treated = [0.81, 0.64, 0.52, 0.47, 0.33, 0.21];
        let controls = [0.78, 0.69, 0.55, 0.49, 0.41, 0.36, 0.28, 0.14, 0.62, 0.58];
        let (cohort, scores) = generate_scored_cohort(&treated, &controls);

        for policy in [
            MatchPolicy::Nearest,
            MatchPolicy::Optimal,
            MatchPolicy::Full,
            MatchPolicy::Subclass,
        ] {
            let options = MatchOptions {
                subclasses: 3,
                ..MatchOptions::default()
            };
            let first = match_units(&cohort, &scores, policy, &options).unwrap();
            let second = match_units(&cohort, &scores, policy, &options).unwrap();

            assert_eq!(first, second, "{policy} produced differing samples");
        }
    }
}
