use itertools::Itertools;
use tracing::debug;

use crate::model::{
    error::ModelError,
    structures::{
        match_policy::MatchPolicy,
        matched_sample::{MatchedSample, MatchedSet},
        unit::Cohort
    }
};

/// Subclassification: stratifies the score range into `n_subclasses`
/// near-equal-frequency strata and weights controls by the inverse treatment
/// proportion of their stratum.
///
/// Stratum membership is rank-based (units sorted by score, ties by id), so
/// the partition is deterministic even with duplicate scores. Every stratum
/// must contain both arms; a stratum without controls (or without treated
/// units) cannot estimate anything and fails the whole policy.
pub fn match_subclass(cohort: &Cohort, scores: &[f64], n_subclasses: usize) -> Result<MatchedSample, ModelError> {
    if n_subclasses < 2 {
        return Err(ModelError::InvalidParameter(format!(
            "subclass matching needs at least 2 subclasses, got {n_subclasses}"
        )));
    }

    if n_subclasses > cohort.len() {
        return Err(ModelError::InfeasibleMatching(format!(
            "{} subclasses cannot be filled by {} units",
            n_subclasses,
            cohort.len()
        )));
    }

    let by_score: Vec<usize> = (0..cohort.len())
        .sorted_by(|a, b| scores[*a].partial_cmp(&scores[*b]).unwrap().then(a.cmp(b)))
        .collect();

    let n = cohort.len();
    let mut strata: Vec<(Vec<usize>, Vec<usize>)> = vec![(Vec::new(), Vec::new()); n_subclasses];

    for (position, id) in by_score.iter().enumerate() {
        let stratum = position * n_subclasses / n;
        if cohort.units()[*id].treated {
            strata[stratum].0.push(*id);
        } else {
            strata[stratum].1.push(*id);
        }
    }

    let mut sets = Vec::with_capacity(n_subclasses);
    let mut weights = vec![0.0; cohort.len()];

    for (index, (mut stratum_treated, mut stratum_controls)) in strata.into_iter().enumerate() {
        if stratum_treated.is_empty() || stratum_controls.is_empty() {
            let missing = if stratum_treated.is_empty() { "treated" } else { "control" };
            return Err(ModelError::InfeasibleMatching(format!(
                "subclass {} of {} has no {} units",
                index + 1,
                n_subclasses,
                missing
            )));
        }

        stratum_treated.sort_unstable();
        stratum_controls.sort_unstable();

        let control_weight = stratum_treated.len() as f64 / stratum_controls.len() as f64;
        for t in &stratum_treated {
            weights[*t] = 1.0;
        }
        for c in &stratum_controls {
            weights[*c] = control_weight;
        }

        sets.push(MatchedSet {
            treated: stratum_treated,
            controls: stratum_controls
        });
    }

    debug!(subclasses = sets.len(), "subclass matching complete");

    Ok(MatchedSample {
        policy: MatchPolicy::Subclass,
        sets,
        weights,
        dropped_treated: 0,
        dropped_controls: 0,
        // Within-stratum distance is not part of this policy's objective.
        total_distance: 0.0
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        model::{error::ModelError, matching::subclass::match_subclass},
        utils::test_utils::generate_scored_cohort
    };

    #[test]
    fn test_strata_cover_all_units_with_both_arms() {
        let treated = [0.15, 0.35, 0.55, 0.75];
        let controls = [0.1, 0.2, 0.4, 0.45, 0.6, 0.65, 0.8, 0.9];
        let (cohort, scores) = generate_scored_cohort(&treated, &controls);

        let sample = match_subclass(&cohort, &scores, 4).unwrap();

        sample.assert_sets_valid();
        assert_eq!(sample.sets.len(), 4);
        assert_eq!(sample.matched_units(), cohort.len());
        let total: usize = sample.sets.iter().map(|s| s.size()).sum();
        assert_eq!(total, cohort.len());
    }

    #[test]
    fn test_control_weights_are_inverse_treatment_proportion() {
        // Stratum of 3 units (1 treated, 2 controls) gives controls 0.5 each.
        let (cohort, scores) = generate_scored_cohort(&[0.2, 0.8], &[0.15, 0.25, 0.75, 0.85]);

        let sample = match_subclass(&cohort, &scores, 2).unwrap();

        for set in &sample.sets {
            assert_eq!(set.treated.len(), 1);
            assert_eq!(set.controls.len(), 2);
            for c in &set.controls {
                assert_abs_diff_eq!(sample.weights[*c], 0.5);
            }
        }
    }

    #[test]
    fn test_empty_stratum_is_infeasible() {
        // All treated scores sit in the lower half; the upper stratum holds
        // only controls.
        let (cohort, scores) = generate_scored_cohort(&[0.1, 0.15], &[0.2, 0.7, 0.8, 0.9]);

        let result = match_subclass(&cohort, &scores, 2);

        assert!(matches!(result, Err(ModelError::InfeasibleMatching(_))));
    }

    #[test]
    fn test_too_few_subclasses_rejected() {
        let (cohort, scores) = generate_scored_cohort(&[0.6], &[0.4]);

        assert!(matches!(
            match_subclass(&cohort, &scores, 1),
            Err(ModelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_more_subclasses_than_units_rejected() {
        let (cohort, scores) = generate_scored_cohort(&[0.6], &[0.4]);

        assert!(matches!(
            match_subclass(&cohort, &scores, 3),
            Err(ModelError::InfeasibleMatching(_))
        ));
    }
}
