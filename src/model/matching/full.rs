use std::collections::HashMap;

use tracing::debug;

use crate::model::{
    error::ModelError,
    matching::optimal::min_cost_assignment,
    structures::{
        match_policy::MatchPolicy,
        matched_sample::{MatchedSample, MatchedSet},
        unit::Cohort
    }
};

/// Full matching: partitions the entire cohort into disjoint matched sets,
/// each holding at least one treated and at least one control unit, with
/// every unit used exactly once.
///
/// Construction: an optimal 1:1 assignment of the smaller arm seeds one set
/// per pair, then every remaining unit of the larger arm joins the set of
/// its nearest opposite-arm unit. Controls are weighted by their set's
/// treated:control ratio; treated units keep weight 1.
pub fn match_full(cohort: &Cohort, scores: &[f64]) -> Result<MatchedSample, ModelError> {
    cohort.require_both_arms()?;

    let treated = cohort.treated_ids();
    let controls = cohort.control_ids();

    let (anchors, pool) = if treated.len() <= controls.len() {
        (treated, controls)
    } else {
        (controls, treated)
    };

    let cost: Vec<Vec<f64>> = anchors
        .iter()
        .map(|a| pool.iter().map(|p| (scores[*a] - scores[*p]).abs()).collect())
        .collect();
    let assignment = min_cost_assignment(&cost);

    // One seed set per anchor; every anchor remembers its set index so the
    // leftover pool units can attach through it.
    let mut members: Vec<Vec<usize>> = Vec::with_capacity(anchors.len());
    let mut set_of_anchor: HashMap<usize, usize> = HashMap::new();
    let mut assigned = vec![false; pool.len()];
    let mut total_distance = 0.0;

    for (row, col) in assignment.iter().enumerate() {
        set_of_anchor.insert(anchors[row], members.len());
        members.push(vec![anchors[row], pool[*col]]);
        assigned[*col] = true;
        total_distance += cost[row][*col];
    }

    // Attach each leftover to the set of its nearest opposite-arm unit,
    // i.e. the nearest anchor. Ties resolve toward the lower anchor id.
    for (pos, p) in pool.iter().enumerate() {
        if assigned[pos] {
            continue;
        }

        let mut best_anchor = anchors[0];
        let mut best_distance = f64::INFINITY;
        for a in &anchors {
            let distance = (scores[*p] - scores[*a]).abs();
            if distance < best_distance || (distance == best_distance && *a < best_anchor) {
                best_distance = distance;
                best_anchor = *a;
            }
        }

        members[set_of_anchor[&best_anchor]].push(*p);
        total_distance += best_distance;
    }

    let mut sets = Vec::with_capacity(members.len());
    let mut weights = vec![0.0; cohort.len()];

    for ids in members {
        let mut set_treated: Vec<usize> = ids
            .iter()
            .copied()
            .filter(|id| cohort.units()[*id].treated)
            .collect();
        let mut set_controls: Vec<usize> = ids
            .iter()
            .copied()
            .filter(|id| !cohort.units()[*id].treated)
            .collect();
        set_treated.sort_unstable();
        set_controls.sort_unstable();

        let control_weight = set_treated.len() as f64 / set_controls.len() as f64;
        for t in &set_treated {
            weights[*t] = 1.0;
        }
        for c in &set_controls {
            weights[*c] = control_weight;
        }

        sets.push(MatchedSet {
            treated: set_treated,
            controls: set_controls
        });
    }

    debug!(sets = sets.len(), total_distance, "full matching complete");

    Ok(MatchedSample {
        policy: MatchPolicy::Full,
        sets,
        weights,
        dropped_treated: 0,
        dropped_controls: 0,
        total_distance
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        model::{constants::WEIGHT_EPSILON, matching::full::match_full},
        utils::test_utils::generate_scored_cohort
    };

    #[test]
    fn test_every_unit_used_exactly_once() {
        let (cohort, scores) =
            generate_scored_cohort(&[0.7, 0.5, 0.3], &[0.72, 0.68, 0.52, 0.45, 0.31, 0.12]);

        let sample = match_full(&cohort, &scores).unwrap();

        let mut seen = vec![0usize; cohort.len()];
        for set in &sample.sets {
            for id in set.treated.iter().chain(&set.controls) {
                seen[*id] += 1;
            }
        }
        assert!(seen.iter().all(|count| *count == 1));
        assert_eq!(sample.matched_units(), cohort.len());
    }

    #[test]
    fn test_every_set_has_both_arms() {
        let (cohort, scores) = generate_scored_cohort(&[0.8, 0.2], &[0.75, 0.6, 0.4, 0.15]);

        let sample = match_full(&cohort, &scores).unwrap();

        sample.assert_sets_valid();
        assert_eq!(sample.sets.len(), 2);
    }

    #[test]
    fn test_control_weights_reflect_set_composition() {
        // Both controls end up in the single treated unit's set, each at
        // weight 1/2.
        let (cohort, scores) = generate_scored_cohort(&[0.5], &[0.45, 0.55]);

        let sample = match_full(&cohort, &scores).unwrap();

        assert_abs_diff_eq!(sample.weights[0], 1.0);
        assert_abs_diff_eq!(sample.weights[1], 0.5);
        assert_abs_diff_eq!(sample.weights[2], 0.5);
    }

    #[test]
    fn test_majority_treated_cohort_weights() {
        // More treated than controls: controls anchor and collect several
        // treated units, pushing control weight above 1.
        let (cohort, scores) = generate_scored_cohort(&[0.6, 0.55, 0.5], &[0.52]);

        let sample = match_full(&cohort, &scores).unwrap();

        assert_eq!(sample.sets.len(), 1);
        assert_abs_diff_eq!(sample.weights[3], 3.0);
        assert!(sample.weights.iter().all(|w| *w > WEIGHT_EPSILON));
    }
}
