use indexmap::IndexMap;
use tracing::debug;

use crate::model::{
    error::ModelError,
    structures::{
        match_policy::MatchPolicy,
        matched_sample::{MatchedSample, MatchedSet},
        unit::Cohort
    }
};

/// Globally optimal 1:k matching.
///
/// Unlike the greedy policy, the pairing minimizes the *total* summed score
/// distance across all pairs at once, via a shortest-augmenting-path
/// bipartite assignment. For k > 1 each treated unit appears k times on the
/// row side, so it receives k distinct controls.
///
/// Requires k * |treated| <= |controls|; dropping units to force feasibility
/// would undo the optimality claim, so shortage is an error instead.
pub fn match_optimal(cohort: &Cohort, scores: &[f64], ratio: usize) -> Result<MatchedSample, ModelError> {
    if ratio == 0 {
        return Err(ModelError::InvalidParameter("ratio must be at least 1".to_string()));
    }
    cohort.require_both_arms()?;

    let treated = cohort.treated_ids();
    let controls = cohort.control_ids();

    let rows: Vec<usize> = treated
        .iter()
        .flat_map(|t| std::iter::repeat(*t).take(ratio))
        .collect();

    if rows.len() > controls.len() {
        return Err(ModelError::InfeasibleMatching(format!(
            "{} treated units at ratio 1:{} need {} controls, only {} available",
            treated.len(),
            ratio,
            rows.len(),
            controls.len()
        )));
    }

    let cost: Vec<Vec<f64>> = rows
        .iter()
        .map(|t| controls.iter().map(|c| (scores[*t] - scores[*c]).abs()).collect())
        .collect();

    let assignment = min_cost_assignment(&cost);

    let mut by_treated: IndexMap<usize, Vec<usize>> = IndexMap::new();
    let mut weights = vec![0.0; cohort.len()];
    let mut total_distance = 0.0;

    for (row, col) in assignment.iter().enumerate() {
        let t = rows[row];
        let c = controls[*col];

        by_treated.entry(t).or_default().push(c);
        weights[t] = 1.0;
        weights[c] = 1.0;
        total_distance += cost[row][*col];
    }

    let sets = by_treated
        .into_iter()
        .map(|(t, mut matched_controls)| {
            matched_controls.sort_unstable();
            MatchedSet {
                treated: vec![t],
                controls: matched_controls
            }
        })
        .collect::<Vec<_>>();

    debug!(
        sets = sets.len(),
        ratio, total_distance, "optimal matching complete"
    );

    Ok(MatchedSample {
        policy: MatchPolicy::Optimal,
        sets,
        weights,
        dropped_treated: 0,
        dropped_controls: controls.len() - ratio * treated.len(),
        total_distance
    })
}

/// Minimum-cost assignment of every row to a distinct column, for
/// rows <= columns, by shortest augmenting paths over dual potentials.
/// Ties are broken toward the lower column index, which keeps the result
/// deterministic for symmetric inputs.
pub(crate) fn min_cost_assignment(cost: &[Vec<f64>]) -> Vec<usize> {
    let n = cost.len();
    if n == 0 {
        return Vec::new();
    }
    let m = cost[0].len();
    debug_assert!(n <= m, "assignment requires rows <= columns");

    // 1-indexed duals and matching, with column 0 as the virtual source.
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    let mut matched_row = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        matched_row[0] = i;
        let mut j0 = 0usize;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }

                let slack = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if slack < min_slack[j] {
                    min_slack[j] = slack;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }

        // Walk the augmenting path backwards, flipping assignments.
        loop {
            let j1 = way[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![usize::MAX; n];
    for j in 1..=m {
        if matched_row[j] != 0 {
            assignment[matched_row[j] - 1] = j - 1;
        }
    }

    assignment
}
