use tracing::{debug, warn};

use crate::{
    model::{
        error::ModelError,
        structures::{
            match_policy::{MatchPolicy, NearestOrder},
            matched_sample::{MatchedSample, MatchedSet},
            unit::Cohort
        }
    },
    utils::progress_utils::progress_bar
};

/// Greedy 1:1 nearest-neighbor matching without replacement.
///
/// Treated units are visited in the configured order; each takes the closest
/// control remaining in the pool by absolute score distance. A control is
/// never matched twice. Treated units left over when the pool runs dry, or
/// whose closest control sits beyond the caliper, are dropped from the
/// sample and reported in `dropped_treated` rather than silently ignored.
pub fn match_nearest(
    cohort: &Cohort,
    scores: &[f64],
    order: NearestOrder,
    caliper: Option<f64>
) -> Result<MatchedSample, ModelError> {
    if let Some(c) = caliper {
        if !c.is_finite() || c <= 0.0 {
            return Err(ModelError::InvalidParameter(format!(
                "caliper must be a positive distance, got {c}"
            )));
        }
    }

    let mut treated = cohort.treated_ids();
    match order {
        // Ties on score resolve toward the lower unit id.
        NearestOrder::Descending => {
            treated.sort_by(|a, b| scores[*b].partial_cmp(&scores[*a]).unwrap().then(a.cmp(b)))
        }
        NearestOrder::Ascending => {
            treated.sort_by(|a, b| scores[*a].partial_cmp(&scores[*b]).unwrap().then(a.cmp(b)))
        }
        NearestOrder::Data => {}
    }

    // Kept in ascending id order so the linear scan below breaks distance
    // ties toward the lower control id.
    let mut available = cohort.control_ids();

    let bar = progress_bar(treated.len() as u64);
    bar.set_message("Matching nearest neighbors");

    let mut sets = Vec::new();
    let mut weights = vec![0.0; cohort.len()];
    let mut total_distance = 0.0;
    let mut dropped_treated = 0;

    for t in &treated {
        bar.inc(1);

        if available.is_empty() {
            dropped_treated += 1;
            continue;
        }

        let mut best_pos = 0;
        let mut best_distance = f64::INFINITY;
        for (pos, c) in available.iter().enumerate() {
            let distance = (scores[*t] - scores[*c]).abs();
            if distance < best_distance {
                best_distance = distance;
                best_pos = pos;
            }
        }

        if caliper.is_some_and(|c| best_distance > c) {
            dropped_treated += 1;
            continue;
        }

        let control = available.remove(best_pos);
        weights[*t] = 1.0;
        weights[control] = 1.0;
        total_distance += best_distance;
        sets.push(MatchedSet::pair(*t, control));
    }

    bar.finish_and_clear();

    if sets.is_empty() {
        return Err(ModelError::InfeasibleMatching(
            "nearest-neighbor matching formed no pairs".to_string()
        ));
    }

    if dropped_treated > 0 {
        warn!(
            dropped_treated,
            "treated units left unmatched by nearest-neighbor matching"
        );
    }

    debug!(
        pairs = sets.len(),
        dropped_treated,
        total_distance,
        "nearest-neighbor matching complete"
    );

    Ok(MatchedSample {
        policy: MatchPolicy::Nearest,
        sets,
        weights,
        dropped_treated,
        dropped_controls: available.len(),
        total_distance
    })
}
