use serde::Serialize;
use tracing::warn;

use crate::model::{constants::WEIGHT_EPSILON, error::ModelError, structures::unit::Cohort};

/// Balance diagnostics for one covariate.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRow {
    pub covariate: String,
    pub treated_mean: f64,
    pub control_mean: f64,
    /// (treated mean − control mean) / pooled unweighted SD. The denominator
    /// is always computed from the raw cohort so pre- and post-match rows
    /// share a yardstick.
    pub std_mean_diff: f64,
    /// Weighted treated variance over weighted control variance.
    pub variance_ratio: f64
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTable {
    pub rows: Vec<BalanceRow>
}

impl BalanceTable {
    pub fn row(&self, covariate: &str) -> Option<&BalanceRow> {
        self.rows.iter().find(|r| r.covariate == covariate)
    }

    pub fn mean_abs_smd(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }

        self.rows.iter().map(|r| r.std_mean_diff.abs()).sum::<f64>() / self.rows.len() as f64
    }
}

/// Pre/post comparison. Matching on the right covariates should shrink the
/// absolute standardized mean differences; a covariate that got worse is
/// flagged (and logged), never fatal; the analyst decides what to do.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceImprovement {
    pub mean_abs_smd_before: f64,
    pub mean_abs_smd_after: f64,
    pub worsened: Vec<String>
}

impl BalanceImprovement {
    pub fn compare(before: &BalanceTable, after: &BalanceTable) -> BalanceImprovement {
        let worsened: Vec<String> = before
            .rows
            .iter()
            .filter_map(|pre| {
                after
                    .row(&pre.covariate)
                    .filter(|post| post.std_mean_diff.abs() > pre.std_mean_diff.abs())
                    .map(|_| pre.covariate.clone())
            })
            .collect();

        for covariate in &worsened {
            warn!(covariate = %covariate, "matching worsened balance on a covariate");
        }

        BalanceImprovement {
            mean_abs_smd_before: before.mean_abs_smd(),
            mean_abs_smd_after: after.mean_abs_smd(),
            worsened
        }
    }
}

/// Computes the balance table for the cohort split by treatment, optionally
/// under matched-sample weights. `None` weights mean the raw cohort.
pub fn balance(cohort: &Cohort, weights: Option<&[f64]>) -> Result<BalanceTable, ModelError> {
    cohort.require_both_arms()?;

    if let Some(w) = weights {
        if w.len() != cohort.len() {
            return Err(ModelError::WeightArity {
                weights: w.len(),
                units: cohort.len()
            });
        }
    }

    let unit_weight = |id: usize| weights.map_or(1.0, |w| w[id]);

    let mut rows = Vec::with_capacity(cohort.covariate_count());

    for (j, covariate) in cohort.covariate_names().iter().enumerate() {
        let mut treated = WeightedMoments::default();
        let mut controls = WeightedMoments::default();
        let mut raw_treated = WeightedMoments::default();
        let mut raw_controls = WeightedMoments::default();

        for unit in cohort.units() {
            let value = unit.covariates[j];
            let (arm, raw_arm) = if unit.treated {
                (&mut treated, &mut raw_treated)
            } else {
                (&mut controls, &mut raw_controls)
            };

            arm.add(value, unit_weight(unit.id));
            raw_arm.add(value, 1.0);
        }

        let treated_mean = treated.mean();
        let control_mean = controls.mean();

        // Pooled SD from the unweighted arms, Rubin-style.
        let pooled_sd = ((raw_treated.variance() + raw_controls.variance()) / 2.0).sqrt();
        let std_mean_diff = if pooled_sd > 0.0 {
            (treated_mean - control_mean) / pooled_sd
        } else {
            0.0
        };

        let control_variance = controls.variance();
        let variance_ratio = if control_variance > 0.0 {
            treated.variance() / control_variance
        } else {
            f64::INFINITY
        };

        rows.push(BalanceRow {
            covariate: covariate.clone(),
            treated_mean,
            control_mean,
            std_mean_diff,
            variance_ratio
        });
    }

    Ok(BalanceTable { rows })
}

/// Streaming weighted mean/variance accumulator.
#[derive(Debug, Default)]
struct WeightedMoments {
    weight_sum: f64,
    mean: f64,
    m2: f64
}

impl WeightedMoments {
    fn add(&mut self, value: f64, weight: f64) {
        if weight <= WEIGHT_EPSILON {
            return;
        }

        // West's incremental update.
        self.weight_sum += weight;
        let delta = value - self.mean;
        self.mean += (weight / self.weight_sum) * delta;
        self.m2 += weight * delta * (value - self.mean);
    }

    fn mean(&self) -> f64 {
        if self.weight_sum > 0.0 {
            self.mean
        } else {
            0.0
        }
    }

    /// Sample variance; reduces to the Bessel-corrected estimate when all
    /// weights are 1.
    fn variance(&self) -> f64 {
        if self.weight_sum > 1.0 {
            self.m2 / (self.weight_sum - 1.0)
        } else {
            0.0
        }
    }
}
