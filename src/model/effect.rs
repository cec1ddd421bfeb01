use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::debug;

use crate::model::{
    constants::WEIGHT_EPSILON,
    error::ModelError,
    propensity::standard_normal,
    structures::unit::Cohort
};

// Below this residual sum of squares the design fits exactly and the usual
// t machinery degenerates; see `estimate`.
const EXACT_FIT_SSE: f64 = 1e-12;

/// The estimated Average Treatment Effect and its test against the two-sided
/// null of zero effect.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectEstimate {
    pub ate: f64,
    pub std_error: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: usize,
    /// Units with positive weight that entered the regression.
    pub sample_size: usize,
    pub alpha: f64,
    pub significant: bool
}

/// Weighted least-squares regression of outcome on treatment plus the
/// matching covariates, over the units the matched sample kept.
///
/// The treatment coefficient is the ATE estimate; its standard error uses
/// the weighted residual variance with `n - p` degrees of freedom. An
/// exactly-fitting design (for instance an outcome that ignores treatment
/// entirely) reports a zero effect with p = 1 rather than dividing by a
/// zero standard error.
pub fn estimate(cohort: &Cohort, weights: &[f64], alpha: f64) -> Result<EffectEstimate, ModelError> {
    if weights.len() != cohort.len() {
        return Err(ModelError::WeightArity {
            weights: weights.len(),
            units: cohort.len()
        });
    }
    if !(0.0..1.0).contains(&alpha) || alpha <= 0.0 {
        return Err(ModelError::InvalidParameter(format!(
            "alpha must be in (0, 1), got {alpha}"
        )));
    }

    let used: Vec<usize> = (0..cohort.len())
        .filter(|id| weights[*id] > WEIGHT_EPSILON)
        .collect();

    let n = used.len();
    let p = cohort.covariate_count() + 2; // intercept + treatment + covariates

    if n <= p {
        return Err(ModelError::DegenerateFit(format!(
            "matched sample of {n} units cannot identify {p} outcome parameters"
        )));
    }

    let x = DMatrix::from_fn(n, p, |row, col| {
        let unit = &cohort.units()[used[row]];
        match col {
            0 => 1.0,
            1 => f64::from(unit.treated as u8),
            _ => unit.covariates[col - 2]
        }
    });
    let y = DVector::from_iterator(n, used.iter().map(|id| cohort.units()[*id].outcome));
    let w = DVector::from_iterator(n, used.iter().map(|id| weights[*id]));

    // X'WX and X'Wy without materializing diagonal W.
    let mut xtw = x.transpose();
    for (i, weight) in w.iter().enumerate() {
        xtw.column_mut(i).scale_mut(*weight);
    }
    let xtwx = &xtw * &x;
    let xtwy = &xtw * &y;

    let cholesky = xtwx.cholesky().ok_or_else(|| {
        ModelError::DegenerateFit(
            "singular outcome design; matched sample lacks covariate variation".to_string()
        )
    })?;
    let beta = cholesky.solve(&xtwy);

    let residuals = &y - &x * &beta;
    let sse: f64 = residuals
        .iter()
        .zip(w.iter())
        .map(|(e, weight)| weight * e * e)
        .sum();

    let degrees_of_freedom = n - p;
    let ate = beta[1];

    let (std_error, t_statistic, p_value) = if sse < EXACT_FIT_SSE {
        (0.0, 0.0, 1.0)
    } else {
        let sigma2 = sse / degrees_of_freedom as f64;
        let covariance = cholesky.inverse() * sigma2;
        let std_error = covariance[(1, 1)].sqrt();

        let t_statistic = ate / std_error;
        let t_dist = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64)
            .map_err(|e| ModelError::DegenerateFit(format!("t distribution: {e}")))?;
        let p_value = 2.0 * (1.0 - t_dist.cdf(t_statistic.abs()));

        (std_error, t_statistic, p_value)
    };

    debug!(ate, std_error, t_statistic, p_value, "effect estimate");

    Ok(EffectEstimate {
        ate,
        std_error,
        t_statistic,
        p_value,
        degrees_of_freedom,
        sample_size: n,
        alpha,
        significant: p_value < alpha
    })
}

/// Offline power companion for pre-registration. Not used in fitting.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PowerAnalysis {
    pub min_effect: f64,
    pub assumed_sd: f64,
    pub alpha: f64,
    pub target_power: f64,
    pub required_per_group: usize,
    /// Power the matched sample actually achieves for `min_effect`.
    pub achieved_power: f64
}

impl PowerAnalysis {
    pub fn new(
        min_effect: f64,
        assumed_sd: f64,
        alpha: f64,
        target_power: f64,
        n_per_group: usize
    ) -> Result<PowerAnalysis, ModelError> {
        let required_per_group = required_sample_size(min_effect, assumed_sd, alpha, target_power)?;

        Ok(PowerAnalysis {
            min_effect,
            assumed_sd,
            alpha,
            target_power,
            required_per_group,
            achieved_power: achieved_power(n_per_group, min_effect, assumed_sd, alpha)?
        })
    }
}

/// Per-group sample size for a two-sample t-test to detect `min_effect` at
/// the given significance and power, under the normal approximation
/// `n = 2 ((z_{1-α/2} + z_{power}) σ / δ)²`.
pub fn required_sample_size(
    min_effect: f64,
    sd: f64,
    alpha: f64,
    power: f64
) -> Result<usize, ModelError> {
    validate_power_inputs(min_effect, sd, alpha)?;
    if !(0.0..1.0).contains(&power) || power <= 0.0 {
        return Err(ModelError::InvalidParameter(format!(
            "power must be in (0, 1), got {power}"
        )));
    }

    let normal = standard_normal();
    let z_alpha = normal.inverse_cdf(1.0 - alpha / 2.0);
    let z_beta = normal.inverse_cdf(power);

    let n = 2.0 * ((z_alpha + z_beta) * sd / min_effect).powi(2);

    Ok(n.ceil() as usize)
}

/// Power achieved by `n_per_group` for the same test; the inverse question
/// of [`required_sample_size`].
pub fn achieved_power(n_per_group: usize, min_effect: f64, sd: f64, alpha: f64) -> Result<f64, ModelError> {
    validate_power_inputs(min_effect, sd, alpha)?;
    if n_per_group == 0 {
        return Err(ModelError::InvalidParameter(
            "n_per_group must be at least 1".to_string()
        ));
    }

    let normal = standard_normal();
    let z_alpha = normal.inverse_cdf(1.0 - alpha / 2.0);
    let shift = min_effect / (sd * (2.0 / n_per_group as f64).sqrt());

    Ok(normal.cdf(shift - z_alpha))
}

fn validate_power_inputs(min_effect: f64, sd: f64, alpha: f64) -> Result<(), ModelError> {
    if min_effect <= 0.0 || !min_effect.is_finite() {
        return Err(ModelError::InvalidParameter(format!(
            "minimum effect size must be positive, got {min_effect}"
        )));
    }
    if sd <= 0.0 || !sd.is_finite() {
        return Err(ModelError::InvalidParameter(format!(
            "standard deviation must be positive, got {sd}"
        )));
    }
    if !(0.0..1.0).contains(&alpha) || alpha <= 0.0 {
        return Err(ModelError::InvalidParameter(format!(
            "alpha must be in (0, 1), got {alpha}"
        )));
    }

    Ok(())
}
