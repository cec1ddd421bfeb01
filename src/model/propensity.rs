use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use strum_macros::{Display, EnumIter, EnumString};
use tracing::debug;

use crate::model::{
    constants::{IRLS_TOLERANCE, MAX_IRLS_ITERATIONS, POSITIVITY_EPSILON},
    error::ModelError,
    structures::unit::Cohort
};

// Fitted means are kept away from the exact boundary so the IRLS weights
// stay invertible; the positivity check below uses a far tighter epsilon.
const MU_FLOOR: f64 = 1e-10;

/// Link function for the treatment-assignment regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Link {
    Logit,
    Probit
}

impl Link {
    /// Mean and mean-derivative at the linear predictor `eta`.
    fn inverse(&self, eta: f64, normal: &Normal) -> (f64, f64) {
        match self {
            Link::Logit => {
                let mu = sigmoid(eta);
                (mu, mu * (1.0 - mu))
            }
            Link::Probit => (normal.cdf(eta), normal.pdf(eta))
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// One propensity score per unit, in cohort order, plus the fitted
/// coefficients for diagnostics. The model itself is not retained.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropensityScores {
    pub link: Link,
    /// Intercept first, then one coefficient per covariate in schema order.
    pub coefficients: Vec<f64>,
    pub values: Vec<f64>,
    pub iterations: usize
}

impl PropensityScores {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn mean(&self) -> f64 {
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

/// Fits a binary-response GLM predicting treatment from the covariates via
/// iteratively reweighted least squares and returns one score per unit.
///
/// Fails on collinear covariates (singular normal equations), on suspected
/// complete separation (non-convergence or a perfectly classifying fit), and
/// on scores that reach the boundary of (0, 1).
pub fn fit(cohort: &Cohort, link: Link) -> Result<PropensityScores, ModelError> {
    cohort.require_both_arms()?;

    let n = cohort.len();
    let p = cohort.covariate_count() + 1;

    if n <= p {
        return Err(ModelError::DegenerateFit(format!(
            "{n} units cannot identify {p} propensity parameters"
        )));
    }

    let normal = standard_normal();
    let x = design_matrix(cohort);
    let y = DVector::from_iterator(n, cohort.units().iter().map(|u| f64::from(u.treated as u8)));

    let mut beta = DVector::zeros(p);
    let mut mu = DVector::from_element(n, 0.5);
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 1..=MAX_IRLS_ITERATIONS {
        iterations = iteration;

        let eta = &x * &beta;
        let mut w = DVector::zeros(n);
        let mut z = DVector::zeros(n);

        for i in 0..n {
            let (m, dm) = link.inverse(eta[i], &normal);
            let m = m.clamp(MU_FLOOR, 1.0 - MU_FLOOR);
            let dm = dm.max(MU_FLOOR);
            let variance = m * (1.0 - m);

            mu[i] = m;
            w[i] = dm * dm / variance;
            z[i] = eta[i] + (y[i] - m) / dm;
        }

        // Weighted normal equations: (X'WX) beta = X'Wz
        let xtw = weighted_transpose(&x, &w);
        let xtwx = &xtw * &x;
        let xtwz = &xtw * &z;

        let cholesky = xtwx.cholesky().ok_or_else(|| {
            ModelError::DegenerateFit(
                "singular normal equations; covariates are collinear".to_string()
            )
        })?;
        let next = cholesky.solve(&xtwz);

        let delta = (&next - &beta).amax();
        beta = next;

        if delta < IRLS_TOLERANCE {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(ModelError::DegenerateFit(format!(
            "no convergence after {MAX_IRLS_ITERATIONS} iterations; possible complete separation"
        )));
    }

    if perfectly_classifies(&y, &mu) {
        return Err(ModelError::DegenerateFit(
            "fit classifies treatment perfectly; complete separation".to_string()
        ));
    }

    let eta = &x * &beta;
    let values: Vec<f64> = (0..n).map(|i| link.inverse(eta[i], &normal).0).collect();

    check_positivity(cohort, &values)?;

    debug!(
        link = %link,
        iterations,
        "propensity fit converged"
    );

    Ok(PropensityScores {
        link,
        coefficients: beta.iter().copied().collect(),
        values,
        iterations
    })
}

fn design_matrix(cohort: &Cohort) -> DMatrix<f64> {
    let n = cohort.len();
    let p = cohort.covariate_count() + 1;

    DMatrix::from_fn(n, p, |i, j| {
        if j == 0 {
            1.0
        } else {
            cohort.units()[i].covariates[j - 1]
        }
    })
}

/// X' with each column i scaled by w_i, so `weighted_transpose(x, w) * x`
/// is X'WX without materializing the diagonal W.
fn weighted_transpose(x: &DMatrix<f64>, w: &DVector<f64>) -> DMatrix<f64> {
    let mut xt = x.transpose();

    for (i, weight) in w.iter().enumerate() {
        xt.column_mut(i).scale_mut(*weight);
    }

    xt
}

fn perfectly_classifies(y: &DVector<f64>, mu: &DVector<f64>) -> bool {
    y.iter().zip(mu.iter()).all(|(yi, mi)| (yi - mi).abs() < 1e-6)
}

fn check_positivity(cohort: &Cohort, values: &[f64]) -> Result<(), ModelError> {
    let violations: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, s)| **s <= POSITIVITY_EPSILON || **s >= 1.0 - POSITIVITY_EPSILON)
        .map(|(i, _)| i)
        .collect();

    match violations.first() {
        None => Ok(()),
        Some(first) => Err(ModelError::PositivityViolation {
            unit: cohort.units()[*first].name.clone(),
            score: values[*first],
            count: violations.len()
        })
    }
}

pub(crate) fn standard_normal() -> Normal {
    Normal::new(0.0, 1.0).expect("standard normal parameters are valid")
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        model::{
            error::ModelError,
            propensity::{fit, sigmoid, Link},
            structures::unit::{Cohort, Unit}
        },
        utils::test_utils::generate_cohort
    };

    #[test]
    fn test_sigmoid_symmetry() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5);
        assert_abs_diff_eq!(sigmoid(3.0) + sigmoid(-3.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scores_strictly_inside_unit_interval() {
        let cohort = generate_cohort(120, 0.4, 0.0, 42);
        let scores = fit(&cohort, Link::Logit).unwrap();

        assert_eq!(scores.values().len(), cohort.len());
        for score in scores.values() {
            assert!(*score > 0.0 && *score < 1.0);
        }
    }

    #[test]
    fn test_probit_and_logit_agree_on_direction() {
        let cohort = generate_cohort(120, 0.4, 0.0, 7);
        let logit = fit(&cohort, Link::Logit).unwrap();
        let probit = fit(&cohort, Link::Probit).unwrap();

        // Slope signs should match between the two links.
        for (a, b) in logit.coefficients.iter().zip(&probit.coefficients).skip(1) {
            assert_eq!(a.signum(), b.signum());
        }
    }

    #[test]
    fn test_treated_units_score_higher_on_average() {
        let cohort = generate_cohort(200, 0.4, 0.0, 11);
        let scores = fit(&cohort, Link::Logit).unwrap();

        let treated_mean: f64 = cohort
            .treated_ids()
            .iter()
            .map(|id| scores.values()[*id])
            .sum::<f64>()
            / cohort.treated_count() as f64;
        let control_mean: f64 = cohort
            .control_ids()
            .iter()
            .map(|id| scores.values()[*id])
            .sum::<f64>()
            / cohort.control_count() as f64;

        assert!(treated_mean > control_mean);
    }

    #[test]
    fn test_single_arm_cohort_rejected() {
        let cohort = Cohort::new(
            vec!["x".to_string()],
            vec![
                Unit::new("a", vec![1.0], true, 0.5),
                Unit::new("b", vec![2.0], true, 0.4),
                Unit::new("c", vec![0.5], true, 0.6),
            ]
        )
        .unwrap();

        assert!(matches!(fit(&cohort, Link::Logit), Err(ModelError::SingleArmCohort)));
    }

    #[test]
    fn test_collinear_covariates_rejected() {
        // Second covariate is an exact multiple of the first.
        let units = (0..20)
            .map(|i| {
                let x = i as f64 / 10.0;
                Unit::new(format!("u{i}"), vec![x, 2.0 * x], i % 3 == 0, 0.5)
            })
            .collect();
        let cohort = Cohort::new(vec!["x".to_string(), "x2".to_string()], units).unwrap();

        assert!(matches!(
            fit(&cohort, Link::Logit),
            Err(ModelError::DegenerateFit(_))
        ));
    }

    #[test]
    fn test_perfect_separation_rejected() {
        // Covariate splits the arms with no overlap at all.
        let units = (0..20)
            .map(|i| {
                let treated = i < 10;
                let x = if treated { 5.0 + i as f64 } else { -5.0 - i as f64 };
                Unit::new(format!("u{i}"), vec![x], treated, 0.5)
            })
            .collect();
        let cohort = Cohort::new(vec!["x".to_string()], units).unwrap();

        assert!(matches!(
            fit(&cohort, Link::Logit),
            Err(ModelError::DegenerateFit(_))
        ));
    }

    #[test]
    fn test_too_few_units_rejected() {
        let cohort = Cohort::new(
            vec!["x".to_string()],
            vec![
                Unit::new("a", vec![1.0], true, 0.5),
                Unit::new("b", vec![2.0], false, 0.4),
            ]
        )
        .unwrap();

        assert!(matches!(
            fit(&cohort, Link::Logit),
            Err(ModelError::DegenerateFit(_))
        ));
    }
}
