use serde::Serialize;
use tracing::{info, warn};

use crate::model::{
    balance::{balance, BalanceImprovement},
    constants::{DEFAULT_ALPHA, DEFAULT_MIN_EFFECT, DEFAULT_TARGET_POWER, WEIGHT_EPSILON},
    effect::{estimate, PowerAnalysis},
    error::ModelError,
    matching::{match_units, MatchOptions},
    propensity::{self, Link},
    structures::{
        match_policy::MatchPolicy,
        study_report::{MatchingSummary, PropensitySummary, StudyReport},
        unit::Cohort
    }
};

/// Everything a pipeline run is parameterized by.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyConfig {
    pub link: Link,
    pub policy: MatchPolicy,
    pub options: MatchOptions,
    pub alpha: f64,
    /// Pre-registered minimum effect size for the power companion.
    pub min_effect: f64,
    pub target_power: f64
}

impl Default for StudyConfig {
    fn default() -> Self {
        StudyConfig {
            link: Link::Logit,
            policy: MatchPolicy::Nearest,
            options: MatchOptions::default(),
            alpha: DEFAULT_ALPHA,
            min_effect: DEFAULT_MIN_EFFECT,
            target_power: DEFAULT_TARGET_POWER
        }
    }
}

pub struct StudyModel {
    config: StudyConfig
}

impl StudyModel {
    pub fn new(config: StudyConfig) -> StudyModel {
        StudyModel { config }
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// # Pipeline
    ///
    /// Runs the four stages in order, each consuming the previous stage's
    /// immutable artifact:
    /// 1. Fit the propensity model and score every unit.
    /// 2. Diagnose covariate balance on the raw cohort.
    /// 3. Build the matched sample under the configured policy.
    /// 4. Re-diagnose balance, estimate the treatment effect on the matched
    ///    sample, and attach the offline power calculation.
    ///
    /// Any stage failure aborts the run; there is nothing sensible to
    /// estimate from a half-built sample.
    pub fn process(&self, cohort: &Cohort) -> Result<StudyReport, ModelError> {
        info!(
            units = cohort.len(),
            treated = cohort.treated_count(),
            controls = cohort.control_count(),
            link = %self.config.link,
            policy = %self.config.policy,
            "processing study cohort"
        );

        let scores = propensity::fit(cohort, self.config.link)?;
        let balance_before = balance(cohort, None)?;

        let sample = match_units(cohort, scores.values(), self.config.policy, &self.config.options)?;
        let balance_after = balance(cohort, Some(&sample.weights))?;
        let improvement = BalanceImprovement::compare(&balance_before, &balance_after);

        let effect = estimate(cohort, &sample.weights, self.config.alpha)?;
        let power = self.power_analysis(cohort, &sample.weights)?;

        info!(
            matched = sample.matched_units(),
            ate = effect.ate,
            p_value = effect.p_value,
            "study complete"
        );

        Ok(StudyReport {
            units: cohort.len(),
            treated: cohort.treated_count(),
            controls: cohort.control_count(),
            propensity: PropensitySummary::from_scores(cohort, &scores),
            balance_before,
            balance_after,
            balance_improvement: improvement,
            matching: MatchingSummary::from_sample(cohort, &sample),
            effect,
            power
        })
    }

    /// Power is computed against the matched sample's outcome spread and the
    /// smaller matched arm. A zero-variance outcome has nothing to power
    /// against; that degenerates to `None` rather than killing a run whose
    /// effect estimate is still perfectly well defined.
    fn power_analysis(&self, cohort: &Cohort, weights: &[f64]) -> Result<Option<PowerAnalysis>, ModelError> {
        let matched: Vec<&_> = cohort
            .units()
            .iter()
            .filter(|u| weights[u.id] > WEIGHT_EPSILON)
            .collect();

        let n = matched.len();
        let mean = matched.iter().map(|u| u.outcome).sum::<f64>() / n as f64;
        let variance = matched.iter().map(|u| (u.outcome - mean).powi(2)).sum::<f64>() / (n - 1) as f64;

        if variance <= f64::EPSILON {
            warn!("matched outcomes have no variance; skipping power analysis");
            return Ok(None);
        }

        let treated = matched.iter().filter(|u| u.treated).count();
        let per_group = treated.min(n - treated);

        PowerAnalysis::new(
            self.config.min_effect,
            variance.sqrt(),
            self.config.alpha,
            self.config.target_power,
            per_group
        )
        .map(Some)
    }
}
