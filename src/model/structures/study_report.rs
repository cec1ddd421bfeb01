use serde::Serialize;

use crate::model::{
    balance::{BalanceImprovement, BalanceTable},
    constants::WEIGHT_EPSILON,
    effect::{EffectEstimate, PowerAnalysis},
    propensity::{Link, PropensityScores},
    structures::{match_policy::MatchPolicy, matched_sample::MatchedSample, unit::Cohort}
};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoefficientEntry {
    pub name: String,
    pub value: f64
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropensitySummary {
    pub link: Link,
    pub coefficients: Vec<CoefficientEntry>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub iterations: usize
}

impl PropensitySummary {
    pub fn from_scores(cohort: &Cohort, scores: &PropensityScores) -> PropensitySummary {
        let mut names = vec!["intercept".to_string()];
        names.extend(cohort.covariate_names().iter().cloned());

        PropensitySummary {
            link: scores.link,
            coefficients: names
                .into_iter()
                .zip(&scores.coefficients)
                .map(|(name, value)| CoefficientEntry { name, value: *value })
                .collect(),
            min: scores.min(),
            max: scores.max(),
            mean: scores.mean(),
            iterations: scores.iterations
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchingSummary {
    pub policy: MatchPolicy,
    pub sets: usize,
    pub matched_treated: usize,
    pub matched_controls: usize,
    pub dropped_treated: usize,
    pub dropped_controls: usize,
    pub total_distance: f64
}

impl MatchingSummary {
    pub fn from_sample(cohort: &Cohort, sample: &MatchedSample) -> MatchingSummary {
        let matched = |treated: bool| {
            cohort
                .units()
                .iter()
                .filter(|u| u.treated == treated && sample.weights[u.id] > WEIGHT_EPSILON)
                .count()
        };

        MatchingSummary {
            policy: sample.policy,
            sets: sample.sets.len(),
            matched_treated: matched(true),
            matched_controls: matched(false),
            dropped_treated: sample.dropped_treated,
            dropped_controls: sample.dropped_controls,
            total_distance: sample.total_distance
        }
    }
}

/// The machine-readable result of one pipeline run.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyReport {
    pub units: usize,
    pub treated: usize,
    pub controls: usize,
    pub propensity: PropensitySummary,
    pub balance_before: BalanceTable,
    pub balance_after: BalanceTable,
    pub balance_improvement: BalanceImprovement,
    pub matching: MatchingSummary,
    pub effect: EffectEstimate,
    /// Absent when the matched outcomes carry no variance to power against.
    pub power: Option<PowerAnalysis>
}
