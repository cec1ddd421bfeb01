use std::str::FromStr;

use clap::Parser;

use crate::model::{
    error::ModelError,
    matching::MatchOptions,
    propensity::Link,
    structures::match_policy::{MatchPolicy, NearestOrder},
    study::StudyConfig
};

#[derive(Parser, Clone)]
#[command(
    display_name = "Cohort Processor",
    long_about = "Runs the observational-study pipeline (propensity model, matching, \
    balance diagnostics, effect estimation) over a reproducible synthetic cohort"
)]
pub struct Args {
    /// Number of units in the generated cohort
    #[arg(short, long, env, default_value_t = 200)]
    pub units: usize,

    /// Baseline share of units assigned to treatment
    #[arg(long, env, default_value_t = 0.35)]
    pub treated_fraction: f64,

    /// True treatment effect injected into the generated outcomes,
    /// so the reported estimate can be checked against ground truth
    #[arg(long, env, default_value_t = 0.05)]
    pub effect: f64,

    /// RNG seed for the cohort generator
    #[arg(long, env, default_value_t = 42)]
    pub seed: u64,

    /// Link function for the propensity model
    #[arg(long, env, default_value = "logit", value_parser = ["logit", "probit"])]
    pub link: String,

    /// Matching policy
    #[arg(short, long, env, default_value = "nearest", value_parser = ["nearest", "optimal", "full", "subclass"])]
    pub policy: String,

    /// Treated visit order for nearest-neighbor matching
    #[arg(long, env, default_value = "descending", value_parser = ["descending", "ascending", "data"])]
    pub order: String,

    /// Maximum propensity-score distance for a nearest-neighbor pair
    #[arg(long, env)]
    pub caliper: Option<f64>,

    /// Controls per treated unit for optimal matching
    #[arg(long, env, default_value_t = 1)]
    pub ratio: usize,

    /// Stratum count for subclass matching
    #[arg(long, env, default_value_t = 6)]
    pub subclasses: usize,

    /// Two-sided significance level for the effect test
    #[arg(long, env, default_value_t = 0.05)]
    pub alpha: f64,

    /// Pre-registered minimum effect size for the power calculation
    #[arg(long, env, default_value_t = 0.02)]
    pub min_effect: f64,

    /// Target power for the required-sample-size calculation
    #[arg(long, env, default_value_t = 0.8)]
    pub target_power: f64,

    /// Emit the full report as JSON instead of the text summary
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "RUST_LOG",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        help = "Sets the logging verbosity"
    )]
    pub log_level: String
}

impl Args {
    pub fn study_config(&self) -> Result<StudyConfig, ModelError> {
        let link = Link::from_str(&self.link)
            .map_err(|_| ModelError::InvalidParameter(format!("unknown link '{}'", self.link)))?;
        let policy = MatchPolicy::from_str(&self.policy)
            .map_err(|_| ModelError::InvalidParameter(format!("unknown policy '{}'", self.policy)))?;
        let order = NearestOrder::from_str(&self.order)
            .map_err(|_| ModelError::InvalidParameter(format!("unknown order '{}'", self.order)))?;

        Ok(StudyConfig {
            link,
            policy,
            options: MatchOptions {
                order,
                caliper: self.caliper,
                ratio: self.ratio,
                subclasses: self.subclasses
            },
            alpha: self.alpha,
            min_effect: self.min_effect,
            target_power: self.target_power
        })
    }
}
