use thiserror::Error;

/// Everything that can go wrong between record assembly and effect
/// estimation. Failures are fatal to the run; nothing is silently
/// defaulted because a defaulted value would flow straight into the
/// causal estimate.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unit '{unit}' is missing a value for covariate '{covariate}'")]
    MissingCovariate { unit: String, covariate: String },

    #[error("Unit '{unit}' has {actual} covariate values, expected {expected}")]
    CovariateArity {
        unit: String,
        expected: usize,
        actual: usize
    },

    #[error("Unit '{unit}' has outcome {value} outside [0, 1]")]
    OutcomeOutOfRange { unit: String, value: f64 },

    #[error("Duplicate unit name '{0}'")]
    DuplicateUnit(String),

    #[error("Join produced no units: the record sets share no names")]
    SchemaMismatch,

    #[error("Cohort must contain at least one treated and one control unit")]
    SingleArmCohort,

    #[error("Degenerate propensity fit: {0}")]
    DegenerateFit(String),

    #[error("Positivity violation: {count} unit(s) have propensity scores at the boundary, first is '{unit}' at {score:e}")]
    PositivityViolation {
        unit: String,
        score: f64,
        count: usize
    },

    #[error("Infeasible matching: {0}")]
    InfeasibleMatching(String),

    #[error("Score vector has {scores} entries but the cohort has {units} units")]
    ScoreArity { scores: usize, units: usize },

    #[error("Weight vector has {weights} entries but the cohort has {units} units")]
    WeightArity { weights: usize, units: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String)
}
