// Model constants
pub const MAX_IRLS_ITERATIONS: usize = 50;
pub const IRLS_TOLERANCE: f64 = 1e-8;
// Scores this close to 0 or 1 are treated as positivity violations.
pub const POSITIVITY_EPSILON: f64 = 1e-12;
// Weights below this are considered "not in the matched sample".
pub const WEIGHT_EPSILON: f64 = 1e-9;
pub const DEFAULT_SUBCLASSES: usize = 6;
pub const DEFAULT_ALPHA: f64 = 0.05;
pub const DEFAULT_TARGET_POWER: f64 = 0.8;
pub const DEFAULT_MIN_EFFECT: f64 = 0.02;
