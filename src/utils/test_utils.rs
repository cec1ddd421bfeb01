use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::model::{
    assembly::{AttributeRecord, OutcomeRecord},
    structures::unit::{Cohort, Unit}
};

/// Standard normal draw via Box-Muller, so generators only need a uniform
/// source.
fn sample_normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();

    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Generates a reproducible synthetic cohort with known structure:
/// correlated covariates, treatment assigned through a logistic model on
/// those covariates (confounded by construction), and an outcome that is
/// linear in the covariates plus `effect` for treated units. Pipelines run
/// against this can compare their estimate to the injected ground truth.
pub fn generate_cohort(n: usize, treated_fraction: f64, effect: f64, seed: u64) -> Cohort {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let intercept = logit(treated_fraction.clamp(0.05, 0.95));

    let mut units = Vec::with_capacity(n);
    for i in 0..n {
        let hp = sample_normal(&mut rng);
        let armor = 0.6 * hp + 0.8 * sample_normal(&mut rng);
        let difficulty = sample_normal(&mut rng);

        let eta = intercept + 0.6 * hp + 0.4 * armor - 0.25 * difficulty;
        let assignment_probability = 1.0 / (1.0 + (-eta).exp());
        let treated = rng.random::<f64>() < assignment_probability;

        let noise = 0.03 * sample_normal(&mut rng);
        let outcome = (0.5 + 0.04 * hp - 0.03 * armor + 0.01 * difficulty
            + if treated { effect } else { 0.0 }
            + noise)
            .clamp(0.01, 0.99);

        units.push(Unit::new(
            format!("unit_{i:03}"),
            vec![hp, armor, difficulty],
            treated,
            outcome
        ));
    }

    Cohort::new(
        vec!["hp".to_string(), "armor".to_string(), "difficulty".to_string()],
        units
    )
    .expect("generated cohort is valid")
}

/// Builds a cohort with hand-picked propensity scores: treated units first
/// (ids 0..t), then controls. Returns the score vector in cohort order for
/// feeding the matching engine directly.
pub fn generate_scored_cohort(treated_scores: &[f64], control_scores: &[f64]) -> (Cohort, Vec<f64>) {
    let mut units = Vec::with_capacity(treated_scores.len() + control_scores.len());

    for (i, score) in treated_scores.iter().enumerate() {
        units.push(Unit::new(format!("t{i}"), vec![*score], true, 0.5));
    }
    for (i, score) in control_scores.iter().enumerate() {
        units.push(Unit::new(format!("c{i}"), vec![*score], false, 0.5));
    }

    let scores = treated_scores.iter().chain(control_scores).copied().collect();
    let cohort = Cohort::new(vec!["score".to_string()], units).expect("scored cohort is valid");

    (cohort, scores)
}

/// Generates joinable attribute/outcome record sets describing the same
/// subjects, for exercising assembly. Treated subjects carry the "tank"
/// class label; everyone else is spread over a few other labels.
pub fn generate_record_sets(n: usize, seed: u64) -> (Vec<AttributeRecord>, Vec<OutcomeRecord>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let other_classes = ["marksman", "mage", "assassin", "support"];

    let mut attributes = Vec::with_capacity(n);
    let mut outcomes = Vec::with_capacity(n);

    for i in 0..n {
        let name = format!("champion_{i:03}");

        let hp = 560.0 + 60.0 * sample_normal(&mut rng);
        let armor = 28.0 + 6.0 * sample_normal(&mut rng);
        let difficulty = (1.0 + rng.random::<f64>() * 9.0).round();

        let tanky = (hp - 560.0) / 60.0 + (armor - 28.0) / 6.0;
        let assignment_probability = 1.0 / (1.0 + (-(tanky - 0.8)).exp());
        let treated = rng.random::<f64>() < assignment_probability;

        let class_label = if treated {
            "tank".to_string()
        } else {
            other_classes[i % other_classes.len()].to_string()
        };
        let win_rate = (0.5 + 0.002 * (hp - 560.0) / 6.0 + 0.02 * sample_normal(&mut rng)).clamp(0.05, 0.95);

        let mut covariates = IndexMap::new();
        covariates.insert("hp".to_string(), hp);
        covariates.insert("armor".to_string(), armor);
        covariates.insert("difficulty".to_string(), difficulty);

        attributes.push(AttributeRecord::new(name.clone(), covariates));
        outcomes.push(OutcomeRecord::new(name, class_label, win_rate));
    }

    (attributes, outcomes)
}
