use approx::assert_abs_diff_eq;

use cohort_processor::{
    model::{
        assembly::assemble,
        matching::MatchOptions,
        structures::match_policy::{MatchPolicy, NearestOrder},
        study::{StudyConfig, StudyModel}
    },
    utils::test_utils::{generate_cohort, generate_record_sets}
};

fn config_for(policy: MatchPolicy) -> StudyConfig {
    StudyConfig {
        policy,
        options: MatchOptions {
            order: NearestOrder::Descending,
            caliper: None,
            ratio: 1,
            subclasses: 3
        },
        ..StudyConfig::default()
    }
}

#[test]
fn assembled_records_flow_through_the_whole_pipeline() {
    let (attributes, outcomes) = generate_record_sets(220, 42);
    let covariates = vec!["hp".to_string(), "armor".to_string(), "difficulty".to_string()];

    let cohort = assemble(&attributes, &outcomes, "tank", &covariates).unwrap();
    assert!(cohort.treated_count() > 0);
    assert!(cohort.control_count() > 0);

    let report = StudyModel::new(config_for(MatchPolicy::Nearest))
        .process(&cohort)
        .unwrap();

    assert_eq!(report.units, cohort.len());
    assert!(report.propensity.min > 0.0 && report.propensity.max < 1.0);
    assert_eq!(report.balance_before.rows.len(), 3);
    assert!(report.matching.matched_treated > 0);
    assert!(report.effect.sample_size > 0);
}

#[test]
fn every_policy_completes_on_the_same_cohort() {
    let cohort = generate_cohort(240, 0.3, 0.05, 7);

    for policy in [
        MatchPolicy::Nearest,
        MatchPolicy::Optimal,
        MatchPolicy::Full,
        MatchPolicy::Subclass,
    ] {
        let report = StudyModel::new(config_for(policy)).process(&cohort).unwrap();

        assert_eq!(report.matching.policy, policy, "{policy} report mislabeled");
        assert!(
            report.matching.matched_treated > 0,
            "{policy} matched no treated units"
        );
        assert!(
            report.matching.matched_controls > 0,
            "{policy} matched no controls"
        );
    }
}

#[test]
fn full_and_subclass_keep_every_unit() {
    let cohort = generate_cohort(180, 0.4, 0.0, 3);

    for policy in [MatchPolicy::Full, MatchPolicy::Subclass] {
        let report = StudyModel::new(config_for(policy)).process(&cohort).unwrap();

        assert_eq!(
            report.matching.matched_treated + report.matching.matched_controls,
            cohort.len(),
            "{policy} dropped units"
        );
        assert_eq!(report.matching.dropped_treated, 0);
        assert_eq!(report.matching.dropped_controls, 0);
    }
}

#[test]
fn identical_runs_produce_identical_reports() {
    let cohort = generate_cohort(150, 0.35, 0.08, 11);

    for policy in [
        MatchPolicy::Nearest,
        MatchPolicy::Optimal,
        MatchPolicy::Full,
        MatchPolicy::Subclass,
    ] {
        let model = StudyModel::new(config_for(policy));

        let first = model.process(&cohort).unwrap();
        let second = model.process(&cohort).unwrap();

        assert_eq!(first, second, "{policy} run was not reproducible");
    }
}

#[test]
fn nearest_with_caliper_reports_dropped_units() {
    let cohort = generate_cohort(200, 0.45, 0.0, 19);
    let mut config = config_for(MatchPolicy::Nearest);
    config.options.caliper = Some(0.001);

    let report = StudyModel::new(config).process(&cohort).unwrap();

    // A tight caliper on a confounded cohort cannot place everyone.
    assert!(report.matching.dropped_treated > 0);
    assert_eq!(
        report.matching.matched_treated + report.matching.dropped_treated,
        report.treated
    );
}

#[test]
fn null_effect_cohort_reports_a_null_effect() {
    let cohort = generate_cohort(260, 0.35, 0.0, 23);

    let report = StudyModel::new(config_for(MatchPolicy::Full)).process(&cohort).unwrap();

    assert_abs_diff_eq!(report.effect.ate, 0.0, epsilon = 0.03);
}

#[test]
fn report_serializes_to_json() {
    let cohort = generate_cohort(160, 0.4, 0.05, 5);

    let report = StudyModel::new(config_for(MatchPolicy::Subclass))
        .process(&cohort)
        .unwrap();
    let json = serde_json::to_string(&report).unwrap();

    for key in [
        "\"propensity\"",
        "\"balanceBefore\"",
        "\"balanceAfter\"",
        "\"matching\"",
        "\"effect\"",
        "\"power\"",
        "\"subclass\"",
    ] {
        assert!(json.contains(key), "missing {key} in serialized report");
    }
}
