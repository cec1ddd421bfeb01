use clap::Parser;
use tracing::{error, info};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cohort_processor::{
    args::Args,
    model::{structures::study_report::StudyReport, study::StudyModel},
    utils::test_utils::generate_cohort
};

fn main() {
    let args = Args::parse();

    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();

    let config = match args.study_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    info!(
        units = args.units,
        treated_fraction = args.treated_fraction,
        effect = args.effect,
        seed = args.seed,
        "generating synthetic cohort"
    );
    let cohort = generate_cohort(args.units, args.treated_fraction, args.effect, args.seed);

    let report = match StudyModel::new(config).process(&cohort) {
        Ok(report) => report,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).expect("report serializes to JSON")
        );
    } else {
        print_summary(&report, args.effect);
    }
}

fn print_summary(report: &StudyReport, injected_effect: f64) {
    println!(
        "Cohort: {} units ({} treated, {} controls)",
        report.units, report.treated, report.controls
    );
    println!(
        "Propensity ({}): scores in [{:.4}, {:.4}], mean {:.4}, {} iterations",
        report.propensity.link,
        report.propensity.min,
        report.propensity.max,
        report.propensity.mean,
        report.propensity.iterations
    );
    println!(
        "Matching ({}): {} sets, {}+{} matched, {}+{} dropped, total distance {:.4}",
        report.matching.policy,
        report.matching.sets,
        report.matching.matched_treated,
        report.matching.matched_controls,
        report.matching.dropped_treated,
        report.matching.dropped_controls,
        report.matching.total_distance
    );

    println!("Balance (standardized mean differences, before -> after):");
    for before in &report.balance_before.rows {
        let after = report
            .balance_after
            .row(&before.covariate)
            .map_or(f64::NAN, |r| r.std_mean_diff);
        println!(
            "  {:<12} {:>7.4} -> {:>7.4}",
            before.covariate, before.std_mean_diff, after
        );
    }
    if !report.balance_improvement.worsened.is_empty() {
        println!(
            "  worsened on: {}",
            report.balance_improvement.worsened.join(", ")
        );
    }

    println!(
        "Effect: ATE {:.4} (injected {:.4}), se {:.4}, t {:.3}, p {:.4} ({})",
        report.effect.ate,
        injected_effect,
        report.effect.std_error,
        report.effect.t_statistic,
        report.effect.p_value,
        if report.effect.significant {
            "significant"
        } else {
            "not significant"
        }
    );

    match &report.power {
        Some(power) => println!(
            "Power: {} per group required for effect {:.3} at power {:.2}; achieved {:.3}",
            power.required_per_group, power.min_effect, power.target_power, power.achieved_power
        ),
        None => println!("Power: skipped (no outcome variance in the matched sample)")
    }
}
