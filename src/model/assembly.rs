use indexmap::IndexMap;
use tracing::{debug, info};

use crate::model::{
    error::ModelError,
    structures::unit::{Cohort, Unit}
};

/// Covariate side of the join: one record per subject name.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRecord {
    pub name: String,
    pub covariates: IndexMap<String, f64>
}

impl AttributeRecord {
    pub fn new(name: impl Into<String>, covariates: IndexMap<String, f64>) -> AttributeRecord {
        AttributeRecord {
            name: name.into(),
            covariates
        }
    }
}

/// Outcome side of the join: class label (treatment is derived from it) and
/// the outcome fraction.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub name: String,
    pub class_label: String,
    pub outcome: f64
}

impl OutcomeRecord {
    pub fn new(name: impl Into<String>, class_label: impl Into<String>, outcome: f64) -> OutcomeRecord {
        OutcomeRecord {
            name: name.into(),
            class_label: class_label.into(),
            outcome
        }
    }
}

/// Inner-joins the two record sets on the subject name and derives the
/// treatment flag from the class label.
///
/// Unit order follows the attribute records, so the assembled cohort is
/// order-stable. Names present on only one side are counted and logged;
/// an empty join is a schema mismatch. A joined record missing one of the
/// requested covariates is a hard error, since an imputed value would flow
/// straight into the propensity model.
pub fn assemble(
    attributes: &[AttributeRecord],
    outcomes: &[OutcomeRecord],
    treated_class: &str,
    covariate_names: &[String]
) -> Result<Cohort, ModelError> {
    let mut outcome_index: IndexMap<&str, &OutcomeRecord> = IndexMap::with_capacity(outcomes.len());
    for record in outcomes {
        if outcome_index.insert(record.name.as_str(), record).is_some() {
            return Err(ModelError::DuplicateUnit(record.name.clone()));
        }
    }

    let mut units = Vec::with_capacity(attributes.len());
    let mut unmatched_attributes = 0;
    let mut matched_names = 0;

    for record in attributes {
        let Some(outcome) = outcome_index.get(record.name.as_str()) else {
            unmatched_attributes += 1;
            continue;
        };
        matched_names += 1;

        let mut covariates = Vec::with_capacity(covariate_names.len());
        for covariate in covariate_names {
            match record.covariates.get(covariate) {
                Some(value) => covariates.push(*value),
                None => {
                    return Err(ModelError::MissingCovariate {
                        unit: record.name.clone(),
                        covariate: covariate.clone()
                    })
                }
            }
        }

        units.push(Unit::new(
            record.name.clone(),
            covariates,
            outcome.class_label == treated_class,
            outcome.outcome
        ));
    }

    if units.is_empty() {
        return Err(ModelError::SchemaMismatch);
    }

    let unmatched_outcomes = outcomes.len() - matched_names;
    if unmatched_attributes > 0 || unmatched_outcomes > 0 {
        info!(
            unmatched_attributes,
            unmatched_outcomes, "names present on only one side of the join"
        );
    }

    let cohort = Cohort::new(covariate_names.to_vec(), units)?;

    debug!(
        units = cohort.len(),
        treated = cohort.treated_count(),
        controls = cohort.control_count(),
        "cohort assembled"
    );

    Ok(cohort)
}
