use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::error::ModelError;

/// One subject of the study.
///
/// The `id` is a dense index assigned by the [`Cohort`] in insertion order.
/// Every downstream artifact (scores, weights, matched sets) is keyed by it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: usize,
    pub name: String,
    pub covariates: Vec<f64>,
    pub treated: bool,
    pub outcome: f64
}

impl Unit {
    pub fn new(name: impl Into<String>, covariates: Vec<f64>, treated: bool, outcome: f64) -> Unit {
        Unit {
            id: 0,
            name: name.into(),
            covariates,
            treated,
            outcome
        }
    }
}

/// An immutable, order-stable collection of units plus the covariate schema.
///
/// Construction validates every unit invariant up front: finite covariates of
/// the right arity, outcome inside [0, 1], unique names. Iteration order is
/// insertion order and anchors the determinism of every downstream stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    covariate_names: Vec<String>,
    units: Vec<Unit>,
    #[serde(skip)]
    name_index: IndexMap<String, usize>
}

impl Cohort {
    pub fn new(covariate_names: Vec<String>, mut units: Vec<Unit>) -> Result<Cohort, ModelError> {
        let expected = covariate_names.len();
        let mut name_index = IndexMap::with_capacity(units.len());

        for (id, unit) in units.iter_mut().enumerate() {
            unit.id = id;

            if unit.covariates.len() != expected {
                return Err(ModelError::CovariateArity {
                    unit: unit.name.clone(),
                    expected,
                    actual: unit.covariates.len()
                });
            }

            for (value, covariate) in unit.covariates.iter().zip(&covariate_names) {
                if !value.is_finite() {
                    return Err(ModelError::MissingCovariate {
                        unit: unit.name.clone(),
                        covariate: covariate.clone()
                    });
                }
            }

            if !(0.0..=1.0).contains(&unit.outcome) || !unit.outcome.is_finite() {
                return Err(ModelError::OutcomeOutOfRange {
                    unit: unit.name.clone(),
                    value: unit.outcome
                });
            }

            if name_index.insert(unit.name.clone(), id).is_some() {
                return Err(ModelError::DuplicateUnit(unit.name.clone()));
            }
        }

        Ok(Cohort {
            covariate_names,
            units,
            name_index
        })
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    pub fn covariate_count(&self) -> usize {
        self.covariate_names.len()
    }

    pub fn get(&self, name: &str) -> Option<&Unit> {
        self.name_index.get(name).map(|id| &self.units[*id])
    }

    /// Unit ids of the treated arm, in insertion order.
    pub fn treated_ids(&self) -> Vec<usize> {
        self.units.iter().filter(|u| u.treated).map(|u| u.id).collect()
    }

    /// Unit ids of the control arm, in insertion order.
    pub fn control_ids(&self) -> Vec<usize> {
        self.units.iter().filter(|u| !u.treated).map(|u| u.id).collect()
    }

    pub fn treated_count(&self) -> usize {
        self.units.iter().filter(|u| u.treated).count()
    }

    pub fn control_count(&self) -> usize {
        self.units.iter().filter(|u| !u.treated).count()
    }

    /// Fails unless both arms are represented. Called by the stages that are
    /// meaningless on a single-arm cohort.
    pub fn require_both_arms(&self) -> Result<(), ModelError> {
        if self.treated_count() == 0 || self.control_count() == 0 {
            return Err(ModelError::SingleArmCohort);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        error::ModelError,
        structures::unit::{Cohort, Unit}
    };

    fn names() -> Vec<String> {
        vec!["hp".to_string(), "armor".to_string()]
    }

    #[test]
    fn test_cohort_assigns_dense_ids() {
        let cohort = Cohort::new(
            names(),
            vec![
                Unit::new("a", vec![1.0, 2.0], true, 0.5),
                Unit::new("b", vec![3.0, 4.0], false, 0.4),
            ]
        )
        .unwrap();

        assert_eq!(cohort.units()[0].id, 0);
        assert_eq!(cohort.units()[1].id, 1);
        assert_eq!(cohort.get("b").unwrap().id, 1);
    }

    #[test]
    fn test_cohort_rejects_arity_mismatch() {
        let result = Cohort::new(names(), vec![Unit::new("a", vec![1.0], true, 0.5)]);

        assert!(matches!(result, Err(ModelError::CovariateArity { .. })));
    }

    #[test]
    fn test_cohort_rejects_non_finite_covariate() {
        let result = Cohort::new(names(), vec![Unit::new("a", vec![1.0, f64::NAN], true, 0.5)]);

        assert!(matches!(result, Err(ModelError::MissingCovariate { .. })));
    }

    #[test]
    fn test_cohort_rejects_outcome_out_of_range() {
        let result = Cohort::new(names(), vec![Unit::new("a", vec![1.0, 2.0], true, 1.2)]);

        assert!(matches!(result, Err(ModelError::OutcomeOutOfRange { .. })));
    }

    #[test]
    fn test_cohort_rejects_duplicate_names() {
        let result = Cohort::new(
            names(),
            vec![
                Unit::new("a", vec![1.0, 2.0], true, 0.5),
                Unit::new("a", vec![3.0, 4.0], false, 0.4),
            ]
        );

        assert!(matches!(result, Err(ModelError::DuplicateUnit(_))));
    }

    #[test]
    fn test_arm_partition() {
        let cohort = Cohort::new(
            names(),
            vec![
                Unit::new("a", vec![1.0, 2.0], true, 0.5),
                Unit::new("b", vec![3.0, 4.0], false, 0.4),
                Unit::new("c", vec![5.0, 6.0], true, 0.6),
            ]
        )
        .unwrap();

        assert_eq!(cohort.treated_ids(), vec![0, 2]);
        assert_eq!(cohort.control_ids(), vec![1]);
        assert!(cohort.require_both_arms().is_ok());
    }
}
