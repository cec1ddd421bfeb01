use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// How treated and control units are paired into matched sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchPolicy {
    /// Greedy 1:1 nearest-neighbor matching without replacement.
    Nearest,
    /// Globally optimal 1:k assignment minimizing total distance.
    Optimal,
    /// Disjoint sets covering the whole cohort, fractional control weights.
    Full,
    /// Propensity-score strata, inverse treatment-proportion weights.
    Subclass
}

/// Visit order for greedy nearest-neighbor matching. The order changes which
/// treated unit gets first pick of the control pool, so it is part of the
/// reproducibility contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NearestOrder {
    /// Highest propensity score first. The default: high-score treated units
    /// have the fewest comparable controls and should pick first.
    Descending,
    /// Lowest propensity score first.
    Ascending,
    /// Cohort insertion order.
    Data
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    use crate::model::structures::match_policy::{MatchPolicy, NearestOrder};

    #[test]
    fn test_policy_from_str() {
        assert_eq!(MatchPolicy::from_str("nearest"), Ok(MatchPolicy::Nearest));
        assert_eq!(MatchPolicy::from_str("optimal"), Ok(MatchPolicy::Optimal));
        assert_eq!(MatchPolicy::from_str("full"), Ok(MatchPolicy::Full));
        assert_eq!(MatchPolicy::from_str("subclass"), Ok(MatchPolicy::Subclass));
        assert!(MatchPolicy::from_str("exact").is_err());
    }

    #[test]
    fn test_policy_display_round_trip() {
        for policy in MatchPolicy::iter() {
            assert_eq!(MatchPolicy::from_str(&policy.to_string()), Ok(policy));
        }
    }

    #[test]
    fn test_order_from_str() {
        assert_eq!(NearestOrder::from_str("descending"), Ok(NearestOrder::Descending));
        assert_eq!(NearestOrder::from_str("ascending"), Ok(NearestOrder::Ascending));
        assert_eq!(NearestOrder::from_str("data"), Ok(NearestOrder::Data));
    }
}
