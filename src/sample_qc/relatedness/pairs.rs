//! Sample pair kinship records and relationship classification
//!

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::table::KeyedRow;

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    strum::AsRefStr,
    strum::Display,
    strum::EnumIter,
)]
pub enum Relationship {
    #[serde(rename = "unrelated")]
    #[strum(serialize = "unrelated")]
    Unrelated,

    /// Catch-all for second degree or more distant relatives, and for pairs above the second degree
    /// kinship cutoff which don't match any first degree IBD pattern
    #[serde(rename = "second_degree_relatives")]
    #[strum(serialize = "second_degree_relatives")]
    SecondDegreeRelatives,

    #[serde(rename = "parent-child")]
    #[strum(serialize = "parent-child")]
    ParentChild,

    #[serde(rename = "siblings")]
    #[strum(serialize = "siblings")]
    Siblings,

    #[serde(rename = "duplicate_or_twins")]
    #[strum(serialize = "duplicate_or_twins")]
    DuplicateOrTwins,
}

/// Kinship and IBD sharing thresholds used to classify sample pairs
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RelationshipCutoffs {
    /// Pairs with kinship below this value are unrelated
    pub second_degree_min_kin: f64,

    /// Kinship range of first degree relatives
    pub first_degree_kin_thresholds: (f64, f64),

    /// Maximum IBD0 for parent-child pairs and duplicates
    pub ibd0_0_max: f64,
    pub ibd0_25_thresholds: (f64, f64),
    pub ibd1_0_thresholds: (f64, f64),
    pub ibd1_50_thresholds: (f64, f64),
    pub ibd1_100_min: f64,
    pub ibd2_0_max: f64,
    pub ibd2_25_thresholds: (f64, f64),
    pub ibd2_100_thresholds: (f64, f64),
}

impl Default for RelationshipCutoffs {
    fn default() -> Self {
        Self {
            second_degree_min_kin: 0.1,
            first_degree_kin_thresholds: (0.19, 0.4),
            ibd0_0_max: 0.025,
            ibd0_25_thresholds: (0.1, 0.425),
            ibd1_0_thresholds: (-0.2, 0.1),
            ibd1_50_thresholds: (0.4, 0.6),
            ibd1_100_min: 0.75,
            ibd2_0_max: 0.125,
            ibd2_25_thresholds: (0.1, 0.5),
            ibd2_100_thresholds: (0.75, 1.25),
        }
    }
}

fn in_range(x: f64, range: (f64, f64)) -> bool {
    x >= range.0 && x <= range.1
}

/// Classify a sample pair from kinship and IBD sharing proportions
///
pub fn get_relationship(
    kin: f64,
    ibd0: f64,
    ibd1: f64,
    ibd2: f64,
    cutoffs: &RelationshipCutoffs,
) -> Relationship {
    let (first_lower, first_upper) = cutoffs.first_degree_kin_thresholds;
    if kin < cutoffs.second_degree_min_kin {
        Relationship::Unrelated
    } else if kin < first_lower {
        Relationship::SecondDegreeRelatives
    } else if kin < first_upper
        && ibd0 <= cutoffs.ibd0_0_max
        && ibd1 >= cutoffs.ibd1_100_min
        && ibd2 <= cutoffs.ibd2_0_max
    {
        Relationship::ParentChild
    } else if kin < first_upper
        && in_range(ibd0, cutoffs.ibd0_25_thresholds)
        && in_range(ibd1, cutoffs.ibd1_50_thresholds)
        && in_range(ibd2, cutoffs.ibd2_25_thresholds)
    {
        Relationship::Siblings
    } else if kin > first_upper
        && ibd0 < cutoffs.ibd0_0_max
        && in_range(ibd1, cutoffs.ibd1_0_thresholds)
        && in_range(ibd2, cutoffs.ibd2_100_thresholds)
    {
        Relationship::DuplicateOrTwins
    } else {
        Relationship::SecondDegreeRelatives
    }
}

/// Canonically ordered sample pair identifier
///
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PairKey {
    pub i: String,
    pub j: String,
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.i, self.j)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SamplePair {
    /// Lexically smaller sample id of the pair
    pub i: String,
    pub j: String,
    pub kin: f64,
    pub ibd0: f64,
    pub ibd1: f64,
    pub ibd2: f64,
    pub relationship: Relationship,
}

impl SamplePair {
    /// True for any pair classified as second degree relatives or closer
    pub fn is_related(&self) -> bool {
        self.relationship != Relationship::Unrelated
    }
}

impl KeyedRow for SamplePair {
    type Key = PairKey;
    fn key(&self) -> PairKey {
        PairKey {
            i: self.i.clone(),
            j: self.j.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RelatednessGlobals {
    pub relationship_cutoffs: RelationshipCutoffs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_classification() {
        let c = RelationshipCutoffs::default();
        assert_eq!(get_relationship(0.02, 1.0, 0.0, 0.0, &c), Relationship::Unrelated);
        assert_eq!(
            get_relationship(0.12, 0.5, 0.5, 0.0, &c),
            Relationship::SecondDegreeRelatives
        );
        assert_eq!(
            get_relationship(0.25, 0.0, 1.0, 0.0, &c),
            Relationship::ParentChild
        );
        assert_eq!(
            get_relationship(0.25, 0.25, 0.5, 0.25, &c),
            Relationship::Siblings
        );
        assert_eq!(
            get_relationship(0.5, 0.0, 0.0, 1.0, &c),
            Relationship::DuplicateOrTwins
        );
        // first degree kinship with an unrecognized IBD pattern falls into the catch-all
        assert_eq!(
            get_relationship(0.25, 0.6, 0.2, 0.2, &c),
            Relationship::SecondDegreeRelatives
        );
    }

    #[test]
    fn test_configurable_cutoffs() {
        let c = RelationshipCutoffs {
            second_degree_min_kin: 0.15,
            ..Default::default()
        };
        assert_eq!(get_relationship(0.12, 0.5, 0.5, 0.0, &c), Relationship::Unrelated);
    }

    #[test]
    fn test_relationship_names() {
        assert_eq!(Relationship::ParentChild.to_string(), "parent-child");
        assert_eq!(
            Relationship::DuplicateOrTwins.as_ref(),
            "duplicate_or_twins"
        );
    }
}
