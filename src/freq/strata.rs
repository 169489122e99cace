//! Frequency strata: ordered label-sets and the lookup dictionary from joined labels to array index
//!
//! The position of each label-set in the strata list is the position of its aggregate in every
//! per-variant frequency array. Consumers look up positions through the index dictionary, so the
//! order is fully determined by the input population, sex, subset and downsampling sets.
//!

use std::collections::BTreeMap;

use itertools::Itertools;
use simple_error::{SimpleResult, bail};

/// One stratum, as a map from dimension name to label
pub type LabelSet = BTreeMap<String, String>;

pub const GROUP_KEY: &str = "group";
pub const POP_KEY: &str = "pop";
pub const SEX_KEY: &str = "sex";
pub const SUBSET_KEY: &str = "subset";
pub const DOWNSAMPLING_KEY: &str = "downsampling";

pub const ADJ_GROUP: &str = "adj";
pub const RAW_GROUP: &str = "raw";

pub const SEX_LABELS: [&str; 2] = ["XX", "XY"];

/// Order of label-set values in index dictionary keys
const INDEX_KEY_ORDER: [&str; 5] = [SUBSET_KEY, DOWNSAMPLING_KEY, POP_KEY, SEX_KEY, GROUP_KEY];

pub const INDEX_KEY_DELIMITER: &str = "-";

/// Sample subsets which may be used to restrict frequency computation
pub const KNOWN_SUBSETS: [&str; 7] = [
    "non_v2",
    "non_topmed",
    "non_cancer",
    "controls_and_biobanks",
    "non_neuro",
    "tgp",
    "hgdp",
];

/// Subsets whose ancestry labels are stored as subpopulations
pub const SUBPOP_SUBSETS: [&str; 2] = ["hgdp", "tgp"];

/// Check that a set of subsets can be stratified together
///
/// Subsets storing ancestry as subpopulation can't be combined with subsets using the inferred
/// population labels, because the population dimension would mix two label systems.
///
pub fn validate_subsets(subsets: &[String]) -> SimpleResult<()> {
    let unknown = subsets
        .iter()
        .filter(|x| !KNOWN_SUBSETS.contains(&x.as_str()))
        .collect::<Vec<_>>();
    if !unknown.is_empty() {
        bail!(
            "Unknown subset(s): {}. Subsets must be one of: {}",
            unknown.iter().join(", "),
            KNOWN_SUBSETS.join(", ")
        );
    }

    let subpop_count = subsets
        .iter()
        .filter(|x| SUBPOP_SUBSETS.contains(&x.as_str()))
        .count();
    if subpop_count > 0 && subpop_count < subsets.len() {
        bail!(
            "Subsets storing ancestry as subpopulation ({}) can't be combined with other subsets: {}",
            SUBPOP_SUBSETS.join(", "),
            subsets.join(", ")
        );
    }
    Ok(())
}

/// True if frequency strata for these subsets use the subpopulation labels
pub fn uses_subpop_labels(subsets: &[String]) -> bool {
    !subsets.is_empty() && subsets.iter().all(|x| SUBPOP_SUBSETS.contains(&x.as_str()))
}

/// Subset label attached to every stratum of a subset run
pub fn subset_label(subsets: &[String]) -> Option<String> {
    if subsets.is_empty() {
        None
    } else {
        Some(subsets.join("|"))
    }
}

#[cfg(test)]
fn label_set(pairs: &[(&str, &str)]) -> LabelSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Inputs defining the strata of one frequency run
///
#[derive(Clone, Debug, Default)]
pub struct StrataConfig {
    /// Sample count per population label
    pub pop_counts: BTreeMap<String, usize>,

    /// Emit the sex and population-by-sex strata
    pub include_sex: bool,

    /// Downsampling sizes, ascending
    pub downsamplings: Vec<u32>,

    pub subset: Option<String>,
}

/// Build the ordered list of frequency strata
///
/// Each label-set is emitted as an adj stratum followed by the matching raw stratum, in the order:
/// overall, each population, each sex, each population by sex, then each downsampling size over all
/// samples followed by that size in every population with at least as many samples.
///
pub fn build_strata(config: &StrataConfig) -> Vec<LabelSet> {
    let mut base: Vec<Vec<(&str, String)>> = vec![Vec::new()];
    for pop in config.pop_counts.keys() {
        base.push(vec![(POP_KEY, pop.clone())]);
    }
    if config.include_sex {
        for sex in SEX_LABELS {
            base.push(vec![(SEX_KEY, sex.to_string())]);
        }
        for pop in config.pop_counts.keys() {
            for sex in SEX_LABELS {
                base.push(vec![(POP_KEY, pop.clone()), (SEX_KEY, sex.to_string())]);
            }
        }
    }
    for &n in config.downsamplings.iter() {
        base.push(vec![(DOWNSAMPLING_KEY, n.to_string())]);
        for (pop, &count) in config.pop_counts.iter() {
            if count >= n as usize {
                base.push(vec![(DOWNSAMPLING_KEY, n.to_string()), (POP_KEY, pop.clone())]);
            }
        }
    }

    let mut strata = Vec::with_capacity(base.len() * 2);
    for labels in base {
        for group in [ADJ_GROUP, RAW_GROUP] {
            let mut x = labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<LabelSet>();
            x.insert(GROUP_KEY.to_string(), group.to_string());
            if let Some(subset) = &config.subset {
                x.insert(SUBSET_KEY.to_string(), subset.clone());
            }
            strata.push(x);
        }
    }
    strata
}

/// Join the values of a label-set into its index dictionary key
///
pub fn index_key(labels: &LabelSet) -> String {
    INDEX_KEY_ORDER
        .iter()
        .filter_map(|k| labels.get(*k))
        .join(INDEX_KEY_DELIMITER)
}

/// Map each stratum's joined label key to its position in the strata list
///
pub fn make_index_dict(strata: &[LabelSet]) -> BTreeMap<String, usize> {
    strata
        .iter()
        .enumerate()
        .map(|(i, x)| (index_key(x), i))
        .collect()
}

/// Position of the stratum with exactly the given labels
///
#[cfg(test)]
pub fn find_stratum(strata: &[LabelSet], pairs: &[(&str, &str)]) -> Option<usize> {
    let target = label_set(pairs);
    strata.iter().position(|x| *x == target)
}
