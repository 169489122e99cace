//! Filtering allele frequency and popmax, both read from the stratified frequency array
//!

use serde::{Deserialize, Serialize};

use super::aggregate::CallStats;
use super::strata::{ADJ_GROUP, GROUP_KEY, LabelSet, POP_KEY, SEX_KEY, SUBSET_KEY};
use crate::stats_utils::filtering_allele_frequency;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FafEntry {
    pub faf95: f64,
    pub faf99: f64,
}

/// Population with the highest adj allele frequency
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Popmax {
    pub pop: String,
    pub ac: u32,
    pub an: u32,
    pub af: f64,
    pub homozygote_count: u32,

    /// None if the population has no FAF entry
    pub faf95: Option<f64>,
}

/// Label-set keys other than the subset label
fn stratum_keys(labels: &LabelSet) -> Vec<&str> {
    labels
        .keys()
        .map(|x| x.as_str())
        .filter(|x| *x != SUBSET_KEY)
        .collect()
}

fn is_adj(labels: &LabelSet) -> bool {
    labels.get(GROUP_KEY).map(|x| x.as_str()) == Some(ADJ_GROUP)
}

fn is_excluded_pop(labels: &LabelSet, excluded_pops: &[String]) -> bool {
    labels.get(POP_KEY).is_some_and(|x| excluded_pops.contains(x))
}

/// Positions in the frequency array which get a filtering allele frequency entry
///
/// These are the adj overall, population, sex, and population by sex strata, skipping any
/// stratum of an excluded population.
///
pub fn get_faf_indexes(strata: &[LabelSet], excluded_pops: &[String]) -> Vec<usize> {
    let faf_key_sets: [&[&str]; 4] = [
        &[GROUP_KEY],
        &[GROUP_KEY, POP_KEY],
        &[GROUP_KEY, SEX_KEY],
        &[GROUP_KEY, POP_KEY, SEX_KEY],
    ];
    strata
        .iter()
        .enumerate()
        .filter(|(_, labels)| {
            let keys = stratum_keys(labels);
            is_adj(labels)
                && !is_excluded_pop(labels, excluded_pops)
                && faf_key_sets.iter().any(|x| *x == keys.as_slice())
        })
        .map(|(i, _)| i)
        .collect()
}

pub fn compute_faf(freq: &[CallStats], faf_indexes: &[usize]) -> Vec<FafEntry> {
    faf_indexes
        .iter()
        .map(|&i| FafEntry {
            faf95: filtering_allele_frequency(freq[i].ac, freq[i].an, 0.95),
            faf99: filtering_allele_frequency(freq[i].ac, freq[i].an, 0.99),
        })
        .collect()
}

/// Find the popmax entry of one variant
///
/// Candidates are adj single-population strata outside the excluded populations with at least one
/// called and one alt allele. Ties go to the first stratum position. The FAF of the selected
/// population is looked up by its label-set in `faf_meta`.
///
pub fn compute_popmax(
    freq: &[CallStats],
    strata: &[LabelSet],
    excluded_pops: &[String],
    faf: &[FafEntry],
    faf_meta: &[LabelSet],
) -> Option<Popmax> {
    let mut best: Option<(usize, f64)> = None;
    for (i, labels) in strata.iter().enumerate() {
        if !(is_adj(labels) && stratum_keys(labels) == [GROUP_KEY, POP_KEY])
            || is_excluded_pop(labels, excluded_pops)
        {
            continue;
        }
        let x = &freq[i];
        if x.ac == 0 || x.an == 0 {
            continue;
        }
        let Some(af) = x.af else {
            continue;
        };
        if best.is_none_or(|(_, best_af)| af > best_af) {
            best = Some((i, af));
        }
    }

    let (i, af) = best?;
    let labels = &strata[i];
    let faf95 = faf_meta
        .iter()
        .position(|x| x == labels)
        .map(|faf_index| faf[faf_index].faf95);
    Some(Popmax {
        pop: labels[POP_KEY].clone(),
        ac: freq[i].ac,
        an: freq[i].an,
        af,
        homozygote_count: freq[i].homozygote_count,
        faf95,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freq::strata::{StrataConfig, build_strata, make_index_dict};
    use std::collections::BTreeMap;

    fn stats(ac: u32, an: u32) -> CallStats {
        CallStats {
            ac,
            af: (an > 0).then(|| ac as f64 / an as f64),
            an,
            homozygote_count: 0,
        }
    }

    fn strata() -> Vec<LabelSet> {
        let config = StrataConfig {
            pop_counts: ["afr", "asj", "eas", "nfe"]
                .iter()
                .map(|x| (x.to_string(), 1000))
                .collect::<BTreeMap<_, _>>(),
            include_sex: true,
            downsamplings: vec![100],
            subset: None,
        };
        build_strata(&config)
    }

    #[test]
    fn test_faf_indexes() {
        let strata = strata();
        let excluded = vec!["asj".to_string()];
        let faf_indexes = get_faf_indexes(&strata, &excluded);
        let faf_meta = faf_indexes.iter().map(|&i| strata[i].clone()).collect::<Vec<_>>();
        let keys = make_index_dict(&faf_meta);

        // overall, 3 pops, 2 sexes, 3 pops by 2 sexes
        assert_eq!(faf_indexes.len(), 12);
        assert!(keys.contains_key("adj"));
        assert!(keys.contains_key("eas-XY-adj"));
        assert!(!keys.contains_key("asj-adj"));
        assert!(!keys.contains_key("100-adj"));
        assert!(faf_meta.iter().all(is_adj));
    }

    #[test]
    fn test_popmax_matches_max_adj_af() {
        let strata = strata();
        let index = make_index_dict(&strata);
        let excluded = vec!["asj".to_string()];

        let mut freq = vec![stats(0, 0); strata.len()];
        freq[index["afr-adj"]] = stats(10, 1000);
        freq[index["asj-adj"]] = stats(900, 1000);
        freq[index["eas-adj"]] = stats(30, 1000);
        freq[index["nfe-adj"]] = stats(20, 1000);
        // Raw entries never compete
        freq[index["nfe-raw"]] = stats(500, 1000);

        let faf_indexes = get_faf_indexes(&strata, &excluded);
        let faf_meta = faf_indexes.iter().map(|&i| strata[i].clone()).collect::<Vec<_>>();
        let faf = compute_faf(&freq, &faf_indexes);
        let popmax = compute_popmax(&freq, &strata, &excluded, &faf, &faf_meta).unwrap();

        assert_eq!(popmax.pop, "eas");
        assert_eq!(popmax.af, freq[index["eas-adj"]].af.unwrap());
        let max_af = ["afr", "eas", "nfe"]
            .iter()
            .filter_map(|p| freq[index[&format!("{p}-adj")]].af)
            .fold(0.0, f64::max);
        assert_eq!(popmax.af, max_af);

        let faf_index = make_index_dict(&faf_meta)["eas-adj"];
        assert_eq!(popmax.faf95, Some(faf[faf_index].faf95));
        assert!(popmax.faf95.unwrap() > 0.0);
    }

    #[test]
    fn test_popmax_tie_and_missing() {
        let strata = strata();
        let index = make_index_dict(&strata);
        let mut freq = vec![stats(0, 0); strata.len()];
        assert_eq!(compute_popmax(&freq, &strata, &[], &[], &[]), None);

        freq[index["afr-adj"]] = stats(5, 100);
        freq[index["nfe-adj"]] = stats(5, 100);
        let popmax = compute_popmax(&freq, &strata, &[], &[], &[]).unwrap();
        assert_eq!(popmax.pop, "afr");
        assert_eq!(popmax.faf95, None);
    }
}
