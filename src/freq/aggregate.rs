//! Per-variant aggregation of genotypes into stratified call statistics and quality histograms
//!

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

use super::downsampling::DownsamplingIndex;
use super::strata::{ADJ_GROUP, DOWNSAMPLING_KEY, GROUP_KEY, LabelSet, POP_KEY, RAW_GROUP, SEX_KEY};
use crate::genotype_matrix::{AdjCutoffs, Call, GenotypeEntry, VariantRow, adjust_sex_ploidy};
use crate::sample_qc::sex_inference::SexKaryotype;
use crate::stats_utils::Histogram;

/// Allele count statistics of one stratum
///
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CallStats {
    pub ac: u32,

    /// None when no alleles were called
    pub af: Option<f64>,

    pub an: u32,

    /// Diploid homozygous alt genotypes
    pub homozygote_count: u32,
}

impl CallStats {
    fn add(&mut self, call: &Call) {
        self.ac += call.n_alt_alleles();
        self.an += call.ploidy();
        if call.is_diploid_hom_var() {
            self.homozygote_count += 1;
        }
    }

    fn finish(&mut self) {
        self.af = if self.an > 0 {
            Some(self.ac as f64 / self.an as f64)
        } else {
            None
        };
    }
}

/// Sample attributes used to assign genotypes to strata
///
#[derive(Clone, Debug)]
pub struct FreqSample {
    pub pop: Option<String>,
    pub sex_karyotype: Option<SexKaryotype>,
    pub downsampling: Option<DownsamplingIndex>,
}

fn sex_label(karyotype: Option<SexKaryotype>) -> Option<&'static str> {
    match karyotype {
        Some(SexKaryotype::XX) => Some("XX"),
        Some(SexKaryotype::XY) => Some("XY"),
        _ => None,
    }
}

/// Samples contributing to one stratum
///
#[derive(Clone, Debug)]
pub struct StratumMembers {
    /// Only adj genotypes are counted
    pub adj: bool,

    /// Sample indexes, ascending
    pub samples: Vec<usize>,
}

fn is_member(labels: &LabelSet, sample: &FreqSample) -> SimpleResult<bool> {
    if let Some(pop) = labels.get(POP_KEY) {
        if sample.pop.as_deref() != Some(pop.as_str()) {
            return Ok(false);
        }
    }
    if let Some(sex) = labels.get(SEX_KEY) {
        if sex_label(sample.sex_karyotype) != Some(sex.as_str()) {
            return Ok(false);
        }
    }
    if let Some(n) = labels.get(DOWNSAMPLING_KEY) {
        let Ok(n) = n.parse::<usize>() else {
            bail!("Invalid downsampling label '{n}'");
        };
        let Some(ds) = &sample.downsampling else {
            bail!("Downsampling stratum requested without sample downsampling indexes");
        };
        let idx = if labels.contains_key(POP_KEY) {
            ds.pop_idx
        } else {
            Some(ds.global_idx)
        };
        if idx.is_none_or(|x| x >= n) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolve the sample membership of every stratum
///
pub fn get_stratum_members(
    strata: &[LabelSet],
    samples: &[FreqSample],
) -> SimpleResult<Vec<StratumMembers>> {
    let mut result = Vec::with_capacity(strata.len());
    for labels in strata {
        let adj = match labels.get(GROUP_KEY).map(|x| x.as_str()) {
            Some(ADJ_GROUP) => true,
            Some(RAW_GROUP) => false,
            _ => bail!("Frequency stratum {labels:?} has no valid group label"),
        };
        let mut members = Vec::new();
        for (i, sample) in samples.iter().enumerate() {
            if is_member(labels, sample)? {
                members.push(i);
            }
        }
        result.push(StratumMembers {
            adj,
            samples: members,
        });
    }
    Ok(result)
}

/// Genotype after sex-ploidy adjustment, with its adj status
///
#[derive(Clone, Debug)]
pub struct AdjustedGenotype {
    pub gt: Option<Call>,
    pub adj: bool,
}

/// Apply sex-ploidy adjustment to every genotype of a row, then evaluate the adj flag
///
pub fn adjust_row_genotypes(
    row: &VariantRow,
    samples: &[FreqSample],
    adj_cutoffs: &AdjCutoffs,
) -> Vec<AdjustedGenotype> {
    row.entries
        .iter()
        .zip(samples)
        .map(|(entry, sample)| {
            let gt = adjust_sex_ploidy(entry.gt, &row.key.locus, sample.sex_karyotype);
            let adjusted = GenotypeEntry { gt, ..entry.clone() };
            AdjustedGenotype {
                gt,
                adj: adjusted.is_adj(adj_cutoffs),
            }
        })
        .collect()
}

/// Aggregate call statistics for each stratum of one variant
///
pub fn aggregate_call_stats(
    genotypes: &[AdjustedGenotype],
    members: &[StratumMembers],
) -> Vec<CallStats> {
    members
        .iter()
        .map(|stratum| {
            let mut stats = CallStats::default();
            for &i in stratum.samples.iter() {
                let g = &genotypes[i];
                if stratum.adj && !g.adj {
                    continue;
                }
                if let Some(call) = &g.gt {
                    stats.add(call);
                }
            }
            stats.finish();
            stats
        })
        .collect()
}

/// Site inbreeding coefficient over diploid calls, `1 - obs_het / (2pq * n)`
///
/// Returns None when there are no diploid calls or the site is monomorphic among them.
///
pub fn site_inbreeding_coefficient(genotypes: &[AdjustedGenotype]) -> Option<f64> {
    let mut n = 0u64;
    let mut n_het = 0u64;
    let mut n_alt_alleles = 0u64;
    for call in genotypes.iter().filter_map(|x| x.gt) {
        if let Call::Diploid(_, _) = call {
            n += 1;
            n_alt_alleles += call.n_alt_alleles() as u64;
            if call.is_het() {
                n_het += 1;
            }
        }
    }
    if n == 0 {
        return None;
    }
    let p = n_alt_alleles as f64 / (2 * n) as f64;
    let q = 1.0 - p;
    let expected_het = 2.0 * p * q * n as f64;
    if expected_het <= 0.0 {
        return None;
    }
    Some(1.0 - n_het as f64 / expected_het)
}

const QUAL_HIST_BINS: usize = 20;

fn new_qual_hist(name: &str) -> Histogram {
    if name.starts_with("ab_") {
        Histogram::new(0.0, 1.0, QUAL_HIST_BINS)
    } else {
        Histogram::new(0.0, 100.0, QUAL_HIST_BINS)
    }
}

pub const QUAL_HIST_NAMES: [&str; 5] = [
    "gq_hist_all",
    "dp_hist_all",
    "gq_hist_alt",
    "dp_hist_alt",
    "ab_hist_alt",
];

/// Genotype quality histograms of one variant
///
/// Histograms over all called genotypes are stored under their base name, and the same
/// histograms restricted to adj genotypes under the base name with an `_adj` suffix.
///
pub fn qual_hists(
    entries: &[GenotypeEntry],
    genotypes: &[AdjustedGenotype],
) -> BTreeMap<String, Histogram> {
    let mut hists = QUAL_HIST_NAMES
        .iter()
        .flat_map(|x| [x.to_string(), format!("{x}_adj")])
        .map(|x| {
            let h = new_qual_hist(&x);
            (x, h)
        })
        .collect::<BTreeMap<_, _>>();

    for (entry, g) in entries.iter().zip(genotypes) {
        let Some(call) = g.gt else {
            continue;
        };
        let suffixes: &[&str] = if g.adj { &["", "_adj"] } else { &[""] };
        for suffix in suffixes {
            let mut add = |name: &str, value: Option<f64>| {
                if let (Some(h), Some(v)) = (hists.get_mut(&format!("{name}{suffix}")), value) {
                    h.add(v);
                }
            };
            let gq = entry.gq.map(|x| x as f64);
            let dp = entry.dp.map(|x| x as f64);
            add("gq_hist_all", gq);
            add("dp_hist_all", dp);
            if call.is_non_ref() {
                add("gq_hist_alt", gq);
                add("dp_hist_alt", dp);
            }
            if call.is_het() {
                let ab = entry.ad.and_then(|ad| {
                    let total = ad[0] + ad[1];
                    (total > 0).then(|| ad[1] as f64 / total as f64)
                });
                add("ab_hist_alt", ab);
            }
        }
    }
    hists
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freq::strata::{StrataConfig, build_strata, find_stratum};
    use crate::genotype_matrix::tests::entry;
    use crate::locus::{Locus, VariantKey};
    use approx::assert_abs_diff_eq;

    fn sample(pop: &str, sex: SexKaryotype) -> FreqSample {
        FreqSample {
            pop: Some(pop.to_string()),
            sex_karyotype: Some(sex),
            downsampling: None,
        }
    }

    fn row(contig: &str, entries: Vec<GenotypeEntry>) -> VariantRow {
        VariantRow {
            key: VariantKey::new(
                Locus::new(contig, 5_000_000),
                vec!["A".to_string(), "G".to_string()],
            ),
            a_index: 1,
            was_split: false,
            entries,
        }
    }

    #[test]
    fn test_stratified_call_stats() {
        let samples = vec![
            sample("afr", SexKaryotype::XX),
            sample("afr", SexKaryotype::XY),
            sample("nfe", SexKaryotype::XX),
            sample("nfe", SexKaryotype::XY),
        ];
        let row = row(
            "chr1",
            vec![
                entry(Some(Call::Diploid(0, 1)), 30, 20, [10, 10]),
                entry(Some(Call::Diploid(1, 1)), 30, 20, [0, 20]),
                // Low GQ, raw only
                entry(Some(Call::Diploid(0, 1)), 5, 20, [10, 10]),
                entry(None, 0, 0, [0, 0]),
            ],
        );
        let config = StrataConfig {
            pop_counts: BTreeMap::from([("afr".to_string(), 2), ("nfe".to_string(), 2)]),
            include_sex: true,
            ..Default::default()
        };
        let strata = build_strata(&config);
        let members = get_stratum_members(&strata, &samples).unwrap();
        let genotypes = adjust_row_genotypes(&row, &samples, &AdjCutoffs::default());
        let freq = aggregate_call_stats(&genotypes, &members);
        assert_eq!(freq.len(), strata.len());

        let get = |labels: &[(&str, &str)]| &freq[find_stratum(&strata, labels).unwrap()];

        let adj = get(&[("group", "adj")]);
        assert_eq!((adj.ac, adj.an, adj.homozygote_count), (3, 4, 1));
        assert_abs_diff_eq!(adj.af.unwrap(), 0.75);

        let raw = get(&[("group", "raw")]);
        assert_eq!((raw.ac, raw.an), (4, 6));

        // Manual re-aggregation of one stratum: adj nfe genotypes only
        let nfe = get(&[("group", "adj"), ("pop", "nfe")]);
        assert_eq!((nfe.ac, nfe.an), (0, 0));
        assert_eq!(nfe.af, None);

        let afr_xy = get(&[("group", "raw"), ("pop", "afr"), ("sex", "XY")]);
        assert_eq!((afr_xy.ac, afr_xy.an, afr_xy.homozygote_count), (2, 2, 1));
    }

    #[test]
    fn test_af_zero_when_no_alt() {
        let samples = vec![sample("afr", SexKaryotype::XX)];
        let row = row("chr1", vec![entry(Some(Call::Diploid(0, 0)), 30, 20, [20, 0])]);
        let strata = build_strata(&StrataConfig::default());
        let members = get_stratum_members(&strata, &samples).unwrap();
        let genotypes = adjust_row_genotypes(&row, &samples, &AdjCutoffs::default());
        let freq = aggregate_call_stats(&genotypes, &members);
        assert_eq!(freq[0].an, 2);
        assert_eq!(freq[0].af, Some(0.0));
    }

    #[test]
    fn test_sex_ploidy_adjusted_an() {
        let samples = vec![
            sample("afr", SexKaryotype::XX),
            sample("afr", SexKaryotype::XY),
        ];
        let row = row(
            "chrX",
            vec![
                entry(Some(Call::Diploid(0, 1)), 30, 20, [10, 10]),
                entry(Some(Call::Diploid(1, 1)), 30, 20, [0, 20]),
            ],
        );
        let strata = build_strata(&StrataConfig::default());
        let members = get_stratum_members(&strata, &samples).unwrap();
        let genotypes = adjust_row_genotypes(&row, &samples, &AdjCutoffs::default());
        let freq = aggregate_call_stats(&genotypes, &members);
        assert_eq!((freq[0].ac, freq[0].an, freq[0].homozygote_count), (2, 3, 0));
    }

    #[test]
    fn test_inbreeding_coefficient() {
        let g = |call: Call| AdjustedGenotype {
            gt: Some(call),
            adj: true,
        };
        // No heterozygotes at p = 0.5
        let genotypes = vec![g(Call::Diploid(0, 0)), g(Call::Diploid(1, 1))];
        assert_abs_diff_eq!(site_inbreeding_coefficient(&genotypes).unwrap(), 1.0);

        let genotypes = vec![g(Call::Diploid(0, 1)), g(Call::Diploid(0, 1))];
        assert_abs_diff_eq!(site_inbreeding_coefficient(&genotypes).unwrap(), -1.0);

        let genotypes = vec![g(Call::Diploid(0, 0))];
        assert_eq!(site_inbreeding_coefficient(&genotypes), None);
    }

    #[test]
    fn test_qual_hists() {
        let entries = vec![
            entry(Some(Call::Diploid(0, 1)), 30, 20, [10, 10]),
            entry(Some(Call::Diploid(0, 1)), 5, 20, [15, 5]),
            entry(Some(Call::Diploid(0, 0)), 99, 100, [100, 0]),
        ];
        let genotypes = entries
            .iter()
            .map(|x| AdjustedGenotype {
                gt: x.gt,
                adj: x.is_adj(&AdjCutoffs::default()),
            })
            .collect::<Vec<_>>();
        let hists = qual_hists(&entries, &genotypes);
        assert_eq!(hists.len(), 10);
        assert_eq!(hists["gq_hist_all"].total(), 3);
        assert_eq!(hists["gq_hist_all_adj"].total(), 2);
        assert_eq!(hists["gq_hist_alt"].total(), 2);
        assert_eq!(hists["ab_hist_alt_adj"].total(), 1);
        assert_eq!(hists["ab_hist_alt"].bin_freq[10], 1);
        assert_eq!(hists["ab_hist_alt"].bin_freq[5], 1);
        assert_eq!(hists["dp_hist_all"].bin_freq[19], 1);
    }
}
