//! Stratified variant frequency generation
//!

mod aggregate;
mod downsampling;
mod popmax;
pub mod strata;

use std::collections::{BTreeMap, HashSet};

use camino::Utf8Path;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use thousands::Separable;

pub use self::aggregate::{CallStats, QUAL_HIST_NAMES};
use self::aggregate::{
    FreqSample, adjust_row_genotypes, aggregate_call_stats, get_stratum_members, qual_hists,
    site_inbreeding_coefficient,
};
use self::downsampling::compute_downsampling_indexes;
pub use self::popmax::{FafEntry, Popmax};
use self::popmax::{compute_faf, compute_popmax, get_faf_indexes};
pub use self::strata::validate_subsets;
use self::strata::{
    LabelSet, StrataConfig, build_strata, make_index_dict, subset_label, uses_subpop_labels,
};
use crate::cli::{GenerateFreqSettings, SharedSettings};
use crate::genotype_matrix::{AdjCutoffs, GenotypeMatrix, read_genotype_matrix};
use crate::locus::VariantKey;
use crate::resources::Resource;
use crate::run_stats::{FreqStats, write_run_stats};
use crate::sample_meta::warn_sample_mismatch;
use crate::sample_qc::SampleMetadata;
use crate::sample_qc::metadata::MetadataGlobals;
use crate::stats_utils::Histogram;
use crate::table::{KeyedRow, Table};

/// Stratified frequency annotations of one variant
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FreqRow {
    pub key: VariantKey,

    /// One entry per stratum, in `freq_meta` order
    pub freq: Vec<CallStats>,

    /// One entry per FAF stratum, in `faf_meta` order. Empty for subset runs.
    pub faf: Vec<FafEntry>,

    pub popmax: Option<Popmax>,
    pub inbreeding_coeff: Option<f64>,

    /// Histograms over all genotypes, and over adj genotypes with an `_adj` name suffix
    pub qual_hists: BTreeMap<String, Histogram>,
}

impl KeyedRow for FreqRow {
    type Key = VariantKey;
    fn key(&self) -> VariantKey {
        self.key.clone()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FreqGlobals {
    pub freq_meta: Vec<LabelSet>,
    pub freq_index_dict: BTreeMap<String, usize>,
    pub faf_meta: Vec<LabelSet>,
    pub faf_index_dict: BTreeMap<String, usize>,
    pub downsamplings: Vec<u32>,
    pub popmax_excluded_pops: Vec<String>,
    pub subsets: Vec<String>,
    pub adj_cutoffs: AdjCutoffs,
    pub seed: u64,
}

pub type FreqTable = Table<FreqRow, FreqGlobals>;

/// Frequency table resource for a sorted subset list, the full callset if empty
pub fn freq_resource(subsets: &[String]) -> Resource {
    Resource::Freq {
        subset: if subsets.is_empty() {
            None
        } else {
            Some(subsets.join("_"))
        },
    }
}

#[derive(Clone, Debug, Default)]
pub struct FreqParams {
    /// Sorted subset names, empty for the full callset
    pub subsets: Vec<String>,

    /// Ascending downsampling sizes, ignored for subset runs
    pub downsamplings: Vec<u32>,

    pub popmax_excluded_pops: Vec<String>,
    pub seed: u64,
    pub adj_cutoffs: AdjCutoffs,
}

/// Compute the frequency table rows of a genotype matrix
///
/// `samples` are the per-sample stratification labels in matrix sample order. Full callset runs
/// also compute FAF, popmax, the inbreeding coefficient and quality histograms, and drop variants
/// without any raw alt allele. Subset runs emit frequencies only, for every input variant.
///
pub fn compute_freq(
    matrix: &GenotypeMatrix,
    samples: &[FreqSample],
    params: &FreqParams,
) -> SimpleResult<(Vec<FreqRow>, FreqGlobals)> {
    if samples.len() != matrix.sample_count() {
        bail!(
            "Frequency sample labels ({}) do not match the genotype matrix sample count ({})",
            samples.len(),
            matrix.sample_count()
        );
    }
    let is_subset_run = !params.subsets.is_empty();

    let mut pop_counts = BTreeMap::new();
    for pop in samples.iter().filter_map(|x| x.pop.as_ref()) {
        *pop_counts.entry(pop.clone()).or_insert(0) += 1;
    }
    let include_sex = samples.iter().any(|x| x.sex_karyotype.is_some());
    let downsamplings = if is_subset_run {
        Vec::new()
    } else {
        params.downsamplings.clone()
    };

    let mut samples = samples.to_vec();
    if !downsamplings.is_empty() {
        let pops = samples.iter().map(|x| x.pop.as_deref()).collect::<Vec<_>>();
        let indexes = compute_downsampling_indexes(&pops, params.seed);
        for (sample, index) in samples.iter_mut().zip(indexes) {
            sample.downsampling = Some(index);
        }
    }

    let strata = build_strata(&StrataConfig {
        pop_counts,
        include_sex,
        downsamplings: downsamplings.clone(),
        subset: subset_label(&params.subsets),
    });
    let members = get_stratum_members(&strata, &samples)?;

    let faf_indexes = if is_subset_run {
        Vec::new()
    } else {
        get_faf_indexes(&strata, &params.popmax_excluded_pops)
    };
    let faf_meta = faf_indexes
        .iter()
        .map(|&i| strata[i].clone())
        .collect::<Vec<_>>();

    let rows = matrix
        .rows
        .par_iter()
        .map(|row| {
            let genotypes = adjust_row_genotypes(row, &samples, &params.adj_cutoffs);
            let freq = aggregate_call_stats(&genotypes, &members);
            if is_subset_run {
                return FreqRow {
                    key: row.key.clone(),
                    freq,
                    faf: Vec::new(),
                    popmax: None,
                    inbreeding_coeff: None,
                    qual_hists: BTreeMap::new(),
                };
            }
            let faf = compute_faf(&freq, &faf_indexes);
            let popmax = compute_popmax(
                &freq,
                &strata,
                &params.popmax_excluded_pops,
                &faf,
                &faf_meta,
            );
            FreqRow {
                key: row.key.clone(),
                inbreeding_coeff: site_inbreeding_coefficient(&genotypes),
                qual_hists: qual_hists(&row.entries, &genotypes),
                freq,
                faf,
                popmax,
            }
        })
        .filter(|x| is_subset_run || x.freq[1].ac > 0)
        .collect::<Vec<_>>();

    let globals = FreqGlobals {
        freq_index_dict: make_index_dict(&strata),
        freq_meta: strata,
        faf_index_dict: make_index_dict(&faf_meta),
        faf_meta,
        downsamplings,
        popmax_excluded_pops: params.popmax_excluded_pops.clone(),
        subsets: params.subsets.clone(),
        adj_cutoffs: params.adj_cutoffs.clone(),
        seed: params.seed,
    };
    Ok((rows, globals))
}

/// Select the samples to aggregate and their stratification labels
///
/// The full callset uses release samples labeled with their inferred population. Subset runs use
/// the release samples in any requested subset, labeled with their subpopulation for cohorts which
/// store ancestry that way.
///
fn get_freq_samples(
    metadata: &Table<SampleMetadata, MetadataGlobals>,
    matrix_samples: &[String],
    subsets: &[String],
) -> (HashSet<String>, BTreeMap<String, FreqSample>) {
    let missing = matrix_samples
        .iter()
        .filter(|s| !metadata.contains_key(*s))
        .map(|x| x.as_str())
        .collect::<Vec<_>>();
    warn_sample_mismatch(
        "in the genotype matrix have no finalized metadata and are excluded from frequency calculation",
        &missing,
    );

    let use_subpop = uses_subpop_labels(subsets);
    let mut selected = HashSet::new();
    let mut labels = BTreeMap::new();
    for meta in matrix_samples.iter().filter_map(|s| metadata.get(s)) {
        if !meta.release {
            continue;
        }
        if !subsets.is_empty() && !subsets.iter().any(|x| meta.project_meta.subsets.contains(x)) {
            continue;
        }
        let pop = if use_subpop {
            meta.project_meta.known_subpop.clone()
        } else {
            meta.population_inference.as_ref().map(|x| x.pop.clone())
        };
        selected.insert(meta.s.clone());
        labels.insert(
            meta.s.clone(),
            FreqSample {
                pop,
                sex_karyotype: meta.sex_imputation.as_ref().map(|x| x.sex_karyotype),
                downsampling: None,
            },
        );
    }
    (selected, labels)
}

/// Run the frequency generation stage
///
pub fn run_generate_freq(
    shared: &SharedSettings,
    settings: &GenerateFreqSettings,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    validate_subsets(&settings.subsets)?;

    let metadata: Table<SampleMetadata, MetadataGlobals> =
        layout.read(&Resource::FinalizedMetadata)?;
    let matrix = read_genotype_matrix(Utf8Path::new(&settings.vcf_filename), layout.record_limit())?;

    let (selected, labels) = get_freq_samples(&metadata, &matrix.samples, &settings.subsets);
    if selected.is_empty() {
        bail!("No release samples were selected for frequency calculation");
    }
    let selected = selected.iter().map(|x| x.as_str()).collect::<HashSet<_>>();
    let matrix = matrix.select_samples(&selected);
    let samples = matrix
        .samples
        .iter()
        .map(|s| labels[s].clone())
        .collect::<Vec<_>>();

    if settings.subsets.is_empty() {
        info!(
            "Computing frequencies over {} release samples",
            samples.len().separate_with_commas()
        );
    } else {
        info!(
            "Computing frequencies over {} release samples in subset(s) {}",
            samples.len().separate_with_commas(),
            settings.subsets.join(", ")
        );
    }

    let params = FreqParams {
        subsets: settings.subsets.clone(),
        downsamplings: settings.downsamplings.clone(),
        popmax_excluded_pops: settings.pops_to_remove_for_popmax.clone(),
        seed: settings.seed,
        adj_cutoffs: settings.adj.cutoffs(),
    };
    let (rows, globals) = compute_freq(&matrix, &samples, &params)?;

    let stats = FreqStats {
        sample_count: samples.len(),
        input_variant_count: matrix.rows.len(),
        output_variant_count: rows.len(),
        strata_count: globals.freq_meta.len(),
        faf_strata_count: globals.faf_meta.len(),
    };
    info!(
        "Computed {} frequency strata for {} of {} variants",
        stats.strata_count.separate_with_commas(),
        stats.output_variant_count.separate_with_commas(),
        stats.input_variant_count.separate_with_commas()
    );

    let table = Table::new(globals, rows)?;
    layout.write(&freq_resource(&settings.subsets), &table, shared.overwrite)?;
    write_run_stats(shared, "generate_freq", &stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype_matrix::tests::entry;
    use crate::genotype_matrix::{Call, VariantRow};
    use crate::locus::Locus;
    use crate::sample_qc::sex_inference::SexKaryotype;

    fn sample(pop: &str, sex: SexKaryotype) -> FreqSample {
        FreqSample {
            pop: Some(pop.to_string()),
            sex_karyotype: Some(sex),
            downsampling: None,
        }
    }

    fn matrix() -> GenotypeMatrix {
        let het = || entry(Some(Call::Diploid(0, 1)), 30, 20, [10, 10]);
        let hom_ref = || entry(Some(Call::Diploid(0, 0)), 30, 20, [20, 0]);
        let row = |position: i64, entries| VariantRow {
            key: VariantKey::new(
                Locus::new("chr1", position),
                vec!["A".to_string(), "C".to_string()],
            ),
            a_index: 1,
            was_split: false,
            entries,
        };
        GenotypeMatrix {
            samples: ["S1", "S2", "S3", "S4"].map(String::from).to_vec(),
            rows: vec![
                row(100, vec![het(), hom_ref(), het(), hom_ref()]),
                row(200, vec![hom_ref(), hom_ref(), hom_ref(), hom_ref()]),
                row(300, vec![hom_ref(), het(), hom_ref(), hom_ref()]),
            ],
        }
    }

    fn samples() -> Vec<FreqSample> {
        vec![
            sample("afr", SexKaryotype::XX),
            sample("afr", SexKaryotype::XY),
            sample("nfe", SexKaryotype::XX),
            sample("nfe", SexKaryotype::XY),
        ]
    }

    #[test]
    fn test_compute_freq_full_run() {
        let params = FreqParams {
            downsamplings: vec![2],
            popmax_excluded_pops: vec!["asj".to_string()],
            seed: 42,
            ..Default::default()
        };
        let (rows, globals) = compute_freq(&matrix(), &samples(), &params).unwrap();

        // Monomorphic variant dropped
        assert_eq!(rows.len(), 2);
        for row in rows.iter() {
            assert_eq!(row.freq.len(), globals.freq_meta.len());
            assert_eq!(row.faf.len(), globals.faf_meta.len());
        }
        assert_eq!(globals.freq_index_dict["adj"], 0);
        assert_eq!(globals.freq_index_dict["raw"], 1);
        assert!(globals.freq_index_dict.contains_key("2-afr-adj"));

        let row = &rows[0];
        let afr = &row.freq[globals.freq_index_dict["afr-adj"]];
        assert_eq!((afr.ac, afr.an), (1, 4));
        let popmax = row.popmax.as_ref().unwrap();
        assert_eq!(popmax.pop, "afr");
        assert_eq!(popmax.af, 0.25);

        let ds = &row.freq[globals.freq_index_dict["2-adj"]];
        assert_eq!(ds.an, 4);
        assert!(row.qual_hists.contains_key("gq_hist_all_adj"));
    }

    #[test]
    fn test_compute_freq_is_deterministic() {
        let params = FreqParams {
            downsamplings: vec![1, 2],
            seed: 3,
            ..Default::default()
        };
        let a = compute_freq(&matrix(), &samples(), &params).unwrap();
        let b = compute_freq(&matrix(), &samples(), &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_compute_freq_subset_run() {
        let params = FreqParams {
            subsets: vec!["hgdp".to_string()],
            downsamplings: vec![2],
            ..Default::default()
        };
        let (rows, globals) = compute_freq(&matrix(), &samples(), &params).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(globals.downsamplings.is_empty());
        assert!(globals.faf_meta.is_empty());
        assert!(globals.freq_meta.iter().all(|x| x["subset"] == "hgdp"));
        assert_eq!(globals.freq_index_dict["hgdp-afr-adj"], 2);
        assert!(rows.iter().all(|x| x.popmax.is_none()));
    }

    #[test]
    fn test_freq_resource() {
        assert_eq!(freq_resource(&[]), Resource::Freq { subset: None });
        assert_eq!(
            freq_resource(&["hgdp".to_string(), "tgp".to_string()]),
            Resource::Freq {
                subset: Some("hgdp_tgp".to_string())
            }
        );
    }
}
