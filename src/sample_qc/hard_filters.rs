//! Sample hard filters
//!
//! Every filter predicate reads raw metrics only, so all reasons are evaluated independently and a
//! sample accumulates the full set of reasons it fails. A missing metric never triggers its filter.
//!

use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use super::interval_qc::read_coverage_input;
use super::metrics::{SampleQcMetrics, compute_sample_qc_metrics};
use super::sex_inference::{SexGlobals, SexImputation, SexKaryotype};
use crate::cli::{HardFiltersSettings, SharedSettings};
use crate::genome_regions::GenomeRegions;
use crate::genotype_matrix::read_genotype_matrix;
use crate::log_utils::log_category_counts;
use crate::resources::Resource;
use crate::run_stats::{HardFilterStats, SampleQcStats, write_run_stats};
use crate::sample_meta::{
    BamMetrics, SampleCoverage, read_bam_metrics, warn_sample_mismatch,
};
use crate::table::{KeyedRow, NoGlobals, Table};
use crate::tsv_utils::read_id_list;

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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HardFilter {
    FailedFingerprinting,
    SampleQcMetrics,
    Contamination,
    Chimera,
    LowCoverage,
    LowAdjCallrate,
    AmbiguousSex,
    SexAneuploidy,
}

/// Component failures of the `sample_qc_metrics` hard filter
///
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SampleQcMetricFilter {
    HighNSingleton,
    HighRHetHomVar,
    #[serde(rename = "low_bases_dp_over_1")]
    #[strum(serialize = "low_bases_dp_over_1")]
    LowBasesDpOver1,
    #[serde(rename = "low_bases_dp_over_20")]
    #[strum(serialize = "low_bases_dp_over_20")]
    LowBasesDpOver20,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HardFilterCutoffs {
    pub max_n_singleton: f64,
    pub max_r_het_hom_var: f64,
    pub min_bases_dp_over_1: f64,
    pub min_bases_dp_over_20: f64,

    /// Maximum contamination rate, as a proportion
    pub max_contamination: f64,

    /// Maximum chimeric read rate, as a proportion
    pub max_chimera: f64,

    /// Minimum chr20 mean depth
    pub min_cov: Option<f64>,

    pub min_adj_callrate: Option<f64>,
}

impl Default for HardFilterCutoffs {
    fn default() -> Self {
        Self {
            max_n_singleton: 5000.0,
            max_r_het_hom_var: 10.0,
            min_bases_dp_over_1: 5e7,
            min_bases_dp_over_20: 4e7,
            max_contamination: 0.05,
            max_chimera: 0.05,
            min_cov: None,
            min_adj_callrate: None,
        }
    }
}

/// All raw inputs used to hard filter one sample
///
#[derive(Default)]
pub struct HardFilterInput<'a> {
    pub sample_qc: Option<&'a SampleQcMetrics>,
    pub bam_metrics: Option<&'a BamMetrics>,
    pub coverage: Option<&'a SampleCoverage>,
    pub failed_fingerprinting: bool,

    /// Only provided for the sex-dependent filter pass
    pub sex_karyotype: Option<SexKaryotype>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SampleHardFilters {
    pub s: String,
    pub hard_filters: BTreeSet<HardFilter>,
    pub sample_qc_metric_hard_filters: BTreeSet<SampleQcMetricFilter>,
    pub hard_filtered: bool,
}

impl KeyedRow for SampleHardFilters {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HardFilterGlobals {
    pub cutoffs: HardFilterCutoffs,
    pub include_sex_filter: bool,
}

fn above(x: Option<f64>, cutoff: f64) -> bool {
    x.is_some_and(|v| v > cutoff)
}

fn below(x: Option<f64>, cutoff: f64) -> bool {
    x.is_some_and(|v| v < cutoff)
}

/// Evaluate every hard filter for one sample
///
pub fn get_sample_hard_filters(
    s: &str,
    input: &HardFilterInput,
    cutoffs: &HardFilterCutoffs,
    include_sex_filter: bool,
) -> SampleHardFilters {
    let mut metric_filters = BTreeSet::new();
    if let Some(qc) = input.sample_qc {
        if above(Some(qc.n_singleton as f64), cutoffs.max_n_singleton) {
            metric_filters.insert(SampleQcMetricFilter::HighNSingleton);
        }
        if above(qc.r_het_hom_var, cutoffs.max_r_het_hom_var) {
            metric_filters.insert(SampleQcMetricFilter::HighRHetHomVar);
        }
    }

    let mut filters = BTreeSet::new();
    if let Some(bam) = input.bam_metrics {
        if below(bam.bases_dp_over_1, cutoffs.min_bases_dp_over_1) {
            metric_filters.insert(SampleQcMetricFilter::LowBasesDpOver1);
        }
        if below(bam.bases_dp_over_20, cutoffs.min_bases_dp_over_20) {
            metric_filters.insert(SampleQcMetricFilter::LowBasesDpOver20);
        }
        if above(bam.contam_rate, cutoffs.max_contamination) {
            filters.insert(HardFilter::Contamination);
        }
        if above(bam.chimeras_rate, cutoffs.max_chimera) {
            filters.insert(HardFilter::Chimera);
        }
    }

    if input.failed_fingerprinting {
        filters.insert(HardFilter::FailedFingerprinting);
    }
    if !metric_filters.is_empty() {
        filters.insert(HardFilter::SampleQcMetrics);
    }
    if let Some(min_cov) = cutoffs.min_cov {
        if below(input.coverage.and_then(|x| x.chr20_mean_dp), min_cov) {
            filters.insert(HardFilter::LowCoverage);
        }
    }
    if let Some(min_callrate) = cutoffs.min_adj_callrate {
        if below(input.sample_qc.and_then(|x| x.adj_call_rate), min_callrate) {
            filters.insert(HardFilter::LowAdjCallrate);
        }
    }
    if include_sex_filter {
        if let Some(karyotype) = input.sex_karyotype {
            if karyotype == SexKaryotype::Ambiguous {
                filters.insert(HardFilter::AmbiguousSex);
            } else if karyotype.is_aneuploid() {
                filters.insert(HardFilter::SexAneuploidy);
            }
        }
    }

    SampleHardFilters {
        s: s.to_string(),
        hard_filtered: !filters.is_empty(),
        hard_filters: filters,
        sample_qc_metric_hard_filters: metric_filters,
    }
}

/// Count samples failing each filter reason
///
pub fn get_filter_counts(results: &[SampleHardFilters]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for r in results {
        for f in r.hard_filters.iter() {
            *counts.entry(f.to_string()).or_insert(0) += 1;
        }
        for f in r.sample_qc_metric_hard_filters.iter() {
            *counts.entry(f.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

fn run_sample_qc(shared: &SharedSettings, settings: &HardFiltersSettings) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let Some(vcf_filename) = settings.vcf_filename.as_deref() else {
        bail!("--vcf is required with --sample-qc");
    };

    let mut matrix = read_genotype_matrix(Utf8Path::new(vcf_filename), layout.record_limit())?;
    let mut stats = SampleQcStats {
        sample_count: matrix.sample_count(),
        ..Default::default()
    };

    if let Some(filename) = settings.exclude_regions_filename.as_deref() {
        let regions = GenomeRegions::from_bed(Utf8Path::new(filename), "excluded regions")?;
        let before = matrix.rows.len();
        matrix.retain_rows(|row| !regions.contains_locus(&row.key.locus));
        stats.excluded_region_variant_count = before - matrix.rows.len();
        info!(
            "Excluded {} variants in excluded regions from sample QC",
            stats.excluded_region_variant_count.separate_with_commas()
        );
    }
    stats.variant_count = matrix.rows.len();

    let metrics = compute_sample_qc_metrics(&matrix, &settings.adj.cutoffs());
    info!(
        "Computed sample QC metrics for {} samples over {} variants",
        metrics.len().separate_with_commas(),
        stats.variant_count.separate_with_commas()
    );

    let table = Table::new(NoGlobals {}, metrics)?;
    layout.write(&Resource::SampleQcMetrics, &table, shared.overwrite)?;
    write_run_stats(shared, "sample_qc", &stats)
}

fn run_compute_hard_filters(
    shared: &SharedSettings,
    settings: &HardFiltersSettings,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let Some(bam_metrics_filename) = settings.bam_metrics_filename.as_deref() else {
        bail!("--bam-metrics is required with --compute-hard-filters");
    };

    let sample_qc: Table<SampleQcMetrics, NoGlobals> = layout.read(&Resource::SampleQcMetrics)?;
    let bam_metrics = read_bam_metrics(Utf8Path::new(bam_metrics_filename))?;
    let coverage = read_coverage_input(&layout, &settings.coverage)?;
    let failed_fingerprinting = match settings.fingerprint_failures_filename.as_deref() {
        Some(filename) => read_id_list(Utf8Path::new(filename), "fingerprint failures")?
            .into_iter()
            .collect::<BTreeSet<_>>(),
        None => BTreeSet::new(),
    };
    let sex = if settings.include_sex_filter {
        Some(layout.read::<SexImputation, SexGlobals>(&Resource::SexInference)?)
    } else {
        None
    };

    let ids = |f: &dyn Fn(&str) -> bool| {
        sample_qc
            .rows()
            .iter()
            .map(|x| x.s.as_str())
            .filter(|s| f(s))
            .collect::<Vec<_>>()
    };
    warn_sample_mismatch(
        "have no alignment metrics",
        &ids(&|s| !bam_metrics.contains_key(s)),
    );
    warn_sample_mismatch("have no coverage record", &ids(&|s| !coverage.contains_key(s)));
    if let Some(sex) = sex.as_ref() {
        warn_sample_mismatch(
            "have no sex imputation and will not be sex filtered",
            &ids(&|s| !sex.contains_key(&s.to_string())),
        );
    }
    let unknown_fingerprint_failures = failed_fingerprinting
        .iter()
        .filter(|s| !sample_qc.contains_key(*s))
        .map(|x| x.as_str())
        .collect::<Vec<_>>();
    warn_sample_mismatch(
        "in the fingerprint failure list are not in the genotype data",
        &unknown_fingerprint_failures,
    );

    let cutoffs = settings.cutoffs();
    let results = sample_qc
        .rows()
        .iter()
        .map(|qc| {
            let s = qc.s.as_str();
            let input = HardFilterInput {
                sample_qc: Some(qc),
                bam_metrics: bam_metrics.get(s),
                coverage: coverage.get(s),
                failed_fingerprinting: failed_fingerprinting.contains(s),
                sex_karyotype: sex
                    .as_ref()
                    .and_then(|t| t.get(&qc.s))
                    .map(|x| x.sex_karyotype),
            };
            get_sample_hard_filters(s, &input, &cutoffs, settings.include_sex_filter)
        })
        .collect::<Vec<_>>();

    let stats = HardFilterStats {
        sample_count: results.len(),
        hard_filtered_sample_count: results.iter().filter(|x| x.hard_filtered).count(),
        include_sex_filter: settings.include_sex_filter,
        filter_counts: get_filter_counts(&results),
    };
    info!(
        "Hard filtered {} of {} samples",
        stats.hard_filtered_sample_count.separate_with_commas(),
        stats.sample_count.separate_with_commas()
    );
    log_category_counts("Samples failing hard filter", &stats.filter_counts);

    let globals = HardFilterGlobals {
        cutoffs,
        include_sex_filter: settings.include_sex_filter,
    };
    let table = Table::new(globals, results)?;
    let (resource, stage) = if settings.include_sex_filter {
        (Resource::HardFilters, "hard_filters")
    } else {
        (Resource::HardFiltersNoSex, "hard_filters_no_sex")
    };
    layout.write(&resource, &table, shared.overwrite)?;
    write_run_stats(shared, stage, &stats)
}

/// Run the hard-filters stage
///
pub fn run_hard_filters(shared: &SharedSettings, settings: &HardFiltersSettings) -> SimpleResult<()> {
    if settings.sample_qc {
        run_sample_qc(shared, settings)?;
    }
    if settings.compute_hard_filters {
        run_compute_hard_filters(shared, settings)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bam(contam: f64, chimera: f64) -> BamMetrics {
        BamMetrics {
            s: "S1".to_string(),
            contam_rate: Some(contam),
            chimeras_rate: Some(chimera),
            bases_dp_over_1: Some(6e7),
            bases_dp_over_20: Some(5e7),
        }
    }

    #[test]
    fn test_reason_accumulation() {
        let bam = bam(0.1, 0.2);
        let input = HardFilterInput {
            bam_metrics: Some(&bam),
            ..Default::default()
        };
        let result = get_sample_hard_filters("S1", &input, &HardFilterCutoffs::default(), false);
        assert_eq!(result.hard_filters.len(), 2);
        assert!(result.hard_filters.contains(&HardFilter::Contamination));
        assert!(result.hard_filters.contains(&HardFilter::Chimera));
        assert!(result.hard_filtered);

        let names = result
            .hard_filters
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["contamination", "chimera"]);
    }

    #[test]
    fn test_passing_sample() {
        let bam = bam(0.01, 0.01);
        let qc = SampleQcMetrics {
            s: "S1".to_string(),
            n_singleton: 100,
            r_het_hom_var: Some(1.5),
            adj_call_rate: Some(0.99),
            ..Default::default()
        };
        let cov = SampleCoverage {
            s: "S1".to_string(),
            chr20_mean_dp: Some(30.0),
            ..Default::default()
        };
        let input = HardFilterInput {
            sample_qc: Some(&qc),
            bam_metrics: Some(&bam),
            coverage: Some(&cov),
            failed_fingerprinting: false,
            sex_karyotype: Some(SexKaryotype::XX),
        };
        let cutoffs = HardFilterCutoffs {
            min_cov: Some(15.0),
            min_adj_callrate: Some(0.8),
            ..Default::default()
        };
        let result = get_sample_hard_filters("S1", &input, &cutoffs, true);
        assert!(result.hard_filters.is_empty());
        assert!(!result.hard_filtered);
    }

    #[test]
    fn test_metric_and_sex_filters() {
        let qc = SampleQcMetrics {
            s: "S1".to_string(),
            n_singleton: 10000,
            r_het_hom_var: Some(20.0),
            ..Default::default()
        };
        let input = HardFilterInput {
            sample_qc: Some(&qc),
            failed_fingerprinting: true,
            sex_karyotype: Some(SexKaryotype::XXY),
            ..Default::default()
        };
        let cutoffs = HardFilterCutoffs::default();

        let result = get_sample_hard_filters("S1", &input, &cutoffs, false);
        assert_eq!(
            result.hard_filters,
            BTreeSet::from([HardFilter::FailedFingerprinting, HardFilter::SampleQcMetrics])
        );
        assert_eq!(result.sample_qc_metric_hard_filters.len(), 2);

        let result = get_sample_hard_filters("S1", &input, &cutoffs, true);
        assert!(result.hard_filters.contains(&HardFilter::SexAneuploidy));
        assert!(!result.hard_filters.contains(&HardFilter::AmbiguousSex));

        let counts = get_filter_counts(&[result]);
        assert_eq!(counts["high_n_singleton"], 1);
        assert_eq!(counts["sex_aneuploidy"], 1);
    }

    #[test]
    fn test_missing_metrics_do_not_filter() {
        let bam = BamMetrics {
            s: "S1".to_string(),
            ..Default::default()
        };
        let input = HardFilterInput {
            bam_metrics: Some(&bam),
            ..Default::default()
        };
        let cutoffs = HardFilterCutoffs {
            min_cov: Some(15.0),
            ..Default::default()
        };
        let result = get_sample_hard_filters("S1", &input, &cutoffs, true);
        assert!(!result.hard_filtered);
    }
}
