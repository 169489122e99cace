//! Per-interval coverage QC over the calling intervals
//!
//! Interval coverage summaries are aggregated over all QC-passing samples for autosomal intervals,
//! and over the XX and XY samples, also split by karyotype, for sex chromosome intervals. The pass
//! flag marks the high coverage intervals, which can restrict the per-sample coverage used for sex
//! inference and the low coverage hard filter.
//!

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use super::hard_filters::{HardFilterGlobals, SampleHardFilters};
use super::sex_inference::{SexGlobals, SexImputation, SexKaryotype};
use crate::cli::{CoverageSourceSettings, IntervalQcSettings, SharedSettings};
use crate::locus::{Locus, range_overlaps_par};
use crate::log_utils::log_category_counts;
use crate::resources::{Resource, ResourceLayout};
use crate::run_stats::{IntervalQcStats, write_run_stats};
use crate::sample_meta::{SampleCoverage, read_sample_coverage};
use crate::stats_utils::mean;
use crate::table::{KeyedRow, Table};
use crate::tsv_utils::read_tsv_rows;

/// Calling interval as a zero-indexed half-open range
///
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct CoverageInterval {
    pub contig: String,
    pub start: i64,
    pub end: i64,
}

impl CoverageInterval {
    pub fn size(&self) -> i64 {
        self.end - self.start
    }

    /// 1-indexed locus of the first interval base
    fn start_locus(&self) -> Locus {
        Locus::new(&self.contig, self.start + 1)
    }

    pub fn overlaps_par(&self) -> bool {
        range_overlaps_par(&self.contig, self.start, self.end)
    }

    fn in_sex_chromosome(&self) -> bool {
        let locus = self.start_locus();
        locus.in_x() || locus.in_y()
    }

    fn in_normalization_contig(&self) -> bool {
        self.contig.strip_prefix("chr").unwrap_or(&self.contig) == "20"
    }

    pub fn region(&self) -> IntervalRegion {
        let locus = self.start_locus();
        if locus.in_autosome() || locus.in_x_par() || locus.in_y_par() || self.overlaps_par() {
            IntervalRegion::AutosomeOrPar
        } else if locus.in_x_nonpar() {
            IntervalRegion::XNonPar
        } else if locus.in_y_nonpar() {
            IntervalRegion::YNonPar
        } else {
            IntervalRegion::Other
        }
    }
}

impl fmt::Display for CoverageInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

impl Ord for CoverageInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_locus()
            .cmp(&other.start_locus())
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl PartialOrd for CoverageInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Interval class selecting the sample groups which decide whether an interval passes
///
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntervalRegion {
    AutosomeOrPar,
    XNonPar,
    YNonPar,
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SampleIntervalDepth {
    pub sum_dp: f64,

    /// Fraction of interval bases with depth above 0
    pub fraction_over_dp_0: f64,
}

/// Interval-by-sample coverage input
///
#[derive(Default)]
pub struct IntervalCoverage {
    pub intervals: BTreeMap<CoverageInterval, BTreeMap<String, SampleIntervalDepth>>,
}

#[derive(Deserialize)]
struct IntervalCoverageRecord {
    contig: String,
    start: i64,
    end: i64,
    s: String,
    sum_dp: f64,
    fraction_over_dp_0: f64,
}

/// Read interval coverage in long tab-separated format, one record per interval and sample
///
pub fn read_interval_coverage(filename: &Utf8Path) -> SimpleResult<IntervalCoverage> {
    let records: Vec<IntervalCoverageRecord> = read_tsv_rows(filename, "interval coverage")?;
    let mut coverage = IntervalCoverage::default();
    for record in records {
        let interval = CoverageInterval {
            contig: record.contig,
            start: record.start,
            end: record.end,
        };
        if interval.start < 0 || interval.end <= interval.start {
            bail!("Invalid interval {interval} in interval coverage input");
        }
        if !(record.sum_dp >= 0.0) || !(0.0..=1.0).contains(&record.fraction_over_dp_0) {
            bail!(
                "Invalid coverage values for sample '{}' in interval {interval}",
                record.s
            );
        }
        let depth = SampleIntervalDepth {
            sum_dp: record.sum_dp,
            fraction_over_dp_0: record.fraction_over_dp_0,
        };
        let samples = coverage.intervals.entry(interval.clone()).or_default();
        if samples.insert(record.s.clone(), depth).is_some() {
            bail!(
                "Duplicate coverage record for sample '{}' in interval {interval}",
                record.s
            );
        }
    }
    info!(
        "Read coverage for {} intervals",
        coverage.intervals.len().separate_with_commas()
    );
    Ok(coverage)
}

/// One interval statistic over all samples, and over the XX and XY samples separately
///
/// The karyotype split is only computed on sex chromosome intervals.
///
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GroupedStat {
    pub all: Option<f64>,
    pub xx: Option<f64>,
    pub xy: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IntervalQc {
    pub interval: CoverageInterval,
    pub overlap_par: bool,
    pub region: IntervalRegion,
    pub interval_mean_dp: GroupedStat,

    /// Fraction of samples with interval mean depth at or above each depth threshold
    pub prop_samples_by_dp: BTreeMap<u32, GroupedStat>,

    pub mean_fraction_over_dp_0: GroupedStat,
    pub pass_interval_qc: bool,
}

impl KeyedRow for IntervalQc {
    type Key = CoverageInterval;
    fn key(&self) -> CoverageInterval {
        self.interval.clone()
    }
}

/// Rule defining high coverage intervals
///
/// Autosomal and PAR intervals are tested on all samples, chrX non-PAR intervals on both the XX
/// and XY samples, and chrY non-PAR intervals on the XY samples. A value must exceed the cutoff
/// to pass.
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum IntervalPassCriteria {
    MeanFractionOverDp0 {
        cutoff: f64,
    },
    PropSamplesOverCov {
        /// Depth threshold used for autosomes, PAR and XX samples on chrX
        autosome_par_xx_cov: u32,

        /// Depth threshold used for XY samples on chrX and chrY non-PAR
        xy_nonpar_cov: u32,

        prop_samples: f64,
    },
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IntervalQcGlobals {
    pub mean_dp_thresholds: Vec<u32>,
    pub pass_criteria: IntervalPassCriteria,
    pub sample_count: usize,
    pub xx_sample_count: usize,
    pub xy_sample_count: usize,
}

pub fn interval_passes(row: &IntervalQc, criteria: &IntervalPassCriteria) -> bool {
    let (autosome_par, xx, xy, cutoff) = match criteria {
        IntervalPassCriteria::MeanFractionOverDp0 { cutoff } => (
            row.mean_fraction_over_dp_0.all,
            row.mean_fraction_over_dp_0.xx,
            row.mean_fraction_over_dp_0.xy,
            *cutoff,
        ),
        IntervalPassCriteria::PropSamplesOverCov {
            autosome_par_xx_cov,
            xy_nonpar_cov,
            prop_samples,
        } => {
            let autosome_par_xx = row.prop_samples_by_dp.get(autosome_par_xx_cov);
            let xy_nonpar = row.prop_samples_by_dp.get(xy_nonpar_cov);
            (
                autosome_par_xx.and_then(|x| x.all),
                autosome_par_xx.and_then(|x| x.xx),
                xy_nonpar.and_then(|x| x.xy),
                *prop_samples,
            )
        }
    };
    let over = |x: Option<f64>| x.is_some_and(|v| v > cutoff);
    match row.region {
        IntervalRegion::AutosomeOrPar => over(autosome_par),
        IntervalRegion::XNonPar => over(xx) && over(xy),
        IntervalRegion::YNonPar => over(xy),
        IntervalRegion::Other => false,
    }
}

fn grouped_stat(values: &[(f64, Option<SexKaryotype>)], split_by_sex: bool) -> GroupedStat {
    let group = |karyotype: SexKaryotype| {
        mean(
            &values
                .iter()
                .filter(|(_, k)| *k == Some(karyotype))
                .map(|(v, _)| *v)
                .collect::<Vec<_>>(),
        )
    };
    GroupedStat {
        all: mean(&values.iter().map(|(v, _)| *v).collect::<Vec<_>>()),
        xx: split_by_sex.then(|| group(SexKaryotype::XX)).flatten(),
        xy: split_by_sex.then(|| group(SexKaryotype::XY)).flatten(),
    }
}

/// Compute coverage summaries and the pass flag of every autosomal and sex chromosome interval
///
/// # Arguments
/// * `samples` - QC-passing samples to aggregate over
/// * `karyotypes` - Sex karyotype of each sample, only XX and XY samples are used on sex
///   chromosome intervals
///
pub fn compute_interval_qc(
    coverage: &IntervalCoverage,
    samples: &HashSet<String>,
    karyotypes: &BTreeMap<String, SexKaryotype>,
    mean_dp_thresholds: &[u32],
    criteria: &IntervalPassCriteria,
) -> Vec<IntervalQc> {
    coverage
        .intervals
        .iter()
        .filter(|(interval, _)| interval.region() != IntervalRegion::Other)
        .map(|(interval, depths)| {
            let split_by_sex = interval.in_sex_chromosome();
            let included = depths
                .iter()
                .filter(|(s, _)| samples.contains(*s))
                .filter_map(|(s, depth)| {
                    let karyotype = karyotypes.get(s).copied();
                    if split_by_sex
                        && !matches!(karyotype, Some(SexKaryotype::XX | SexKaryotype::XY))
                    {
                        None
                    } else {
                        Some((depth, karyotype))
                    }
                })
                .collect::<Vec<_>>();

            let size = interval.size() as f64;
            let values = |f: &dyn Fn(&SampleIntervalDepth) -> f64| {
                included
                    .iter()
                    .map(|(depth, karyotype)| (f(depth), *karyotype))
                    .collect::<Vec<_>>()
            };
            let mean_dp = values(&|x: &SampleIntervalDepth| x.sum_dp / size);
            let prop_samples_by_dp = mean_dp_thresholds
                .iter()
                .map(|&dp| {
                    let over = mean_dp
                        .iter()
                        .map(|(v, k)| (if *v >= dp as f64 { 1.0 } else { 0.0 }, *k))
                        .collect::<Vec<_>>();
                    (dp, grouped_stat(&over, split_by_sex))
                })
                .collect();

            let mut row = IntervalQc {
                interval: interval.clone(),
                overlap_par: interval.overlaps_par(),
                region: interval.region(),
                interval_mean_dp: grouped_stat(&mean_dp, split_by_sex),
                prop_samples_by_dp,
                mean_fraction_over_dp_0: grouped_stat(
                    &values(&|x: &SampleIntervalDepth| x.fraction_over_dp_0),
                    split_by_sex,
                ),
                pass_interval_qc: false,
            };
            row.pass_interval_qc = interval_passes(&row, criteria);
            row
        })
        .collect()
}

/// Per-sample mean depth on chr20, chrX non-PAR and chrY non-PAR from interval coverage
///
/// Mean depth is the depth summed over intervals divided by the summed interval length. When
/// `passing` is given, only those intervals contribute.
///
pub fn summarize_sample_coverage(
    coverage: &IntervalCoverage,
    passing: Option<&HashSet<CoverageInterval>>,
) -> BTreeMap<String, SampleCoverage> {
    #[derive(Default)]
    struct DepthSum {
        sum_dp: f64,
        size: f64,
    }

    impl DepthSum {
        fn mean(&self) -> Option<f64> {
            (self.size > 0.0).then(|| self.sum_dp / self.size)
        }
    }

    let mut sums: BTreeMap<&str, [DepthSum; 3]> = BTreeMap::new();
    for (interval, depths) in coverage.intervals.iter() {
        if passing.is_some_and(|x| !x.contains(interval)) {
            continue;
        }
        let slot = if interval.in_normalization_contig() {
            0
        } else {
            match interval.region() {
                IntervalRegion::XNonPar => 1,
                IntervalRegion::YNonPar => 2,
                _ => continue,
            }
        };
        for (s, depth) in depths.iter() {
            let sum = &mut sums.entry(s.as_str()).or_default()[slot];
            sum.sum_dp += depth.sum_dp;
            sum.size += interval.size() as f64;
        }
    }

    sums.into_iter()
        .map(|(s, [chr20, chrx, chry])| {
            let row = SampleCoverage {
                s: s.to_string(),
                chr20_mean_dp: chr20.mean(),
                chrx_mean_dp: chrx.mean(),
                chry_mean_dp: chry.mean(),
            };
            (s.to_string(), row)
        })
        .collect()
}

/// Intervals flagged as high coverage by the interval-qc stage
///
pub fn read_passing_intervals(layout: &ResourceLayout) -> SimpleResult<HashSet<CoverageInterval>> {
    let table: Table<IntervalQc, IntervalQcGlobals> = layout.read(&Resource::IntervalQc)?;
    let passing = table
        .into_rows()
        .into_iter()
        .filter(|x| x.pass_interval_qc)
        .map(|x| x.interval)
        .collect::<HashSet<_>>();
    info!(
        "Restricting coverage to {} high coverage intervals",
        passing.len().separate_with_commas()
    );
    Ok(passing)
}

/// Per-sample coverage from either the per-sample coverage table or interval coverage
///
/// Interval coverage is restricted to the intervals passing interval QC when requested.
///
pub fn read_coverage_input(
    layout: &ResourceLayout,
    source: &CoverageSourceSettings,
) -> SimpleResult<BTreeMap<String, SampleCoverage>> {
    match (
        source.coverage_filename.as_deref(),
        source.interval_coverage_filename.as_deref(),
    ) {
        (Some(filename), None) => read_sample_coverage(Utf8Path::new(filename)),
        (None, Some(filename)) => {
            let coverage = read_interval_coverage(Utf8Path::new(filename))?;
            let passing = if source.use_interval_qc_pass {
                Some(read_passing_intervals(layout)?)
            } else {
                None
            };
            Ok(summarize_sample_coverage(&coverage, passing.as_ref()))
        }
        _ => bail!("Exactly one of --coverage or --interval-coverage must be specified"),
    }
}

/// Run the interval-qc stage
///
/// Samples failing the sex-independent hard filters are excluded. Sex chromosome intervals use the
/// karyotypes from the sex-inference stage.
///
pub fn run_interval_qc(shared: &SharedSettings, settings: &IntervalQcSettings) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let hard_filters: Table<SampleHardFilters, HardFilterGlobals> =
        layout.read(&Resource::HardFiltersNoSex)?;
    let sex: Table<SexImputation, SexGlobals> = layout.read(&Resource::SexInference)?;
    let coverage = read_interval_coverage(Utf8Path::new(&settings.interval_coverage_filename))?;

    let samples = hard_filters
        .rows()
        .iter()
        .filter(|x| !x.hard_filtered)
        .map(|x| x.s.clone())
        .collect::<HashSet<_>>();
    let karyotypes = sex
        .rows()
        .iter()
        .filter(|x| samples.contains(&x.s))
        .map(|x| (x.s.clone(), x.sex_karyotype))
        .collect::<BTreeMap<_, _>>();
    let karyotype_count = |k: SexKaryotype| karyotypes.values().filter(|x| **x == k).count();

    let criteria = settings.pass_criteria();
    let rows = compute_interval_qc(
        &coverage,
        &samples,
        &karyotypes,
        &settings.mean_dp_thresholds,
        &criteria,
    );

    let mut stats = IntervalQcStats {
        interval_count: rows.len(),
        excluded_interval_count: coverage.intervals.len() - rows.len(),
        sample_count: samples.len(),
        ..Default::default()
    };
    for row in rows.iter() {
        let (total, pass) = stats.region_counts.entry(row.region.to_string()).or_default();
        *total += 1;
        if row.pass_interval_qc {
            *pass += 1;
            stats.pass_interval_count += 1;
        }
    }
    let pass_counts = stats
        .region_counts
        .iter()
        .map(|(region, (_, pass))| (region.clone(), *pass))
        .collect::<BTreeMap<_, _>>();
    log_category_counts("High coverage intervals in region", &pass_counts);
    info!(
        "{} of {} intervals pass interval QC",
        stats.pass_interval_count.separate_with_commas(),
        stats.interval_count.separate_with_commas()
    );

    let contigs = rows
        .iter()
        .map(|x| x.interval.contig.as_str())
        .collect::<BTreeSet<_>>();
    if !contigs.iter().any(|x| x.strip_prefix("chr").unwrap_or(x) == "20") {
        log::warn!("Interval coverage has no chr20 intervals, coverage normalization will fail");
    }

    let globals = IntervalQcGlobals {
        mean_dp_thresholds: settings.mean_dp_thresholds.clone(),
        pass_criteria: criteria,
        sample_count: samples.len(),
        xx_sample_count: karyotype_count(SexKaryotype::XX),
        xy_sample_count: karyotype_count(SexKaryotype::XY),
    };
    let table = Table::new(globals, rows)?;
    layout.write(&Resource::IntervalQc, &table, shared.overwrite)?;
    write_run_stats(shared, "interval_qc", &stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn interval(contig: &str, start: i64, end: i64) -> CoverageInterval {
        CoverageInterval {
            contig: contig.to_string(),
            start,
            end,
        }
    }

    fn depth(mean_dp: f64, fraction_over_dp_0: f64) -> SampleIntervalDepth {
        // All test intervals are 100bp
        SampleIntervalDepth {
            sum_dp: mean_dp * 100.0,
            fraction_over_dp_0,
        }
    }

    fn test_coverage() -> IntervalCoverage {
        let mut coverage = IntervalCoverage::default();
        let mut add = |i: CoverageInterval, values: [(f64, f64); 3]| {
            let samples = ["F1", "M1", "M2"]
                .iter()
                .zip(values)
                .map(|(s, (dp, frac))| (s.to_string(), depth(dp, frac)))
                .collect();
            coverage.intervals.insert(i, samples);
        };
        add(interval("chr20", 1000, 1100), [(30.0, 1.0), (28.0, 1.0), (32.0, 1.0)]);
        // Poorly covered autosomal interval
        add(interval("chr20", 5000, 5100), [(2.0, 0.5), (30.0, 1.0), (30.0, 1.0)]);
        add(interval("chrX", 5_000_000, 5_000_100), [(30.0, 1.0), (15.0, 1.0), (15.0, 1.0)]);
        add(interval("chrY", 3_000_000, 3_000_100), [(0.0, 0.0), (15.0, 1.0), (15.0, 1.0)]);
        add(interval("chrM", 0, 100), [(1000.0, 1.0), (1000.0, 1.0), (1000.0, 1.0)]);
        coverage
    }

    fn test_karyotypes() -> BTreeMap<String, SexKaryotype> {
        BTreeMap::from([
            ("F1".to_string(), SexKaryotype::XX),
            ("M1".to_string(), SexKaryotype::XY),
            ("M2".to_string(), SexKaryotype::XY),
        ])
    }

    #[test]
    fn test_interval_region() {
        assert_eq!(interval("chr1", 0, 10).region(), IntervalRegion::AutosomeOrPar);
        assert_eq!(interval("chrX", 9_000, 10_500).region(), IntervalRegion::AutosomeOrPar);
        assert_eq!(interval("chrX", 5_000_000, 5_000_100).region(), IntervalRegion::XNonPar);
        assert_eq!(interval("chrY", 3_000_000, 3_000_100).region(), IntervalRegion::YNonPar);
        assert_eq!(interval("chrM", 0, 100).region(), IntervalRegion::Other);
    }

    #[test]
    fn test_compute_interval_qc() {
        let coverage = test_coverage();
        let samples = ["F1", "M1", "M2"].map(String::from).into_iter().collect();
        let criteria = IntervalPassCriteria::MeanFractionOverDp0 { cutoff: 0.99 };
        let karyotypes = test_karyotypes();
        let rows = compute_interval_qc(&coverage, &samples, &karyotypes, &[10, 20], &criteria);

        // chrM is dropped
        assert_eq!(rows.len(), 4);
        let pass = rows.iter().map(|x| x.pass_interval_qc).collect::<Vec<_>>();
        assert_eq!(pass, vec![true, false, true, true]);

        let failing = &rows[1];
        assert_abs_diff_eq!(failing.mean_fraction_over_dp_0.all.unwrap(), 2.5 / 3.0);
        assert_eq!(failing.mean_fraction_over_dp_0.xx, None);
        assert_abs_diff_eq!(failing.prop_samples_by_dp[&10].all.unwrap(), 2.0 / 3.0);

        let chry = &rows[3];
        assert_eq!(chry.mean_fraction_over_dp_0.xx, Some(0.0));
        assert_eq!(chry.mean_fraction_over_dp_0.xy, Some(1.0));
        assert_abs_diff_eq!(chry.interval_mean_dp.xy.unwrap(), 15.0);

        // XY samples don't reach 20x on chrX, so the interval fails by proportion over 20x
        let criteria = IntervalPassCriteria::PropSamplesOverCov {
            autosome_par_xx_cov: 20,
            xy_nonpar_cov: 20,
            prop_samples: 0.85,
        };
        let karyotypes = test_karyotypes();
        let rows = compute_interval_qc(&coverage, &samples, &karyotypes, &[10, 20], &criteria);
        let pass = rows.iter().map(|x| x.pass_interval_qc).collect::<Vec<_>>();
        assert_eq!(pass, vec![true, false, false, false]);
    }

    #[test]
    fn test_excluded_samples() {
        let coverage = test_coverage();
        let samples = ["M1", "M2"].map(String::from).into_iter().collect();
        let criteria = IntervalPassCriteria::MeanFractionOverDp0 { cutoff: 0.99 };
        let rows = compute_interval_qc(&coverage, &samples, &test_karyotypes(), &[10], &criteria);
        assert!(rows[1].pass_interval_qc);

        // Without an XX sample no chrX non-PAR interval can pass
        assert!(!rows[2].pass_interval_qc);
    }

    #[test]
    fn test_summarize_sample_coverage() {
        let coverage = test_coverage();
        let summary = summarize_sample_coverage(&coverage, None);
        let f1 = &summary["F1"];
        assert_abs_diff_eq!(f1.chr20_mean_dp.unwrap(), 16.0);
        assert_abs_diff_eq!(f1.chrx_mean_dp.unwrap(), 30.0);
        assert_abs_diff_eq!(f1.chry_mean_dp.unwrap(), 0.0);

        let passing = HashSet::from([
            interval("chr20", 1000, 1100),
            interval("chrX", 5_000_000, 5_000_100),
        ]);
        let summary = summarize_sample_coverage(&coverage, Some(&passing));
        let f1 = &summary["F1"];
        assert_abs_diff_eq!(f1.chr20_mean_dp.unwrap(), 30.0);
        assert_eq!(f1.chry_mean_dp, None);
    }

    #[test]
    fn test_read_interval_coverage() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "contig\tstart\tend\ts\tsum_dp\tfraction_over_dp_0").unwrap();
        writeln!(file, "chr20\t0\t100\tS1\t3000\t1.0").unwrap();
        writeln!(file, "chr20\t0\t100\tS2\t2000\t0.9").unwrap();
        let filename = Utf8Path::from_path(file.path()).unwrap().to_path_buf();
        let coverage = read_interval_coverage(&filename).unwrap();
        assert_eq!(coverage.intervals[&interval("chr20", 0, 100)].len(), 2);

        writeln!(file, "chr20\t0\t100\tS2\t2000\t0.9").unwrap();
        assert!(read_interval_coverage(&filename).is_err());
    }
}
