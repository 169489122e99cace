//! Sex karyotype inference from chrX inbreeding and normalized sex chromosome coverage
//!

use std::collections::{BTreeMap, HashSet};

use camino::Utf8Path;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use super::hard_filters::{HardFilterGlobals, SampleHardFilters};
use super::interval_qc::read_coverage_input;
use crate::cli::{SexInferenceSettings, SharedSettings};
use crate::genotype_matrix::{GenotypeMatrix, read_genotype_matrix};
use crate::log_utils::log_category_counts;
use crate::resources::Resource;
use crate::run_stats::{SexInferenceStats, write_run_stats};
use crate::sample_meta::SampleCoverage;
use crate::stats_utils::mean_and_stdev;
use crate::table::{KeyedRow, Table};

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
    strum::EnumString,
)]
pub enum SexKaryotype {
    XX,
    XY,
    X0,
    XXY,
    XYY,
    XXX,
    #[serde(rename = "ambiguous")]
    #[strum(serialize = "ambiguous")]
    Ambiguous,
}

impl SexKaryotype {
    fn from_ploidy_calls(x_call: XPloidy, y_call: YPloidy) -> Self {
        use SexKaryotype::*;
        match (x_call, y_call) {
            (XPloidy::XX, YPloidy::None) => XX,
            (XPloidy::X, YPloidy::Y) => XY,
            (XPloidy::X, YPloidy::None) => X0,
            (XPloidy::XX, YPloidy::Y) => XXY,
            (XPloidy::X, YPloidy::YY) => XYY,
            (XPloidy::XXX, YPloidy::None) => XXX,
            _ => Ambiguous,
        }
    }

    /// True for any karyotype other than the two euploid karyotypes or an ambiguous call
    pub fn is_aneuploid(&self) -> bool {
        !matches!(
            self,
            SexKaryotype::XX | SexKaryotype::XY | SexKaryotype::Ambiguous
        )
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, strum::Display)]
pub enum XPloidy {
    X,
    XX,
    XXX,
    #[strum(serialize = "ambiguous")]
    Ambiguous,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, strum::Display)]
pub enum YPloidy {
    #[strum(serialize = "")]
    None,
    Y,
    YY,
    #[strum(serialize = "ambiguous")]
    Ambiguous,
}

/// Normalized ploidy cutoffs for the X and Y chromosomes
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PloidyCutoffs {
    /// Upper bound of single X ploidy
    pub upper_x: f64,
    pub lower_xx: f64,
    pub upper_xx: f64,

    /// Lower bound of triple X ploidy
    pub lower_xxx: f64,

    /// Lower bound of single Y ploidy
    pub lower_y: f64,
    pub upper_y: f64,

    /// Lower bound of double Y ploidy
    pub lower_yy: f64,
}

/// User-specified replacements for individual derived ploidy cutoffs
///
#[derive(Clone, Debug, Default)]
pub struct PloidyCutoffOverrides {
    pub upper_x: Option<f64>,
    pub lower_xx: Option<f64>,
    pub upper_xx: Option<f64>,
    pub lower_xxx: Option<f64>,
    pub lower_y: Option<f64>,
    pub upper_y: Option<f64>,
    pub lower_yy: Option<f64>,
}

impl PloidyCutoffOverrides {
    fn is_complete(&self) -> bool {
        self.upper_x.is_some()
            && self.lower_xx.is_some()
            && self.upper_xx.is_some()
            && self.lower_xxx.is_some()
            && self.lower_y.is_some()
            && self.upper_y.is_some()
            && self.lower_yy.is_some()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SexImputationParams {
    /// Samples with chrX F-stat below this value form the XX group for cutoff derivation
    pub f_stat_cutoff: f64,

    /// Alt allele frequency bounds for chrX sites used in the F-stat
    pub aaf_threshold: f64,

    /// Number of standard deviations from the group mean defining normal ploidy ranges
    pub normal_ploidy_sd: f64,

    /// Number of standard deviations above the group mean defining aneuploidy
    pub aneuploidy_sd: f64,
}

impl Default for SexImputationParams {
    fn default() -> Self {
        Self {
            f_stat_cutoff: 0.5,
            aaf_threshold: 0.001,
            normal_ploidy_sd: 5.0,
            aneuploidy_sd: 6.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SexImputation {
    pub s: String,

    /// Inbreeding coefficient over chrX non-PAR sites
    pub f_stat: Option<f64>,
    pub n_called_x: u64,
    pub chr20_mean_dp: Option<f64>,
    pub chrx_ploidy: Option<f64>,
    pub chry_ploidy: Option<f64>,
    pub x_ploidy: Option<XPloidy>,
    pub y_ploidy: Option<YPloidy>,
    pub sex_karyotype: SexKaryotype,
}

impl KeyedRow for SexImputation {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SexGlobals {
    pub params: SexImputationParams,
    pub ploidy_cutoffs: PloidyCutoffs,
    pub n_cutoff_samples_xx: usize,
    pub n_cutoff_samples_xy: usize,
}

/// Per-sample chrX inbreeding coefficient over common non-PAR sites
///
/// Returns F-stat (if defined) and the number of called genotypes used, in matrix sample order.
///
pub fn compute_chrx_f_stat(
    matrix: &GenotypeMatrix,
    aaf_threshold: f64,
) -> Vec<(Option<f64>, u64)> {
    let sample_count = matrix.sample_count();
    let mut n_called = vec![0u64; sample_count];
    let mut observed_homs = vec![0f64; sample_count];
    let mut expected_homs = vec![0f64; sample_count];

    for row in matrix.rows.iter() {
        if !row.key.locus.in_x_nonpar() || !row.key.is_biallelic() {
            continue;
        }
        let (ac, an) = row
            .entries
            .iter()
            .filter_map(|x| x.gt)
            .fold((0u32, 0u32), |(ac, an), gt| {
                (ac + gt.n_alt_alleles(), an + gt.ploidy())
            });
        if an == 0 {
            continue;
        }
        let p = ac as f64 / an as f64;
        if p <= aaf_threshold || p >= 1.0 - aaf_threshold {
            continue;
        }
        let e_hom = 1.0 - 2.0 * p * (1.0 - p);
        for (i, entry) in row.entries.iter().enumerate() {
            let Some(gt) = entry.gt else {
                continue;
            };
            n_called[i] += 1;
            expected_homs[i] += e_hom;
            if !gt.is_het() {
                observed_homs[i] += 1.0;
            }
        }
    }

    (0..sample_count)
        .map(|i| {
            let denom = n_called[i] as f64 - expected_homs[i];
            let f = if n_called[i] == 0 || denom == 0.0 {
                None
            } else {
                Some((observed_homs[i] - expected_homs[i]) / denom)
            };
            (f, n_called[i])
        })
        .collect()
}

/// Ploidy normalized to the autosomal chr20 depth, so that two copies gives 2.0
///
fn normalized_ploidy(chrom_dp: Option<f64>, chr20_dp: Option<f64>) -> Option<f64> {
    match (chrom_dp, chr20_dp) {
        (Some(c), Some(a)) if a > 0.0 => Some(2.0 * c / a),
        _ => None,
    }
}

/// Derive ploidy cutoffs from the ploidy distributions of the F-stat defined XX and XY groups
///
/// # Arguments
/// * `samples` - (f_stat, chrx_ploidy, chry_ploidy) for every sample used to define cutoffs
///
pub fn get_ploidy_cutoffs(
    samples: &[(f64, f64, f64)],
    params: &SexImputationParams,
    overrides: &PloidyCutoffOverrides,
) -> SimpleResult<(PloidyCutoffs, usize, usize)> {
    let (xx, xy): (Vec<_>, Vec<_>) = samples
        .iter()
        .partition(|(f, _, _)| *f < params.f_stat_cutoff);

    let stats = |group: &[&(f64, f64, f64)], get: fn(&(f64, f64, f64)) -> f64| {
        mean_and_stdev(&group.iter().map(|x| get(x)).collect::<Vec<_>>())
    };

    let x_xx = stats(&xx, |x| x.1);
    let x_xy = stats(&xy, |x| x.1);
    let y_xx = stats(&xx, |x| x.2);
    let y_xy = stats(&xy, |x| x.2);

    let (x_xx, x_xy, y_xx, y_xy) = match (x_xx, x_xy, y_xx, y_xy) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => {
            if overrides.is_complete() {
                ((0., 0.), (0., 0.), (0., 0.), (0., 0.))
            } else {
                bail!(
                    "Can't derive sex ploidy cutoffs: found {} XX-like and {} XY-like samples. Provide all ploidy cutoffs explicitly",
                    xx.len(),
                    xy.len()
                );
            }
        }
    };

    let n = params.normal_ploidy_sd;
    let a = params.aneuploidy_sd;
    let cutoffs = PloidyCutoffs {
        upper_x: overrides.upper_x.unwrap_or(x_xy.0 + n * x_xy.1),
        lower_xx: overrides.lower_xx.unwrap_or(x_xx.0 - n * x_xx.1),
        upper_xx: overrides.upper_xx.unwrap_or(x_xx.0 + n * x_xx.1),
        lower_xxx: overrides.lower_xxx.unwrap_or(x_xx.0 + a * x_xx.1),
        lower_y: overrides.lower_y.unwrap_or(y_xx.0 + n * y_xx.1),
        upper_y: overrides.upper_y.unwrap_or(y_xy.0 + n * y_xy.1),
        lower_yy: overrides.lower_yy.unwrap_or(y_xy.0 + a * y_xy.1),
    };
    Ok((cutoffs, xx.len(), xy.len()))
}

pub fn call_x_ploidy(ploidy: f64, cutoffs: &PloidyCutoffs) -> XPloidy {
    if ploidy < cutoffs.upper_x {
        XPloidy::X
    } else if ploidy > cutoffs.lower_xx && ploidy < cutoffs.upper_xx {
        XPloidy::XX
    } else if ploidy > cutoffs.lower_xxx {
        XPloidy::XXX
    } else {
        XPloidy::Ambiguous
    }
}

pub fn call_y_ploidy(ploidy: f64, cutoffs: &PloidyCutoffs) -> YPloidy {
    if ploidy < cutoffs.lower_y {
        YPloidy::None
    } else if ploidy < cutoffs.upper_y {
        YPloidy::Y
    } else if ploidy > cutoffs.lower_yy {
        YPloidy::YY
    } else {
        YPloidy::Ambiguous
    }
}

/// Impute sex karyotype for every sample in the coverage input
///
/// # Arguments
/// * `cutoff_samples` - Samples used to derive ploidy cutoffs, typically those passing all
///   sex-independent hard filters
///
pub fn impute_sex(
    matrix: &GenotypeMatrix,
    coverage: &BTreeMap<String, SampleCoverage>,
    cutoff_samples: &HashSet<String>,
    params: &SexImputationParams,
    overrides: &PloidyCutoffOverrides,
) -> SimpleResult<(Vec<SexImputation>, SexGlobals)> {
    let f_stats = compute_chrx_f_stat(matrix, params.aaf_threshold);
    let sample_f_stat = matrix
        .samples
        .iter()
        .zip(f_stats)
        .map(|(s, x)| (s.as_str(), x))
        .collect::<BTreeMap<_, _>>();

    let mut partial = Vec::new();
    for (s, cov) in coverage.iter() {
        let (f_stat, n_called_x) = sample_f_stat.get(s.as_str()).copied().unwrap_or((None, 0));
        let chrx_ploidy = normalized_ploidy(cov.chrx_mean_dp, cov.chr20_mean_dp);
        let chry_ploidy = normalized_ploidy(cov.chry_mean_dp, cov.chr20_mean_dp);
        partial.push((s, f_stat, n_called_x, cov.chr20_mean_dp, chrx_ploidy, chry_ploidy));
    }
    let missing_coverage = matrix
        .samples
        .iter()
        .filter(|s| !coverage.contains_key(*s))
        .count();
    if missing_coverage > 0 {
        warn!("{missing_coverage} genotyped samples have no coverage record and will not receive a sex karyotype");
    }

    let cutoff_input = partial
        .iter()
        .filter(|x| cutoff_samples.contains(x.0))
        .filter_map(|x| match (x.1, x.4, x.5) {
            (Some(f), Some(px), Some(py)) => Some((f, px, py)),
            _ => None,
        })
        .collect::<Vec<_>>();

    let (cutoffs, n_xx, n_xy) = get_ploidy_cutoffs(&cutoff_input, params, overrides)?;
    info!(
        "Sex ploidy cutoffs derived from {n_xx} XX-like and {n_xy} XY-like samples: {cutoffs:?}"
    );

    let rows = partial
        .into_iter()
        .map(|(s, f_stat, n_called_x, chr20_mean_dp, chrx_ploidy, chry_ploidy)| {
            let x_ploidy = chrx_ploidy.map(|p| call_x_ploidy(p, &cutoffs));
            let y_ploidy = chry_ploidy.map(|p| call_y_ploidy(p, &cutoffs));
            let sex_karyotype = match (x_ploidy, y_ploidy) {
                (Some(x), Some(y)) => SexKaryotype::from_ploidy_calls(x, y),
                _ => SexKaryotype::Ambiguous,
            };
            SexImputation {
                s: s.clone(),
                f_stat,
                n_called_x,
                chr20_mean_dp,
                chrx_ploidy,
                chry_ploidy,
                x_ploidy,
                y_ploidy,
                sex_karyotype,
            }
        })
        .collect();

    let globals = SexGlobals {
        params: params.clone(),
        ploidy_cutoffs: cutoffs,
        n_cutoff_samples_xx: n_xx,
        n_cutoff_samples_xy: n_xy,
    };
    Ok((rows, globals))
}

/// Run the sex-inference stage
///
/// Ploidy cutoffs are derived only from samples passing the sex-independent hard filters.
///
pub fn run_sex_inference(
    shared: &SharedSettings,
    settings: &SexInferenceSettings,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let hard_filters: Table<SampleHardFilters, HardFilterGlobals> =
        layout.read(&Resource::HardFiltersNoSex)?;
    let cutoff_samples = hard_filters
        .rows()
        .iter()
        .filter(|x| !x.hard_filtered)
        .map(|x| x.s.clone())
        .collect::<HashSet<_>>();
    info!(
        "Deriving sex ploidy cutoffs from {} samples passing sex-independent hard filters",
        cutoff_samples.len().separate_with_commas()
    );

    let matrix = read_genotype_matrix(
        Utf8Path::new(&settings.vcf_filename),
        layout.record_limit(),
    )?;
    let coverage = read_coverage_input(&layout, &settings.coverage)?;

    let (rows, globals) = impute_sex(
        &matrix,
        &coverage,
        &cutoff_samples,
        &settings.params(),
        &settings.overrides(),
    )?;

    let mut stats = SexInferenceStats {
        sample_count: rows.len(),
        cutoff_sample_count: globals.n_cutoff_samples_xx + globals.n_cutoff_samples_xy,
        ..Default::default()
    };
    for row in rows.iter() {
        *stats
            .karyotype_counts
            .entry(row.sex_karyotype.to_string())
            .or_insert(0) += 1;
    }
    log_category_counts("Samples with sex karyotype", &stats.karyotype_counts);

    let table = Table::new(globals, rows)?;
    layout.write(&Resource::SexInference, &table, shared.overwrite)?;
    write_run_stats(shared, "sex_inference", &stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype_matrix::{Call, GenotypeEntry, VariantRow};
    use crate::locus::{Locus, VariantKey};
    use approx::assert_abs_diff_eq;

    fn test_cutoffs() -> PloidyCutoffs {
        PloidyCutoffs {
            upper_x: 1.3,
            lower_xx: 1.7,
            upper_xx: 2.3,
            lower_xxx: 2.6,
            lower_y: 0.3,
            upper_y: 1.3,
            lower_yy: 1.6,
        }
    }

    #[test]
    fn test_karyotype_calls() {
        let c = test_cutoffs();
        let call = |x: f64, y: f64| {
            SexKaryotype::from_ploidy_calls(call_x_ploidy(x, &c), call_y_ploidy(y, &c))
        };
        assert_eq!(call(2.0, 0.05), SexKaryotype::XX);
        assert_eq!(call(1.0, 1.0), SexKaryotype::XY);
        assert_eq!(call(1.0, 0.05), SexKaryotype::X0);
        assert_eq!(call(2.0, 1.0), SexKaryotype::XXY);
        assert_eq!(call(1.0, 2.0), SexKaryotype::XYY);
        assert_eq!(call(3.0, 0.0), SexKaryotype::XXX);
        assert_eq!(call(1.5, 0.0), SexKaryotype::Ambiguous);
        assert_eq!(call(1.0, 1.45), SexKaryotype::Ambiguous);
        assert!(SexKaryotype::XXY.is_aneuploid());
        assert!(!SexKaryotype::Ambiguous.is_aneuploid());
        assert_eq!(SexKaryotype::Ambiguous.to_string(), "ambiguous");
    }

    #[test]
    fn test_ploidy_cutoffs() {
        let samples = vec![
            (0.0, 1.9, 0.0),
            (0.1, 2.1, 0.02),
            (0.9, 0.9, 1.0),
            (1.0, 1.1, 0.9),
        ];
        let settings = SexImputationParams::default();
        let (cutoffs, n_xx, n_xy) =
            get_ploidy_cutoffs(&samples, &settings, &PloidyCutoffOverrides::default()).unwrap();
        assert_eq!((n_xx, n_xy), (2, 2));
        assert_abs_diff_eq!(cutoffs.upper_x, 1.0 + 5.0 * 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(cutoffs.lower_xxx, 2.0 + 6.0 * 0.1, epsilon = 1e-9);

        let overrides = PloidyCutoffOverrides {
            upper_x: Some(1.2),
            ..Default::default()
        };
        let (cutoffs, _, _) = get_ploidy_cutoffs(&samples, &settings, &overrides).unwrap();
        assert_eq!(cutoffs.upper_x, 1.2);

        assert!(
            get_ploidy_cutoffs(&samples[..2], &settings, &PloidyCutoffOverrides::default())
                .is_err()
        );
    }

    #[test]
    fn test_chrx_f_stat() {
        let het = Some(Call::Diploid(0, 1));
        let hom = Some(Call::Diploid(1, 1));
        let reference = Some(Call::Diploid(0, 0));
        let gt_entry = |gt| GenotypeEntry {
            gt,
            ..Default::default()
        };
        let rows = (0..4)
            .map(|i| VariantRow {
                key: VariantKey::new(
                    Locus::new("chrX", 5_000_000 + i),
                    vec!["A".to_string(), "G".to_string()],
                ),
                a_index: 1,
                was_split: false,
                entries: vec![
                    gt_entry(het),
                    gt_entry(if i % 2 == 0 { hom } else { reference }),
                ],
            })
            .collect();
        let matrix = GenotypeMatrix {
            samples: vec!["female".to_string(), "male".to_string()],
            rows,
        };
        let f = compute_chrx_f_stat(&matrix, 0.001);
        assert!(f[0].0.unwrap() < 0.0);
        assert!(f[1].0.unwrap() > 0.5);
        assert_eq!(f[1].1, 4);
    }
}
