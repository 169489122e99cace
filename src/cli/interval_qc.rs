use clap::Args;
use simple_error::{SimpleResult, bail};

use super::defaults::{
    AUTOSOME_PAR_XX_COV, MEAN_DP_THRESHOLDS, MEAN_FRACTION_OVER_DP_0, PROP_SAMPLES_OVER_COV,
    XY_NONPAR_COV,
};
use super::utils::{check_proportion, check_required_filename};
use crate::sample_qc::interval_qc::IntervalPassCriteria;

#[derive(Args)]
pub struct IntervalQcSettings {
    /// Per-interval per-sample coverage in tab-separated format
    ///
    /// Required columns are: contig, start, end, s, sum_dp, fraction_over_dp_0. Intervals are
    /// zero-indexed half-open.
    ///
    #[arg(long = "interval-coverage", value_name = "FILE")]
    pub interval_coverage_filename: String,

    /// Mean depth thresholds for the proportion of samples over each depth
    #[arg(long, value_delimiter = ',', default_values_t = MEAN_DP_THRESHOLDS)]
    pub mean_dp_thresholds: Vec<u32>,

    /// Pass intervals by the proportion of samples over a depth, instead of the mean fraction of
    /// bases over depth 0
    #[arg(long)]
    pub by_prop_samples_over_cov: bool,

    /// Intervals pass when the mean fraction of bases over depth 0 exceeds this value
    #[arg(long, default_value_t = MEAN_FRACTION_OVER_DP_0)]
    pub mean_fraction_over_dp_0: f64,

    /// Depth threshold for autosomes, PAR and XX samples on chrX, with --by-prop-samples-over-cov
    #[arg(long, default_value_t = AUTOSOME_PAR_XX_COV)]
    pub autosome_par_xx_cov: u32,

    /// Depth threshold for XY samples on sex chromosome non-PAR, with --by-prop-samples-over-cov
    #[arg(long, default_value_t = XY_NONPAR_COV)]
    pub xy_nonpar_cov: u32,

    /// Intervals pass when the proportion of samples over the depth threshold exceeds this value
    #[arg(long, default_value_t = PROP_SAMPLES_OVER_COV)]
    pub prop_samples: f64,
}

impl IntervalQcSettings {
    pub fn pass_criteria(&self) -> IntervalPassCriteria {
        if self.by_prop_samples_over_cov {
            IntervalPassCriteria::PropSamplesOverCov {
                autosome_par_xx_cov: self.autosome_par_xx_cov,
                xy_nonpar_cov: self.xy_nonpar_cov,
                prop_samples: self.prop_samples,
            }
        } else {
            IntervalPassCriteria::MeanFractionOverDp0 {
                cutoff: self.mean_fraction_over_dp_0,
            }
        }
    }
}

pub fn validate_and_fix_interval_qc_settings(
    mut settings: IntervalQcSettings,
) -> SimpleResult<IntervalQcSettings> {
    check_required_filename(&settings.interval_coverage_filename, "interval coverage")?;
    check_proportion(settings.mean_fraction_over_dp_0, "--mean-fraction-over-dp-0")?;
    check_proportion(settings.prop_samples, "--prop-samples")?;

    settings.mean_dp_thresholds.sort();
    settings.mean_dp_thresholds.dedup();
    if settings.by_prop_samples_over_cov {
        for (cov, option_name) in [
            (settings.autosome_par_xx_cov, "--autosome-par-xx-cov"),
            (settings.xy_nonpar_cov, "--xy-nonpar-cov"),
        ] {
            if !settings.mean_dp_thresholds.contains(&cov) {
                bail!("{option_name} value {cov} must be one of the --mean-dp-thresholds");
            }
        }
    }
    Ok(settings)
}
