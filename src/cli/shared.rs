use camino::Utf8PathBuf;
use clap::Args;
use const_format::concatcp;
use simple_error::{SimpleResult, bail};

use super::defaults::{
    ADJ_MIN_DP, ADJ_MIN_GQ, ADJ_MIN_HAPLOID_DP, ADJ_MIN_HET_AB, DEFAULT_PIPELINE_VERSION,
};
use super::utils::check_required_filename;
use crate::genotype_matrix::AdjCutoffs;
use crate::resources::ResourceLayout;

#[derive(Args)]
pub struct SharedSettings {
    /// Number of threads to use. Defaults to all logical cpus detected.
    #[arg(long = "threads", global = true, value_name = "THREAD_COUNT")]
    thread_count_option: Option<usize>,

    /// This value will be filled in by thread_count_option
    #[arg(hide = true, default_value_t = 0)]
    pub thread_count: usize,

    /// Root directory for all pipeline output
    ///
    /// Each pipeline version writes to its own subdirectory under this root, and every stage reads
    /// its upstream inputs from the same versioned subdirectory.
    ///
    #[arg(long, global = true, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_output"))]
    pub output_root: Utf8PathBuf,

    /// Pipeline version label used to namespace all stage outputs
    #[arg(long, global = true, default_value = DEFAULT_PIPELINE_VERSION)]
    pub pipeline_version: String,

    /// Run on a reduced test dataset
    ///
    /// Only the first records of each input variant file are read, and all outputs are written to
    /// separate test paths. Downstream stages run with this flag read only the test outputs of
    /// upstream stages.
    ///
    #[arg(long, global = true)]
    pub test: bool,

    /// Overwrite existing stage outputs
    #[arg(long, global = true)]
    pub overwrite: bool,

    /// Turn on extra debug logging
    ///
    /// This option enables extra logging intended for debugging only. It is highly
    /// recommended (but not required) to set --threads to 1 when this is enabled.
    ///
    #[arg(long, global = true)]
    pub debug: bool,

    /// Slack channel to notify when the stage completes
    #[arg(long, global = true, value_name = "CHANNEL")]
    pub slack_channel: Option<String>,
}

impl SharedSettings {
    pub fn resource_layout(&self) -> ResourceLayout {
        ResourceLayout::new(&self.output_root, &self.pipeline_version, self.test)
    }
}

pub fn validate_and_fix_shared_settings(
    mut settings: SharedSettings,
) -> SimpleResult<SharedSettings> {
    settings.thread_count = match settings.thread_count_option {
        Some(count) => {
            if count == 0 {
                bail!("--threads argument must be greater than 0");
            }
            count
        }
        None => num_cpus::get(),
    };

    if settings.pipeline_version.is_empty() {
        bail!("--pipeline-version must not be empty");
    }
    if settings.pipeline_version.contains('/') {
        bail!(
            "--pipeline-version must not contain a path separator: '{}'",
            settings.pipeline_version
        );
    }

    Ok(settings)
}

/// Genotype quality cutoffs shared by every stage computing the adj genotype flag
///
#[derive(Args)]
pub struct AdjSettings {
    /// Minimum genotype quality of an adj genotype
    #[arg(long, default_value_t = ADJ_MIN_GQ)]
    pub adj_min_gq: i32,

    /// Minimum depth of an adj diploid genotype
    #[arg(long, default_value_t = ADJ_MIN_DP)]
    pub adj_min_dp: i32,

    /// Minimum depth of an adj haploid genotype
    #[arg(long, default_value_t = ADJ_MIN_HAPLOID_DP)]
    pub adj_min_haploid_dp: i32,

    /// Minimum alt allele balance of an adj heterozygous genotype
    #[arg(long, default_value_t = ADJ_MIN_HET_AB)]
    pub adj_min_het_ab: f64,
}

impl AdjSettings {
    pub fn cutoffs(&self) -> AdjCutoffs {
        AdjCutoffs {
            min_gq: self.adj_min_gq,
            min_dp: self.adj_min_dp,
            min_haploid_dp: self.adj_min_haploid_dp,
            min_het_ab: self.adj_min_het_ab,
        }
    }
}

pub fn validate_adj_settings(settings: &AdjSettings) -> SimpleResult<()> {
    if settings.adj_min_gq < 0 || settings.adj_min_dp < 0 || settings.adj_min_haploid_dp < 0 {
        bail!("adj genotype cutoffs must not be negative");
    }
    if !(0.0..=1.0).contains(&settings.adj_min_het_ab) {
        bail!(
            "--adj-min-het-ab must be in [0,1], found {}",
            settings.adj_min_het_ab
        );
    }
    Ok(())
}

/// Source of the per-sample chr20, chrX and chrY mean coverage
///
#[derive(Args)]
pub struct CoverageSourceSettings {
    /// Per-sample mean coverage in tab-separated format
    ///
    /// Required columns are: s, chr20_mean_dp, chrx_mean_dp, chry_mean_dp.
    ///
    #[arg(long = "coverage", value_name = "FILE")]
    pub coverage_filename: Option<String>,

    /// Per-interval per-sample coverage in tab-separated format, used in place of --coverage
    ///
    /// Required columns are: contig, start, end, s, sum_dp, fraction_over_dp_0. Intervals are
    /// zero-indexed half-open.
    ///
    #[arg(
        long = "interval-coverage",
        value_name = "FILE",
        conflicts_with = "coverage_filename"
    )]
    pub interval_coverage_filename: Option<String>,

    /// Summarize interval coverage over the intervals passing the interval-qc stage only
    #[arg(long, requires = "interval_coverage_filename")]
    pub use_interval_qc_pass: bool,
}

pub fn validate_coverage_source_settings(
    settings: &CoverageSourceSettings,
    stage_flag: &str,
) -> SimpleResult<()> {
    match (
        settings.coverage_filename.as_ref(),
        settings.interval_coverage_filename.as_ref(),
    ) {
        (Some(filename), None) => check_required_filename(filename, "coverage"),
        (None, Some(filename)) => check_required_filename(filename, "interval coverage"),
        _ => bail!("One of --coverage or --interval-coverage is required with {stage_flag}"),
    }
}
