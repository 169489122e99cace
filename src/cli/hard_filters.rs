use clap::Args;
use simple_error::{SimpleResult, bail};

use super::defaults::{
    MAX_CHIMERA, MAX_CONTAMINATION, MAX_N_SINGLETON, MAX_R_HET_HOM_VAR, MIN_BASES_DP_OVER_1,
    MIN_BASES_DP_OVER_20,
};
use super::shared::{
    AdjSettings, CoverageSourceSettings, validate_adj_settings, validate_coverage_source_settings,
};
use super::utils::{check_optional_filename, check_proportion, check_stage_filename};
use crate::sample_qc::hard_filters::HardFilterCutoffs;

#[derive(Args)]
pub struct HardFiltersSettings {
    /// Compute per-sample QC metrics from the input genotypes
    #[arg(long)]
    pub sample_qc: bool,

    /// Compute sample hard filters
    ///
    /// Without --include-sex-filter this is the first, sex-independent, hard filter pass. Its
    /// output defines the samples used to derive sex ploidy cutoffs in the sex-inference stage.
    ///
    #[arg(long)]
    pub compute_hard_filters: bool,

    /// Add the sex karyotype filters (ambiguous sex and sex aneuploidy)
    ///
    /// This requires the sex-inference stage to have been run on the first hard filter pass.
    ///
    #[arg(long, requires = "compute_hard_filters")]
    pub include_sex_filter: bool,

    /// Genotypes of all samples on the QC sites, in VCF or BCF format
    #[arg(long = "vcf", value_name = "FILE")]
    pub vcf_filename: Option<String>,

    /// Regions excluded from sample QC metrics, in BED format, typically telomeres and centromeres
    #[arg(long = "exclude-regions", value_name = "FILE")]
    pub exclude_regions_filename: Option<String>,

    /// Per-sample alignment metrics in tab-separated format
    ///
    /// Required columns are: s, contam_rate, chimeras_rate, bases_dp_over_1, bases_dp_over_20.
    /// Rates are proportions.
    ///
    #[arg(long = "bam-metrics", value_name = "FILE")]
    pub bam_metrics_filename: Option<String>,

    #[command(flatten)]
    pub coverage: CoverageSourceSettings,

    /// List of samples failing fingerprinting, one sample id per line
    #[arg(long = "fingerprint-failures", value_name = "FILE")]
    pub fingerprint_failures_filename: Option<String>,

    /// Filter samples with more singletons than this value
    #[arg(long, default_value_t = MAX_N_SINGLETON)]
    pub max_n_singleton: f64,

    /// Filter samples with a het/hom-var ratio above this value
    #[arg(long, default_value_t = MAX_R_HET_HOM_VAR)]
    pub max_r_het_hom_var: f64,

    /// Filter samples with fewer bases at depth 1 or greater
    #[arg(long, default_value_t = MIN_BASES_DP_OVER_1)]
    pub min_bases_dp_over_1: f64,

    /// Filter samples with fewer bases at depth 20 or greater
    #[arg(long, default_value_t = MIN_BASES_DP_OVER_20)]
    pub min_bases_dp_over_20: f64,

    /// Filter samples with a contamination rate above this proportion
    #[arg(long, default_value_t = MAX_CONTAMINATION)]
    pub max_contamination: f64,

    /// Filter samples with a chimeric read rate above this proportion
    #[arg(long, default_value_t = MAX_CHIMERA)]
    pub max_chimera: f64,

    /// Filter samples with chr20 mean depth below this value
    #[arg(long)]
    pub min_cov: Option<f64>,

    /// Filter samples with an adj call rate below this value
    #[arg(long)]
    pub min_adj_callrate: Option<f64>,

    #[command(flatten)]
    pub adj: AdjSettings,
}

impl HardFiltersSettings {
    pub fn cutoffs(&self) -> HardFilterCutoffs {
        HardFilterCutoffs {
            max_n_singleton: self.max_n_singleton,
            max_r_het_hom_var: self.max_r_het_hom_var,
            min_bases_dp_over_1: self.min_bases_dp_over_1,
            min_bases_dp_over_20: self.min_bases_dp_over_20,
            max_contamination: self.max_contamination,
            max_chimera: self.max_chimera,
            min_cov: self.min_cov,
            min_adj_callrate: self.min_adj_callrate,
        }
    }
}

pub fn validate_and_fix_hard_filters_settings(
    settings: HardFiltersSettings,
) -> SimpleResult<HardFiltersSettings> {
    if !(settings.sample_qc || settings.compute_hard_filters) {
        bail!("At least one of --sample-qc or --compute-hard-filters must be specified");
    }

    if settings.sample_qc {
        check_stage_filename(
            settings.vcf_filename.as_ref(),
            "genotype",
            "--vcf",
            "--sample-qc",
        )?;
        check_optional_filename(
            settings.exclude_regions_filename.as_ref(),
            "excluded regions",
        )?;
    }

    if settings.compute_hard_filters {
        check_stage_filename(
            settings.bam_metrics_filename.as_ref(),
            "alignment metrics",
            "--bam-metrics",
            "--compute-hard-filters",
        )?;
        validate_coverage_source_settings(&settings.coverage, "--compute-hard-filters")?;
        check_optional_filename(
            settings.fingerprint_failures_filename.as_ref(),
            "fingerprint failures",
        )?;
    }

    // Rates are proportions, a value above 1 is most likely a percentage
    check_proportion(settings.max_contamination, "--max-contamination")?;
    check_proportion(settings.max_chimera, "--max-chimera")?;
    if let Some(x) = settings.min_adj_callrate {
        check_proportion(x, "--min-adj-callrate")?;
    }
    if let Some(x) = settings.min_cov {
        if x < 0.0 {
            bail!("--min-cov must not be negative, found {x}");
        }
    }
    validate_adj_settings(&settings.adj)?;

    Ok(settings)
}
