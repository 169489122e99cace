use clap::Args;
use simple_error::{SimpleResult, bail};

use super::defaults::{
    ANCESTRY_SEED, LD_WINDOW_BP, SUBPOP_LD_R2, SUBPOP_MIN_AF, SUBPOP_MIN_CALLRATE,
    SUBPOP_MIN_HWE_PVALUE, SUBPOP_MIN_INBREEDING_COEFF, SUBPOP_N_PCS,
};
use super::shared::{AdjSettings, validate_adj_settings};
use super::utils::{check_optional_filename, check_proportion, check_stage_filename};
use crate::sample_qc::subpop::SubpopQcParams;

#[derive(Args)]
pub struct SubpopAnalysisSettings {
    /// Run PCA within the population given by --pop
    #[arg(long)]
    pub run_subpop_pca: bool,

    /// Join the population PCA scores with project subpopulation labels
    #[arg(long)]
    pub annotate_subpop_meta: bool,

    /// Inferred population to analyze
    #[arg(long)]
    pub pop: String,

    /// Dense genotypes of the subpopulation QC sites, in VCF or BCF format
    #[arg(long = "vcf", value_name = "FILE")]
    pub vcf_filename: Option<String>,

    /// Regions excluded from the QC sites in BED format, typically low-complexity regions
    #[arg(long = "exclude-regions", value_name = "FILE")]
    pub exclude_regions_filename: Option<String>,

    /// Samples to exclude from the analysis, one sample id per line
    #[arg(long = "outliers", value_name = "FILE")]
    pub outliers_filename: Option<String>,

    /// Keep only variants with a release popmax AF above this value, read from the frequency table
    #[arg(long)]
    pub min_popmax_af: Option<f64>,

    /// Minimum population alt allele frequency of a QC site
    #[arg(long, default_value_t = SUBPOP_MIN_AF)]
    pub min_af: f64,

    /// Minimum population adj call rate of a QC site
    #[arg(long, default_value_t = SUBPOP_MIN_CALLRATE)]
    pub min_callrate: f64,

    /// Minimum site inbreeding coefficient of a QC site
    #[arg(long, default_value_t = SUBPOP_MIN_INBREEDING_COEFF)]
    pub min_inbreeding_coeff: f64,

    /// Minimum Hardy-Weinberg equilibrium p-value of a QC site
    #[arg(long, default_value_t = SUBPOP_MIN_HWE_PVALUE)]
    pub min_hwe_pvalue: f64,

    /// LD pruning squared correlation threshold
    #[arg(long, default_value_t = SUBPOP_LD_R2)]
    pub ld_r2: f64,

    /// Skip LD pruning
    #[arg(long)]
    pub no_ld_prune: bool,

    /// LD pruning window size in bases
    #[arg(long, default_value_t = LD_WINDOW_BP)]
    pub ld_window_bp: i64,

    /// Include unreleasable samples
    #[arg(long)]
    pub include_unreleasable_samples: bool,

    /// Restrict to high quality samples
    #[arg(long)]
    pub high_quality: bool,

    /// Number of principal components to compute
    #[arg(long, default_value_t = SUBPOP_N_PCS)]
    pub n_pcs: usize,

    /// Random seed used by randomized PCA
    #[arg(long, default_value_t = ANCESTRY_SEED)]
    pub seed: u64,

    #[command(flatten)]
    pub adj: AdjSettings,
}

impl SubpopAnalysisSettings {
    pub fn qc_params(&self) -> SubpopQcParams {
        SubpopQcParams {
            min_af: self.min_af,
            min_callrate: self.min_callrate,
            min_inbreeding_coeff: self.min_inbreeding_coeff,
            min_hwe_pvalue: self.min_hwe_pvalue,
            ld_r2: (!self.no_ld_prune).then_some(self.ld_r2),
            ld_window_bp: self.ld_window_bp,
            adj_cutoffs: self.adj.cutoffs(),
        }
    }
}

pub fn validate_and_fix_subpop_analysis_settings(
    settings: SubpopAnalysisSettings,
) -> SimpleResult<SubpopAnalysisSettings> {
    if !(settings.run_subpop_pca || settings.annotate_subpop_meta) {
        bail!("At least one of --run-subpop-pca or --annotate-subpop-meta must be specified");
    }
    if settings.pop.is_empty() {
        bail!("--pop must not be empty");
    }

    if settings.run_subpop_pca {
        check_stage_filename(
            settings.vcf_filename.as_ref(),
            "genotype",
            "--vcf",
            "--run-subpop-pca",
        )?;
        check_optional_filename(settings.exclude_regions_filename.as_ref(), "excluded regions")?;
        check_optional_filename(settings.outliers_filename.as_ref(), "outlier samples")?;
    }

    if let Some(x) = settings.min_popmax_af {
        check_proportion(x, "--min-popmax-af")?;
    }
    check_proportion(settings.min_af, "--min-af")?;
    check_proportion(settings.min_callrate, "--min-callrate")?;
    check_proportion(settings.min_hwe_pvalue, "--min-hwe-pvalue")?;
    check_proportion(settings.ld_r2, "--ld-r2")?;
    if settings.ld_window_bp <= 0 {
        bail!("--ld-window-bp must be positive, found {}", settings.ld_window_bp);
    }
    if settings.n_pcs == 0 {
        bail!("--n-pcs must be positive");
    }
    validate_adj_settings(&settings.adj)?;

    Ok(settings)
}
