use clap::Args;
use simple_error::{SimpleResult, bail};

use super::defaults::{ANEUPLOIDY_SD, F_STAT_CUTOFF, NORMAL_PLOIDY_SD, SEX_AAF_THRESHOLD};
use super::shared::{CoverageSourceSettings, validate_coverage_source_settings};
use super::utils::{check_proportion, check_required_filename};
use crate::sample_qc::sex_inference::{PloidyCutoffOverrides, SexImputationParams};

#[derive(Args)]
pub struct SexInferenceSettings {
    /// Impute sex karyotypes for all samples
    #[arg(long)]
    pub impute_sex: bool,

    /// Genotypes including chrX sites, in VCF or BCF format
    #[arg(long = "vcf", value_name = "FILE")]
    pub vcf_filename: String,

    #[command(flatten)]
    pub coverage: CoverageSourceSettings,

    /// Samples with chrX F-stat below this value are treated as XX when deriving ploidy cutoffs
    #[arg(long, default_value_t = F_STAT_CUTOFF)]
    pub f_stat_cutoff: f64,

    /// Minimum alt allele frequency of chrX sites used in the F-stat computation
    #[arg(long, default_value_t = SEX_AAF_THRESHOLD)]
    pub aaf_threshold: f64,

    /// Number of standard deviations defining the normal ploidy ranges
    #[arg(long, default_value_t = NORMAL_PLOIDY_SD)]
    pub normal_ploidy_sd: f64,

    /// Number of standard deviations defining the aneuploid ploidy ranges
    #[arg(long, default_value_t = ANEUPLOIDY_SD)]
    pub aneuploidy_sd: f64,

    /// Override the derived upper cutoff for single X ploidy
    #[arg(long)]
    pub upper_x_cutoff: Option<f64>,

    /// Override the derived lower cutoff for XX ploidy
    #[arg(long)]
    pub lower_xx_cutoff: Option<f64>,

    /// Override the derived upper cutoff for XX ploidy
    #[arg(long)]
    pub upper_xx_cutoff: Option<f64>,

    /// Override the derived lower cutoff for XXX ploidy
    #[arg(long)]
    pub lower_xxx_cutoff: Option<f64>,

    /// Override the derived lower cutoff for single Y ploidy
    #[arg(long)]
    pub lower_y_cutoff: Option<f64>,

    /// Override the derived upper cutoff for single Y ploidy
    #[arg(long)]
    pub upper_y_cutoff: Option<f64>,

    /// Override the derived lower cutoff for YY ploidy
    #[arg(long)]
    pub lower_yy_cutoff: Option<f64>,
}

impl SexInferenceSettings {
    pub fn params(&self) -> SexImputationParams {
        SexImputationParams {
            f_stat_cutoff: self.f_stat_cutoff,
            aaf_threshold: self.aaf_threshold,
            normal_ploidy_sd: self.normal_ploidy_sd,
            aneuploidy_sd: self.aneuploidy_sd,
        }
    }

    pub fn overrides(&self) -> PloidyCutoffOverrides {
        PloidyCutoffOverrides {
            upper_x: self.upper_x_cutoff,
            lower_xx: self.lower_xx_cutoff,
            upper_xx: self.upper_xx_cutoff,
            lower_xxx: self.lower_xxx_cutoff,
            lower_y: self.lower_y_cutoff,
            upper_y: self.upper_y_cutoff,
            lower_yy: self.lower_yy_cutoff,
        }
    }
}

pub fn validate_and_fix_sex_inference_settings(
    settings: SexInferenceSettings,
) -> SimpleResult<SexInferenceSettings> {
    if !settings.impute_sex {
        bail!("--impute-sex must be specified");
    }
    check_required_filename(&settings.vcf_filename, "genotype")?;
    validate_coverage_source_settings(&settings.coverage, "--impute-sex")?;
    check_proportion(settings.aaf_threshold, "--aaf-threshold")?;
    if settings.normal_ploidy_sd <= 0.0 || settings.aneuploidy_sd <= 0.0 {
        bail!("Ploidy standard deviation multipliers must be positive");
    }
    if settings.aneuploidy_sd < settings.normal_ploidy_sd {
        bail!(
            "--aneuploidy-sd ({}) must not be less than --normal-ploidy-sd ({})",
            settings.aneuploidy_sd,
            settings.normal_ploidy_sd
        );
    }
    Ok(settings)
}
