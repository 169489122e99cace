use clap::Args;
use simple_error::{SimpleResult, bail};

use super::defaults::{DOWNSAMPLING_SEED, DOWNSAMPLINGS, POPS_TO_REMOVE_FOR_POPMAX};
use super::shared::{AdjSettings, validate_adj_settings};
use super::utils::check_required_filename;
use crate::freq::validate_subsets;

#[derive(Args)]
pub struct GenerateFreqSettings {
    /// Genotypes of all samples, in VCF or BCF format
    #[arg(long = "vcf", value_name = "FILE")]
    pub vcf_filename: String,

    /// Comma-separated list of sample subsets to compute frequencies for
    ///
    /// When given, only members of the listed subsets are aggregated and every frequency entry is
    /// labeled with the subset. Subsets storing ancestry as subpopulation (hgdp, tgp) can't be
    /// combined with other subsets.
    ///
    #[arg(long, value_delimiter = ',')]
    pub subsets: Vec<String>,

    /// Comma-separated list of downsampling sizes
    #[arg(long, value_delimiter = ',', default_values_t = DOWNSAMPLINGS)]
    pub downsamplings: Vec<u32>,

    /// Skip all downsampling frequency entries
    #[arg(long)]
    pub disable_downsampling: bool,

    /// Comma-separated list of populations excluded from popmax and population FAF
    #[arg(long, value_delimiter = ',', default_values_t = POPS_TO_REMOVE_FOR_POPMAX.map(String::from))]
    pub pops_to_remove_for_popmax: Vec<String>,

    /// Random seed used to order samples for downsampling
    #[arg(long, default_value_t = DOWNSAMPLING_SEED)]
    pub seed: u64,

    #[command(flatten)]
    pub adj: AdjSettings,
}

pub fn validate_and_fix_generate_freq_settings(
    mut settings: GenerateFreqSettings,
) -> SimpleResult<GenerateFreqSettings> {
    check_required_filename(&settings.vcf_filename, "genotype")?;
    validate_subsets(&settings.subsets)?;
    settings.subsets.sort();
    settings.subsets.dedup();

    if settings.downsamplings.contains(&0) {
        bail!("--downsamplings values must be greater than 0");
    }
    if settings.disable_downsampling {
        settings.downsamplings.clear();
    }
    settings.downsamplings.sort();
    settings.downsamplings.dedup();

    settings.pops_to_remove_for_popmax.sort();
    settings.pops_to_remove_for_popmax.dedup();
    validate_adj_settings(&settings.adj)?;

    Ok(settings)
}
