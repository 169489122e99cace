use clap::Args;
use simple_error::{SimpleResult, bail};

use super::defaults::*;
use super::utils::{check_optional_filename, check_range, check_stage_filename};
use crate::sample_qc::relatedness::RelationshipCutoffs;

#[derive(Args)]
pub struct RelatednessSettings {
    /// Print the command line for the external pairwise relatedness engine and exit
    #[arg(
        long,
        conflicts_with_all = ["prepare_inputs", "create_relatedness_table", "compute_related_samples_to_drop"]
    )]
    pub print_cuking_command: bool,

    /// Write the dense QC genotype matrix in the input format of the pairwise relatedness engine
    #[arg(long)]
    pub prepare_inputs: bool,

    /// Read pairwise kinship results and classify every sample pair
    #[arg(long)]
    pub create_relatedness_table: bool,

    /// Rank samples and compute the set of related samples to drop
    #[arg(long)]
    pub compute_related_samples_to_drop: bool,

    /// Dense QC genotypes (biallelic, common, LD-pruned sites) in VCF or BCF format
    #[arg(long = "vcf", value_name = "FILE")]
    pub vcf_filename: Option<String>,

    /// Pairwise relatedness engine output in tab-separated format
    ///
    /// Required columns are: i, j, kin, ibd0, ibd1, ibd2. Defaults to the output path given by
    /// --print-cuking-command.
    ///
    #[arg(long = "cuking-output", value_name = "FILE")]
    pub cuking_output_filename: Option<String>,

    /// Project sample metadata in tab-separated format, used to rank samples
    #[arg(long = "project-meta", value_name = "FILE")]
    pub project_meta_filename: Option<String>,

    /// Per-sample mean coverage in tab-separated format, used to rank samples
    #[arg(long = "coverage", value_name = "FILE")]
    pub coverage_filename: Option<String>,

    /// Kinship floor for pairs reported by the relatedness engine
    ///
    /// Defaults to --second-degree-min-kin, so that only second degree or closer pairs are
    /// emitted. A lower value keeps more distant pairs in the relatedness table as unrelated.
    ///
    #[arg(long)]
    pub min_emission_kinship: Option<f64>,

    /// Number of input splits per dimension used by the relatedness engine
    #[arg(long, default_value_t = CUKING_SPLIT_FACTOR)]
    pub cuking_split_factor: usize,

    /// Pairs with kinship below this value are unrelated
    #[arg(long, default_value_t = SECOND_DEGREE_MIN_KIN)]
    pub second_degree_min_kin: f64,

    /// Kinship range of first degree relatives, as 'lower,upper'
    #[arg(long, value_delimiter = ',', default_values_t = FIRST_DEGREE_KIN_THRESHOLDS)]
    pub first_degree_kin_thresholds: Vec<f64>,

    /// Maximum IBD0 of parent-child pairs and duplicates
    #[arg(long, default_value_t = IBD0_0_MAX)]
    pub ibd0_0_max: f64,

    /// IBD0 range of siblings, as 'lower,upper'
    #[arg(long, value_delimiter = ',', default_values_t = IBD0_25_THRESHOLDS)]
    pub ibd0_25_thresholds: Vec<f64>,

    /// IBD1 range of duplicates, as 'lower,upper'
    #[arg(long, value_delimiter = ',', default_values_t = IBD1_0_THRESHOLDS)]
    pub ibd1_0_thresholds: Vec<f64>,

    /// IBD1 range of siblings, as 'lower,upper'
    #[arg(long, value_delimiter = ',', default_values_t = IBD1_50_THRESHOLDS)]
    pub ibd1_50_thresholds: Vec<f64>,

    /// Minimum IBD1 of parent-child pairs
    #[arg(long, default_value_t = IBD1_100_MIN)]
    pub ibd1_100_min: f64,

    /// Maximum IBD2 of parent-child pairs
    #[arg(long, default_value_t = IBD2_0_MAX)]
    pub ibd2_0_max: f64,

    /// IBD2 range of siblings, as 'lower,upper'
    #[arg(long, value_delimiter = ',', default_values_t = IBD2_25_THRESHOLDS)]
    pub ibd2_25_thresholds: Vec<f64>,

    /// IBD2 range of duplicates, as 'lower,upper'
    #[arg(long, value_delimiter = ',', default_values_t = IBD2_100_THRESHOLDS)]
    pub ibd2_100_thresholds: Vec<f64>,

    /// This value will be filled in from the individual cutoff options
    #[arg(skip)]
    pub relationship_cutoffs: RelationshipCutoffs,
}

pub fn validate_and_fix_relatedness_settings(
    mut settings: RelatednessSettings,
) -> SimpleResult<RelatednessSettings> {
    if !(settings.print_cuking_command
        || settings.prepare_inputs
        || settings.create_relatedness_table
        || settings.compute_related_samples_to_drop)
    {
        bail!(
            "At least one of --print-cuking-command, --prepare-inputs, --create-relatedness-table or --compute-related-samples-to-drop must be specified"
        );
    }

    if settings.prepare_inputs {
        check_stage_filename(
            settings.vcf_filename.as_ref(),
            "genotype",
            "--vcf",
            "--prepare-inputs",
        )?;
    }
    if settings.create_relatedness_table {
        check_optional_filename(
            settings.cuking_output_filename.as_ref(),
            "relatedness engine output",
        )?;
    }
    if settings.compute_related_samples_to_drop {
        check_stage_filename(
            settings.project_meta_filename.as_ref(),
            "project metadata",
            "--project-meta",
            "--compute-related-samples-to-drop",
        )?;
        check_stage_filename(
            settings.coverage_filename.as_ref(),
            "coverage",
            "--coverage",
            "--compute-related-samples-to-drop",
        )?;
    }
    if settings.cuking_split_factor == 0 {
        bail!("--cuking-split-factor must be greater than 0");
    }

    settings.relationship_cutoffs = RelationshipCutoffs {
        second_degree_min_kin: settings.second_degree_min_kin,
        first_degree_kin_thresholds: check_range(
            &settings.first_degree_kin_thresholds,
            "--first-degree-kin-thresholds",
        )?,
        ibd0_0_max: settings.ibd0_0_max,
        ibd0_25_thresholds: check_range(&settings.ibd0_25_thresholds, "--ibd0-25-thresholds")?,
        ibd1_0_thresholds: check_range(&settings.ibd1_0_thresholds, "--ibd1-0-thresholds")?,
        ibd1_50_thresholds: check_range(&settings.ibd1_50_thresholds, "--ibd1-50-thresholds")?,
        ibd1_100_min: settings.ibd1_100_min,
        ibd2_0_max: settings.ibd2_0_max,
        ibd2_25_thresholds: check_range(&settings.ibd2_25_thresholds, "--ibd2-25-thresholds")?,
        ibd2_100_thresholds: check_range(
            &settings.ibd2_100_thresholds,
            "--ibd2-100-thresholds",
        )?,
    };

    let (first_degree_min_kin, _) = settings.relationship_cutoffs.first_degree_kin_thresholds;
    if settings.second_degree_min_kin > first_degree_min_kin {
        bail!(
            "--second-degree-min-kin ({}) must not exceed the first degree kinship lower bound ({first_degree_min_kin})",
            settings.second_degree_min_kin
        );
    }
    let min_emission_kinship = *settings
        .min_emission_kinship
        .get_or_insert(settings.second_degree_min_kin);
    if min_emission_kinship > settings.second_degree_min_kin {
        bail!(
            "--min-emission-kinship ({min_emission_kinship}) must not exceed --second-degree-min-kin ({})",
            settings.second_degree_min_kin
        );
    }

    Ok(settings)
}
