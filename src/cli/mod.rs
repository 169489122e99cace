mod ancestry;
mod create_release;
mod defaults;
mod finalize_metadata;
mod generate_freq;
mod hard_filters;
mod interval_qc;
mod outlier_filtering;
mod relatedness;
mod sex_inference;
mod shared;
mod subpop_analysis;
mod utils;

use clap::{Parser, Subcommand};
use simple_error::SimpleResult;

use self::ancestry::validate_and_fix_ancestry_settings;
pub use self::ancestry::AncestrySettings;
use self::create_release::validate_and_fix_create_release_settings;
pub use self::create_release::CreateReleaseSettings;
use self::finalize_metadata::validate_and_fix_finalize_metadata_settings;
pub use self::finalize_metadata::FinalizeMetadataSettings;
use self::generate_freq::validate_and_fix_generate_freq_settings;
pub use self::generate_freq::GenerateFreqSettings;
use self::hard_filters::validate_and_fix_hard_filters_settings;
pub use self::hard_filters::HardFiltersSettings;
use self::interval_qc::validate_and_fix_interval_qc_settings;
pub use self::interval_qc::IntervalQcSettings;
use self::outlier_filtering::validate_and_fix_outlier_filtering_settings;
pub use self::outlier_filtering::OutlierFilteringSettings;
use self::relatedness::validate_and_fix_relatedness_settings;
pub use self::relatedness::RelatednessSettings;
use self::sex_inference::validate_and_fix_sex_inference_settings;
pub use self::sex_inference::SexInferenceSettings;
use self::shared::validate_and_fix_shared_settings;
pub use self::shared::{CoverageSourceSettings, SharedSettings};
use self::subpop_analysis::validate_and_fix_subpop_analysis_settings;
pub use self::subpop_analysis::SubpopAnalysisSettings;

#[derive(Subcommand)]
pub enum Commands {
    /// Compute per-sample QC metrics and sample hard filters
    HardFilters(HardFiltersSettings),

    /// Impute sample sex karyotypes from chrX/chrY coverage and chrX heterozygosity
    SexInference(SexInferenceSettings),

    /// Summarize interval coverage and flag high coverage calling intervals
    IntervalQc(IntervalQcSettings),

    /// Classify related sample pairs and select related samples to drop
    Relatedness(RelatednessSettings),

    /// Run PCA and assign population labels to all samples
    AssignAncestry(AncestrySettings),

    /// Flag per-population outliers on sample QC metrics
    OutlierFiltering(OutlierFilteringSettings),

    /// Run PCA within one population and annotate the scores with subpopulation labels
    SubpopAnalysis(SubpopAnalysisSettings),

    /// Join all sample QC results into the final sample metadata table
    FinalizeMetadata(FinalizeMetadataSettings),

    /// Compute stratified variant frequencies, FAF and popmax
    GenerateFreq(GenerateFreqSettings),

    /// Assemble release annotation tables and the dense release subset
    CreateRelease(CreateReleaseSettings),
}

impl Commands {
    /// Stage label used for logging and run statistics
    pub fn stage_name(&self) -> &'static str {
        match self {
            Commands::HardFilters(_) => "hard_filters",
            Commands::SexInference(_) => "sex_inference",
            Commands::IntervalQc(_) => "interval_qc",
            Commands::Relatedness(_) => "relatedness",
            Commands::AssignAncestry(_) => "assign_ancestry",
            Commands::OutlierFiltering(_) => "outlier_filtering",
            Commands::SubpopAnalysis(_) => "subpop_analysis",
            Commands::FinalizeMetadata(_) => "finalize_metadata",
            Commands::GenerateFreq(_) => "generate_freq",
            Commands::CreateRelease(_) => "create_release",
        }
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(propagate_version = true, rename_all = "kebab_case")]
pub struct Settings {
    #[command(flatten)]
    pub shared: SharedSettings,

    #[command(subcommand)]
    pub command: Commands,
}

/// Validate settings and update parameters that can't be processed by clap
///
/// All checks run before any input data is read.
///
pub fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    settings.shared = validate_and_fix_shared_settings(settings.shared)?;

    settings.command = match settings.command {
        Commands::HardFilters(x) => Commands::HardFilters(validate_and_fix_hard_filters_settings(x)?),
        Commands::SexInference(x) => {
            Commands::SexInference(validate_and_fix_sex_inference_settings(x)?)
        }
        Commands::IntervalQc(x) => {
            Commands::IntervalQc(validate_and_fix_interval_qc_settings(x)?)
        }
        Commands::Relatedness(x) => Commands::Relatedness(validate_and_fix_relatedness_settings(x)?),
        Commands::AssignAncestry(x) => {
            Commands::AssignAncestry(validate_and_fix_ancestry_settings(x)?)
        }
        Commands::OutlierFiltering(x) => {
            Commands::OutlierFiltering(validate_and_fix_outlier_filtering_settings(x)?)
        }
        Commands::SubpopAnalysis(x) => {
            Commands::SubpopAnalysis(validate_and_fix_subpop_analysis_settings(x)?)
        }
        Commands::FinalizeMetadata(x) => {
            Commands::FinalizeMetadata(validate_and_fix_finalize_metadata_settings(x)?)
        }
        Commands::GenerateFreq(x) => {
            Commands::GenerateFreq(validate_and_fix_generate_freq_settings(x)?)
        }
        Commands::CreateRelease(x) => {
            Commands::CreateRelease(validate_and_fix_create_release_settings(x)?)
        }
    };

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {}", msg);
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Settings::command().debug_assert()
    }

    #[test]
    fn test_mutually_exclusive_mislabel_limits() {
        let result = Settings::try_parse_from([
            "gnomad-qc",
            "assign-ancestry",
            "--assign-pops",
            "--max-number-mislabeled-training-samples",
            "5",
            "--max-proportion-mislabeled-training-samples",
            "0.1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_mislabel_limit() {
        let settings = Settings::try_parse_from([
            "gnomad-qc",
            "assign-ancestry",
            "--assign-pops",
            "--project-meta",
            "Cargo.toml",
        ])
        .unwrap();
        assert!(validate_and_fix_settings_impl(settings).is_err());
    }

    #[test]
    fn test_print_cuking_command_is_exclusive() {
        let result = Settings::try_parse_from([
            "gnomad-qc",
            "relatedness",
            "--print-cuking-command",
            "--prepare-inputs",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mixed_subpop_subsets_rejected() {
        let settings = Settings::try_parse_from([
            "gnomad-qc",
            "generate-freq",
            "--vcf",
            "Cargo.toml",
            "--subsets",
            "hgdp,non_cancer",
        ])
        .unwrap();
        assert!(validate_and_fix_settings_impl(settings).is_err());
    }

    #[test]
    fn test_duplicate_subsets_collapsed() {
        let settings = Settings::try_parse_from([
            "gnomad-qc",
            "generate-freq",
            "--vcf",
            "Cargo.toml",
            "--subsets",
            "hgdp,tgp,hgdp",
        ])
        .unwrap();
        let settings = validate_and_fix_settings_impl(settings).unwrap();
        let Commands::GenerateFreq(x) = settings.command else {
            panic!("unexpected command");
        };
        assert_eq!(x.subsets, vec!["hgdp".to_string(), "tgp".to_string()]);
    }

    #[test]
    fn test_emission_kinship_defaults_to_second_degree_cutoff() {
        let settings = Settings::try_parse_from([
            "gnomad-qc",
            "relatedness",
            "--print-cuking-command",
            "--second-degree-min-kin",
            "0.08",
        ])
        .unwrap();
        let settings = validate_and_fix_settings_impl(settings).unwrap();
        let Commands::Relatedness(x) = settings.command else {
            panic!("unexpected command");
        };
        assert_eq!(x.min_emission_kinship, Some(0.08));
    }

    #[test]
    fn test_coverage_sources_are_exclusive() {
        let result = Settings::try_parse_from([
            "gnomad-qc",
            "sex-inference",
            "--impute-sex",
            "--vcf",
            "Cargo.toml",
            "--coverage",
            "Cargo.toml",
            "--interval-coverage",
            "Cargo.toml",
        ]);
        assert!(result.is_err());

        let result = Settings::try_parse_from([
            "gnomad-qc",
            "sex-inference",
            "--impute-sex",
            "--vcf",
            "Cargo.toml",
            "--coverage",
            "Cargo.toml",
            "--use-interval-qc-pass",
        ]);
        assert!(result.is_err());

        let settings = Settings::try_parse_from([
            "gnomad-qc",
            "sex-inference",
            "--impute-sex",
            "--vcf",
            "Cargo.toml",
        ])
        .unwrap();
        assert!(validate_and_fix_settings_impl(settings).is_err());
    }

    #[test]
    fn test_interval_qc_cov_must_be_a_threshold() {
        let settings = Settings::try_parse_from([
            "gnomad-qc",
            "interval-qc",
            "--interval-coverage",
            "Cargo.toml",
            "--by-prop-samples-over-cov",
            "--mean-dp-thresholds",
            "10,20",
            "--xy-nonpar-cov",
            "15",
        ])
        .unwrap();
        assert!(validate_and_fix_settings_impl(settings).is_err());
    }

    #[test]
    fn test_subpop_analysis_requires_vcf() {
        let settings = Settings::try_parse_from([
            "gnomad-qc",
            "subpop-analysis",
            "--run-subpop-pca",
            "--pop",
            "eas",
        ])
        .unwrap();
        assert!(validate_and_fix_settings_impl(settings).is_err());

        let settings = Settings::try_parse_from([
            "gnomad-qc",
            "subpop-analysis",
            "--annotate-subpop-meta",
            "--pop",
            "eas",
            "--no-ld-prune",
        ])
        .unwrap();
        let settings = validate_and_fix_settings_impl(settings).unwrap();
        let Commands::SubpopAnalysis(x) = settings.command else {
            panic!("unexpected command");
        };
        assert_eq!(x.qc_params().ld_r2, None);
    }

    #[test]
    fn test_contamination_as_percentage_rejected() {
        let settings = Settings::try_parse_from([
            "gnomad-qc",
            "hard-filters",
            "--compute-hard-filters",
            "--bam-metrics",
            "Cargo.toml",
            "--coverage",
            "Cargo.toml",
            "--max-contamination",
            "5",
        ])
        .unwrap();
        assert!(validate_and_fix_settings_impl(settings).is_err());
    }
}
