use clap::Args;
use simple_error::{SimpleResult, bail};

use super::defaults::RELEASE_SUBSETS;
use super::shared::{AdjSettings, validate_adj_settings};
use super::utils::{check_optional_filename, check_stage_filename};
use crate::freq::validate_subsets;

#[derive(Args)]
pub struct CreateReleaseSettings {
    /// Assemble the per-variant release annotation table
    #[arg(long)]
    pub prepare_variant_annotations: bool,

    /// Assemble the per-sample annotation table of the release subset
    #[arg(long)]
    pub prepare_sample_annotations: bool,

    /// Materialize the dense genotype matrix of the release subset
    #[arg(long)]
    pub create_dense_subset: bool,

    /// Comma-separated list of subsets in the release
    #[arg(long, value_delimiter = ',', default_values_t = RELEASE_SUBSETS.map(String::from))]
    pub subsets: Vec<String>,

    /// Variant filtering model results in tab-separated format
    ///
    /// Required columns are: locus, alleles, filters, score. The filters column is a
    /// comma-separated list, empty for passing variants.
    ///
    #[arg(long = "filtering-model", value_name = "FILE")]
    pub filtering_model_filename: Option<String>,

    /// Allele-specific low quality flags in tab-separated format
    ///
    /// Required columns are: locus, alleles, as_lowqual.
    ///
    #[arg(long = "as-lowqual", value_name = "FILE")]
    pub as_lowqual_filename: Option<String>,

    /// Functional consequence annotations in tab-separated format
    ///
    /// Required columns are: locus, alleles, vep. The vep column holds one JSON document per variant.
    ///
    #[arg(long = "vep", value_name = "FILE")]
    pub vep_filename: Option<String>,

    /// Reference SNP identifiers in tab-separated format
    ///
    /// Required columns are: locus, alleles, rsid.
    ///
    #[arg(long = "dbsnp", value_name = "FILE")]
    pub dbsnp_filename: Option<String>,

    /// In silico predictor scores in tab-separated format
    ///
    /// Required columns are: locus, alleles, cadd_raw_score, cadd_phred, revel_score.
    ///
    #[arg(long = "in-silico", value_name = "FILE")]
    pub in_silico_filename: Option<String>,

    /// Low complexity regions in BED format
    #[arg(long = "lcr", value_name = "FILE")]
    pub lcr_filename: Option<String>,

    /// Segmental duplication regions in BED format
    #[arg(long = "segdup", value_name = "FILE")]
    pub segdup_filename: Option<String>,

    /// Telomere and centromere regions in BED format
    #[arg(long = "telomere-centromere", value_name = "FILE")]
    pub telomere_centromere_filename: Option<String>,

    /// Samples flagged as population outliers by manual review, one sample id per line
    ///
    /// Every listed sample must be a member of the release subset.
    ///
    #[arg(long = "pop-outliers", value_name = "FILE")]
    pub pop_outliers_filename: Option<String>,

    /// Genotypes of the release subset samples, in VCF or BCF format
    #[arg(long = "vcf", value_name = "FILE")]
    pub vcf_filename: Option<String>,

    #[command(flatten)]
    pub adj: AdjSettings,
}

pub fn validate_and_fix_create_release_settings(
    mut settings: CreateReleaseSettings,
) -> SimpleResult<CreateReleaseSettings> {
    if !(settings.prepare_variant_annotations
        || settings.prepare_sample_annotations
        || settings.create_dense_subset)
    {
        bail!(
            "At least one of --prepare-variant-annotations, --prepare-sample-annotations or --create-dense-subset must be specified"
        );
    }
    if settings.subsets.is_empty() {
        bail!("--subsets must name at least one subset");
    }
    validate_subsets(&settings.subsets)?;
    settings.subsets.sort();
    settings.subsets.dedup();

    if settings.prepare_variant_annotations {
        for (filename, label) in [
            (&settings.filtering_model_filename, "filtering model"),
            (&settings.as_lowqual_filename, "allele-specific low quality"),
            (&settings.vep_filename, "VEP"),
            (&settings.dbsnp_filename, "dbSNP"),
            (&settings.in_silico_filename, "in silico predictor"),
            (&settings.lcr_filename, "low complexity region"),
            (&settings.segdup_filename, "segmental duplication"),
            (
                &settings.telomere_centromere_filename,
                "telomere and centromere",
            ),
        ] {
            check_optional_filename(filename.as_ref(), label)?;
        }
    }
    if settings.prepare_sample_annotations {
        check_optional_filename(settings.pop_outliers_filename.as_ref(), "population outliers")?;
    }
    if settings.create_dense_subset {
        check_stage_filename(
            settings.vcf_filename.as_ref(),
            "genotype",
            "--vcf",
            "--create-dense-subset",
        )?;
    }
    validate_adj_settings(&settings.adj)?;

    Ok(settings)
}
