use clap::Args;
use simple_error::{SimpleResult, bail};

use super::defaults::{ANCESTRY_SEED, MIN_POP_PROB, MISSING_POP_LABEL, N_PCS, N_TREES, POP_N_PCS};
use super::utils::{check_proportion, check_stage_filename};
use crate::sample_qc::ancestry::MislabelLimit;

#[derive(Args)]
pub struct AncestrySettings {
    /// Run PCA on unrelated samples and project all samples onto the PCs
    #[arg(long)]
    pub run_pca: bool,

    /// Assign population labels with a random forest trained on the PCA scores
    #[arg(long)]
    pub assign_pops: bool,

    /// Dense QC genotypes in VCF or BCF format
    #[arg(long = "vcf", value_name = "FILE")]
    pub vcf_filename: Option<String>,

    /// Project sample metadata in tab-separated format
    #[arg(long = "project-meta", value_name = "FILE")]
    pub project_meta_filename: Option<String>,

    /// Number of principal components to compute
    #[arg(long, default_value_t = N_PCS)]
    pub n_pcs: usize,

    /// Exclude unreleasable samples from PCA training
    ///
    /// Population assignment reads the PCA scores computed under the same setting.
    ///
    #[arg(long)]
    pub remove_unreleasable_samples: bool,

    /// Comma-separated list of 1-based PCs used as random forest features. Defaults to the first 16 PCs
    #[arg(long, value_delimiter = ',')]
    pub pop_pcs: Vec<usize>,

    /// Minimum random forest probability required to assign a population label
    #[arg(long, default_value_t = MIN_POP_PROB)]
    pub min_pop_prob: f64,

    /// Proportion of training labels to withhold for precision and recall evaluation
    #[arg(long)]
    pub withhold_prop: Option<f64>,

    /// Retrain while the number of mislabeled training samples exceeds this value
    #[arg(long, conflicts_with = "max_proportion_mislabeled_training_samples")]
    pub max_number_mislabeled_training_samples: Option<usize>,

    /// Retrain while the proportion of mislabeled training samples exceeds this value
    #[arg(long)]
    pub max_proportion_mislabeled_training_samples: Option<f64>,

    /// Number of random forest trees
    #[arg(long, default_value_t = N_TREES)]
    pub n_trees: usize,

    /// Random seed used for label withholding and random forest training
    #[arg(long, default_value_t = ANCESTRY_SEED)]
    pub seed: u64,

    /// Label given to samples without a confident population assignment
    #[arg(long, default_value = MISSING_POP_LABEL)]
    pub missing_label: String,

    /// This value will be filled in by the mislabeled training sample options
    #[arg(skip)]
    pub mislabel_limit: Option<MislabelLimit>,
}

pub fn validate_and_fix_ancestry_settings(
    mut settings: AncestrySettings,
) -> SimpleResult<AncestrySettings> {
    if !(settings.run_pca || settings.assign_pops) {
        bail!("At least one of --run-pca or --assign-pops must be specified");
    }
    if settings.n_pcs == 0 {
        bail!("--n-pcs must be greater than 0");
    }

    if settings.run_pca {
        check_stage_filename(
            settings.vcf_filename.as_ref(),
            "genotype",
            "--vcf",
            "--run-pca",
        )?;
        if settings.remove_unreleasable_samples {
            check_stage_filename(
                settings.project_meta_filename.as_ref(),
                "project metadata",
                "--project-meta",
                "--remove-unreleasable-samples",
            )?;
        }
    }

    if settings.assign_pops {
        check_stage_filename(
            settings.project_meta_filename.as_ref(),
            "project metadata",
            "--project-meta",
            "--assign-pops",
        )?;

        if settings.pop_pcs.is_empty() {
            settings.pop_pcs = (1..=POP_N_PCS.min(settings.n_pcs)).collect();
        }
        for &pc in settings.pop_pcs.iter() {
            if pc == 0 || pc > settings.n_pcs {
                bail!(
                    "--pop-pcs value {pc} is outside of the computed PC range 1-{}",
                    settings.n_pcs
                );
            }
        }

        check_proportion(settings.min_pop_prob, "--min-pop-prob")?;
        if let Some(x) = settings.withhold_prop {
            if x <= 0.0 || x >= 1.0 {
                bail!("--withhold-prop must be in (0,1), found {x}");
            }
        }
        if settings.n_trees == 0 {
            bail!("--n-trees must be greater than 0");
        }
        if settings.missing_label.is_empty() {
            bail!("--missing-label must not be empty");
        }

        settings.mislabel_limit = Some(
            match (
                settings.max_number_mislabeled_training_samples,
                settings.max_proportion_mislabeled_training_samples,
            ) {
                (Some(x), None) => MislabelLimit::Number(x),
                (None, Some(x)) => {
                    check_proportion(x, "--max-proportion-mislabeled-training-samples")?;
                    MislabelLimit::Proportion(x)
                }
                _ => bail!(
                    "Exactly one of --max-number-mislabeled-training-samples or --max-proportion-mislabeled-training-samples must be specified with --assign-pops"
                ),
            },
        );
    }

    Ok(settings)
}
