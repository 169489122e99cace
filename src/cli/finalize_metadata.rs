use clap::Args;
use simple_error::SimpleResult;

use super::utils::check_required_filename;

#[derive(Args)]
pub struct FinalizeMetadataSettings {
    /// Project sample metadata in tab-separated format
    ///
    /// Required columns are: s, releasable, prior_release, known_pop, prior_inferred_pop,
    /// known_subpop, subsets. Every sample in this file must have been hard filtered.
    ///
    #[arg(long = "project-meta", value_name = "FILE")]
    pub project_meta_filename: String,
}

pub fn validate_and_fix_finalize_metadata_settings(
    settings: FinalizeMetadataSettings,
) -> SimpleResult<FinalizeMetadataSettings> {
    check_required_filename(&settings.project_meta_filename, "project metadata")?;
    Ok(settings)
}
