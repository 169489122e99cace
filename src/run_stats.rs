//! Track summary stats for each pipeline stage
//!

use std::collections::BTreeMap;
use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use crate::globals::PROGRAM_VERSION;
use crate::cli::SharedSettings;
use crate::resources::Resource;
use crate::sample_qc::subpop::SubpopQcCounts;

#[derive(Default, Deserialize, Serialize)]
pub struct SampleQcStats {
    pub sample_count: usize,
    pub variant_count: usize,
    pub excluded_region_variant_count: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct HardFilterStats {
    pub sample_count: usize,
    pub hard_filtered_sample_count: usize,
    pub include_sex_filter: bool,

    /// Count of samples failing each filter reason, samples may fail more than one reason
    pub filter_counts: BTreeMap<String, usize>,
}

#[derive(Default, Deserialize, Serialize)]
pub struct SexInferenceStats {
    pub sample_count: usize,
    pub cutoff_sample_count: usize,
    pub karyotype_counts: BTreeMap<String, usize>,
}

#[derive(Default, Deserialize, Serialize)]
pub struct IntervalQcStats {
    pub sample_count: usize,
    pub interval_count: usize,

    /// Intervals outside of the autosomes and sex chromosomes
    pub excluded_interval_count: usize,

    pub pass_interval_count: usize,

    /// Total and passing interval counts per region
    pub region_counts: BTreeMap<String, (usize, usize)>,
}

#[derive(Default, Deserialize, Serialize)]
pub struct RelatednessStats {
    pub cuking_input_sample_count: usize,
    pub cuking_input_variant_count: usize,
    pub pair_count: usize,
    pub relationship_counts: BTreeMap<String, usize>,
    pub ranked_sample_count: usize,
    pub related_samples_to_drop_count: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct AncestryStats {
    pub pca_training_sample_count: usize,
    pub pca_variant_count: usize,
    pub eigenvalues: Vec<f64>,
    pub rf_iterations: usize,
    pub training_sample_count: usize,
    pub mislabeled_training_sample_count: usize,
    pub pop_counts: BTreeMap<String, usize>,
}

#[derive(Default, Deserialize, Serialize)]
pub struct SubpopStats {
    pub pop: String,
    pub sample_count: usize,
    pub training_sample_count: usize,
    pub qc_counts: SubpopQcCounts,
    pub eigenvalues: Vec<f64>,
    pub annotated_sample_count: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct OutlierStats {
    pub sample_count: usize,
    pub outlier_filtered_sample_count: usize,
    pub fail_counts: BTreeMap<String, usize>,
}

#[derive(Default, Deserialize, Serialize)]
pub struct MetadataStats {
    pub sample_count: usize,
    pub hard_filtered_sample_count: usize,
    pub outlier_filtered_sample_count: usize,
    pub high_quality_sample_count: usize,
    pub release_related_sample_count: usize,
    pub release_sample_count: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct FreqStats {
    pub sample_count: usize,
    pub input_variant_count: usize,
    pub output_variant_count: usize,
    pub strata_count: usize,
    pub faf_strata_count: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct ReleaseStats {
    pub variant_annotation_count: usize,
    pub subset_sample_count: usize,
    pub dense_subset_variant_count: usize,
    pub dropped_subset_allele_count: usize,
    pub unsplit_subset_record_count: usize,
    pub excluded_no_annotation_count: usize,
    pub excluded_as_lowqual_count: usize,
    pub excluded_telomere_or_centromere_count: usize,
    pub excluded_no_alt_count: usize,
}

#[derive(Serialize)]
struct StageRunStats<'a, T> {
    program_version: &'a str,
    pipeline_version: &'a str,
    test: bool,
    stats: &'a T,
}

fn write_json<T: Serialize>(value: &T, filename: &Utf8Path) {
    info!("Writing run statistics to file: '{filename}'");
    let f = unwrap!(
        File::create(filename),
        "Unable to create run statistics json file: '{filename}'"
    );
    unwrap!(
        serde_json::to_writer_pretty(&f, value),
        "Unable to write run statistics json file: '{filename}'"
    );
}

/// Write stats for one stage to the stage's json file in the versioned run directory
///
pub fn write_run_stats<T: Serialize>(
    shared: &SharedSettings,
    stage: &str,
    stats: &T,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let filename = layout.path(&Resource::RunStats {
        stage: stage.to_string(),
    });
    if filename.exists() && !shared.overwrite {
        bail!("Run statistics file '{filename}' already exists. Rerun with --overwrite to replace it");
    }
    if let Some(parent) = filename.parent() {
        unwrap!(
            std::fs::create_dir_all(parent),
            "Unable to create run statistics directory: '{parent}'"
        );
    }
    let run_stats = StageRunStats {
        program_version: PROGRAM_VERSION,
        pipeline_version: &shared.pipeline_version,
        test: layout.is_test(),
        stats,
    };
    write_json(&run_stats, &filename);
    Ok(())
}
