//! Versioned layout of every stage output
//!
//! All stage outputs live under `<output-root>/<pipeline-version>/<group>/`. Test mode maps every
//! resource to a separate reduced-size surrogate, which must be produced by running the upstream
//! stage with `--test`.
//!

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use simple_error::{SimpleResult, bail};

use crate::table::{KeyedRow, Table, read_table, write_table};

/// Population and sample selection of one subpopulation analysis run
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubpopRun {
    pub pop: String,
    pub include_unreleasable: bool,
    pub high_quality: bool,
}

impl SubpopRun {
    fn file_suffix(&self) -> String {
        let samples = if self.include_unreleasable {
            "with_unreleasable_samples"
        } else {
            "without_unreleasable_samples"
        };
        let quality = if self.high_quality { ".high_quality" } else { "" };
        format!("{}.{samples}{quality}", self.pop)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resource {
    SampleQcMetrics,
    HardFiltersNoSex,
    SexInference,
    IntervalQc,
    HardFilters,
    CukingInput,
    CukingOutput,
    Relatedness,
    SampleRankings,
    RelatedSamplesToDrop,
    PcaEigenvalues { include_unreleasable: bool },
    PcaScores { include_unreleasable: bool },
    PcaLoadings { include_unreleasable: bool },
    PopAssignment,
    PopTsv,
    OutlierFiltering,
    FinalizedMetadata,
    SubpopPcaEigenvalues(SubpopRun),
    SubpopPcaScores(SubpopRun),
    SubpopPcaLoadings(SubpopRun),
    SubpopMeta(SubpopRun),
    Freq { subset: Option<String> },
    VariantAnnotations,
    SubsetSampleAnnotations,
    DenseSubset,
    RunStats { stage: String },
}

impl Resource {
    fn group(&self) -> &'static str {
        use Resource::*;
        match self {
            SampleQcMetrics | HardFiltersNoSex | SexInference | IntervalQc | HardFilters
            | OutlierFiltering | FinalizedMetadata => "sample_qc",
            CukingInput | CukingOutput | Relatedness | SampleRankings | RelatedSamplesToDrop => {
                "relatedness"
            }
            PcaEigenvalues { .. } | PcaScores { .. } | PcaLoadings { .. } | PopAssignment
            | PopTsv => "ancestry",
            SubpopPcaEigenvalues(_) | SubpopPcaScores(_) | SubpopPcaLoadings(_)
            | SubpopMeta(_) => "subpop",
            Freq { .. } => "freq",
            VariantAnnotations | SubsetSampleAnnotations | DenseSubset => "release",
            RunStats { .. } => "run_stats",
        }
    }

    fn file_stem(&self) -> String {
        use Resource::*;
        let unreleasable_suffix = |x: &bool| {
            if *x {
                "with_unreleasable_samples"
            } else {
                "without_unreleasable_samples"
            }
        };
        match self {
            SampleQcMetrics => "sample_qc_metrics".to_string(),
            HardFiltersNoSex => "hard_filters_no_sex".to_string(),
            SexInference => "sex".to_string(),
            IntervalQc => "interval_qc".to_string(),
            HardFilters => "hard_filters".to_string(),
            CukingInput => "cuking_input".to_string(),
            CukingOutput => "cuking_output".to_string(),
            Relatedness => "relatedness".to_string(),
            SampleRankings => "sample_rankings".to_string(),
            RelatedSamplesToDrop => "related_samples_to_drop".to_string(),
            PcaEigenvalues {
                include_unreleasable,
            } => format!("pca_eigenvalues.{}", unreleasable_suffix(include_unreleasable)),
            PcaScores {
                include_unreleasable,
            } => format!("pca_scores.{}", unreleasable_suffix(include_unreleasable)),
            PcaLoadings {
                include_unreleasable,
            } => format!("pca_loadings.{}", unreleasable_suffix(include_unreleasable)),
            PopAssignment => "pop_assignment".to_string(),
            PopTsv => "pop_assignment".to_string(),
            OutlierFiltering => "outlier_filtering".to_string(),
            FinalizedMetadata => "sample_metadata".to_string(),
            SubpopPcaEigenvalues(run) => format!("subpop_pca_eigenvalues.{}", run.file_suffix()),
            SubpopPcaScores(run) => format!("subpop_pca_scores.{}", run.file_suffix()),
            SubpopPcaLoadings(run) => format!("subpop_pca_loadings.{}", run.file_suffix()),
            SubpopMeta(run) => format!("subpop_meta.{}", run.file_suffix()),
            Freq { subset } => match subset {
                Some(x) => format!("freq.{x}"),
                None => "freq".to_string(),
            },
            VariantAnnotations => "subset_variant_annotations".to_string(),
            SubsetSampleAnnotations => "subset_sample_annotations".to_string(),
            DenseSubset => "subset_dense_matrix".to_string(),
            RunStats { stage } => format!("{stage}.run_stats"),
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Resource::CukingInput | Resource::CukingOutput | Resource::PopTsv => "tsv",
            Resource::RunStats { .. } => "json",
            _ => "mpack",
        }
    }

    /// Command line used to produce this resource
    ///
    pub fn producer(&self) -> &'static str {
        use Resource::*;
        match self {
            SampleQcMetrics => "hard-filters --sample-qc",
            HardFiltersNoSex => "hard-filters --compute-hard-filters",
            SexInference => "sex-inference --impute-sex",
            IntervalQc => "interval-qc",
            HardFilters => "hard-filters --compute-hard-filters --include-sex-filter",
            CukingInput => "relatedness --prepare-inputs",
            // The engine itself runs outside of this program, at the printed command line
            CukingOutput => "relatedness --print-cuking-command",
            Relatedness => "relatedness --create-relatedness-table",
            SampleRankings | RelatedSamplesToDrop => "relatedness --compute-related-samples-to-drop",
            PcaEigenvalues { .. } | PcaScores { .. } | PcaLoadings { .. } => {
                "assign-ancestry --run-pca"
            }
            PopAssignment | PopTsv => "assign-ancestry --assign-pops",
            OutlierFiltering => "outlier-filtering",
            FinalizedMetadata => "finalize-metadata",
            SubpopPcaEigenvalues(_) | SubpopPcaScores(_) | SubpopPcaLoadings(_) => {
                "subpop-analysis --run-subpop-pca"
            }
            SubpopMeta(_) => "subpop-analysis --annotate-subpop-meta",
            Freq { .. } => "generate-freq",
            VariantAnnotations => "create-release --prepare-variant-annotations",
            SubsetSampleAnnotations => "create-release --prepare-sample-annotations",
            DenseSubset => "create-release --create-dense-subset",
            RunStats { .. } => "the corresponding stage",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResourceLayout {
    run_dir: Utf8PathBuf,
    test: bool,
}

impl ResourceLayout {
    pub fn new(output_root: &Utf8Path, pipeline_version: &str, test: bool) -> Self {
        Self {
            run_dir: output_root.join(pipeline_version),
            test,
        }
    }

    pub fn run_dir(&self) -> &Utf8Path {
        &self.run_dir
    }

    pub fn is_test(&self) -> bool {
        self.test
    }

    /// Maximum number of genotype records to read from any input variant file
    pub fn record_limit(&self) -> Option<usize> {
        if self.test {
            Some(crate::globals::TEST_VARIANT_LIMIT)
        } else {
            None
        }
    }

    pub fn path(&self, resource: &Resource) -> Utf8PathBuf {
        let test_tag = if self.test { ".test" } else { "" };
        self.run_dir.join(resource.group()).join(format!(
            "{}{test_tag}.{}",
            resource.file_stem(),
            resource.extension()
        ))
    }

    /// Get the path to a resource which must already have been produced by an earlier stage
    ///
    pub fn require(&self, resource: &Resource) -> SimpleResult<Utf8PathBuf> {
        let path = self.path(resource);
        if !path.exists() {
            let test_flag = if self.test { " --test" } else { "" };
            bail!(
                "Required input '{path}' does not exist. Run `{} {}{test_flag}` first",
                crate::globals::PROGRAM_NAME,
                resource.producer()
            );
        }
        Ok(path)
    }

    pub fn read<R: KeyedRow + DeserializeOwned, G: DeserializeOwned>(
        &self,
        resource: &Resource,
    ) -> SimpleResult<Table<R, G>> {
        read_table(&self.require(resource)?)
    }

    pub fn write<R: KeyedRow + Serialize, G: Serialize>(
        &self,
        resource: &Resource,
        table: &Table<R, G>,
        overwrite: bool,
    ) -> SimpleResult<()> {
        write_table(table, &self.path(resource), overwrite)
    }
}
