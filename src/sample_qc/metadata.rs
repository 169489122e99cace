//! Final per-sample metadata joining every sample QC stage
//!

use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use super::SampleQcMetrics;
use super::ancestry::{PopAssignment, PopAssignmentGlobals};
use super::hard_filters::{HardFilter, HardFilterGlobals, SampleHardFilters, SampleQcMetricFilter};
use super::outlier_filtering::{OutlierGlobals, SampleOutlierFilters};
use super::relatedness::prune::{RelatedSampleToDrop, compute_related_samples_to_drop};
use super::relatedness::relationships::{
    RelatedSample, RelatednessFlags, get_relatedness_flags, get_sample_relationships,
};
use super::relatedness::{RelatednessGlobals, RelatednessTable, SamplePair, read_sample_ranks};
use super::sex_inference::{SexGlobals, SexImputation};
use crate::cli::{FinalizeMetadataSettings, SharedSettings};
use crate::resources::Resource;
use crate::run_stats::{MetadataStats, write_run_stats};
use crate::sample_meta::{ProjectMeta, read_project_meta, warn_sample_mismatch};
use crate::table::{KeyedRow, NoGlobals, Table};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PopulationInference {
    pub pop: String,
    pub probs: BTreeMap<String, f64>,
    pub training_pop: Option<String>,
    pub pca_scores: Vec<f64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SampleMetadata {
    pub s: String,
    pub project_meta: ProjectMeta,
    pub sample_qc: Option<SampleQcMetrics>,
    pub sex_imputation: Option<SexImputation>,
    pub population_inference: Option<PopulationInference>,

    pub hard_filters: BTreeSet<HardFilter>,
    pub sample_qc_metric_hard_filters: BTreeSet<SampleQcMetricFilter>,
    pub hard_filtered: bool,

    /// Related samples of any relationship closer than unrelated, over all samples
    pub relationships: Vec<RelatedSample>,

    /// Missing for hard filtered samples
    pub relatedness_filters: Option<RelatednessFlags>,
    pub release_relatedness_filters: Option<RelatednessFlags>,

    /// Missing for hard filtered samples
    pub qc_metrics_filters: Option<BTreeSet<String>>,
    pub outlier_filtered: bool,

    pub high_quality: bool,

    /// Dropped by related sample pruning among releasable high quality samples
    pub release_related: bool,

    pub release: bool,
}

impl KeyedRow for SampleMetadata {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MetadataGlobals {
    pub hard_filters: HardFilterGlobals,
    pub sex_imputation: SexGlobals,
    pub relatedness: RelatednessGlobals,
    pub population_inference: PopAssignmentGlobals,
    pub outlier_detection: OutlierGlobals,
}

pub struct MetadataInputs<'a> {
    pub project_meta: &'a BTreeMap<String, ProjectMeta>,
    pub sample_qc: &'a Table<SampleQcMetrics, NoGlobals>,
    pub sex: &'a Table<SexImputation, SexGlobals>,
    pub hard_filters: &'a Table<SampleHardFilters, HardFilterGlobals>,
    pub pops: &'a Table<PopAssignment, PopAssignmentGlobals>,
    pub pairs: &'a [SamplePair],
    pub related_samples_to_drop: &'a BTreeSet<String>,
    pub outliers: &'a Table<SampleOutlierFilters, OutlierGlobals>,
    pub ranks: &'a BTreeMap<String, usize>,
}

fn keys<R: KeyedRow<Key = String>, G>(table: &Table<R, G>) -> impl Iterator<Item = String> + '_ {
    table.rows().iter().map(|x| x.key())
}

/// Warn for samples of `other` which are not in the base sample set
fn warn_extra_samples(base: &BTreeMap<String, ProjectMeta>, other: impl Iterator<Item = String>, label: &str) {
    let extra = other.filter(|s| !base.contains_key(s)).collect::<Vec<_>>();
    let extra = extra.iter().map(|x| x.as_str()).collect::<Vec<_>>();
    warn_sample_mismatch(&format!("in the {label} table are not in the project metadata"), &extra);
}

/// Warn for base samples missing from a joined table
fn warn_missing_samples(base: &BTreeMap<String, ProjectMeta>, contains: impl Fn(&String) -> bool, label: &str) {
    let missing = base.keys().filter(|s| !contains(s)).map(|x| x.as_str()).collect::<Vec<_>>();
    warn_sample_mismatch(&format!("in the project metadata are missing from the {label} table"), &missing);
}

/// Join all sample QC results onto the project metadata samples
///
/// Every project metadata sample must be present in the hard filter table. Other mismatches are
/// reported as warnings.
///
pub fn build_sample_metadata(inputs: &MetadataInputs) -> SimpleResult<Vec<SampleMetadata>> {
    let base = inputs.project_meta;

    let missing_hard_filters = base
        .keys()
        .filter(|s| !inputs.hard_filters.contains_key(s))
        .collect::<Vec<_>>();
    if let Some(first) = missing_hard_filters.first() {
        bail!(
            "{} project metadata samples are missing from the hard filter table, including '{first}'",
            missing_hard_filters.len()
        );
    }

    warn_extra_samples(base, keys(inputs.hard_filters), "hard filter");
    warn_missing_samples(base, |s| inputs.sample_qc.contains_key(s), "sample QC");
    warn_missing_samples(base, |s| inputs.sex.contains_key(s), "sex inference");
    warn_missing_samples(base, |s| inputs.pops.contains_key(s), "population inference");

    let hard_filtered = |s: &String| {
        inputs
            .hard_filters
            .get(s)
            .is_some_and(|x| x.hard_filtered)
    };

    let missing_outliers = base
        .keys()
        .filter(|s| !hard_filtered(s) && !inputs.outliers.contains_key(s))
        .collect::<Vec<_>>();
    if let Some(first) = missing_outliers.first() {
        bail!(
            "{} samples passing hard filters are missing from the outlier filtering table, including '{first}'",
            missing_outliers.len()
        );
    }

    let outlier_filtered = |s: &String| inputs.outliers.get(s).is_some_and(|x| x.outlier_filtered);
    let high_quality = |s: &String| !hard_filtered(s) && !outlier_filtered(s);

    // Related sample pruning restricted to releasable high quality samples
    let release_candidates = base
        .values()
        .filter(|x| x.releasable && high_quality(&x.s))
        .map(|x| x.s.clone())
        .collect::<BTreeSet<_>>();
    let release_pairs = inputs
        .pairs
        .iter()
        .filter(|x| release_candidates.contains(&x.i) && release_candidates.contains(&x.j));
    let release_related =
        compute_related_samples_to_drop(release_pairs, inputs.ranks, &BTreeSet::new())?;

    let all_relationships = get_sample_relationships(inputs.pairs, base.keys(), None);
    let release_relationships =
        get_sample_relationships(inputs.pairs, base.keys(), Some(&release_candidates));

    let no_relationships = Vec::new();
    let rows = base
        .values()
        .map(|meta| {
            let s = &meta.s;
            let hf = inputs.hard_filters.get(s);
            let is_hard_filtered = hard_filtered(s);
            let relationships = all_relationships.get(s).unwrap_or(&no_relationships);
            let is_outlier_filtered = outlier_filtered(s);
            let is_high_quality = high_quality(s);
            let is_release_related = release_related.contains(s);

            let relatedness_filters = get_relatedness_flags(
                s,
                relationships,
                inputs.related_samples_to_drop,
                is_hard_filtered,
            );
            let release_relatedness_filters = get_relatedness_flags(
                s,
                release_relationships.get(s).unwrap_or(&no_relationships),
                &release_related,
                is_hard_filtered,
            );

            SampleMetadata {
                s: s.clone(),
                project_meta: meta.clone(),
                sample_qc: inputs.sample_qc.get(s).cloned(),
                sex_imputation: inputs.sex.get(s).cloned(),
                population_inference: inputs.pops.get(s).map(|x| PopulationInference {
                    pop: x.pop.clone(),
                    probs: x.probs.clone(),
                    training_pop: x.training_pop.clone(),
                    pca_scores: x.pca_scores.clone(),
                }),
                hard_filters: hf.map(|x| x.hard_filters.clone()).unwrap_or_default(),
                sample_qc_metric_hard_filters: hf
                    .map(|x| x.sample_qc_metric_hard_filters.clone())
                    .unwrap_or_default(),
                hard_filtered: is_hard_filtered,
                relationships: relationships.clone(),
                relatedness_filters,
                release_relatedness_filters,
                qc_metrics_filters: inputs
                    .outliers
                    .get(s)
                    .filter(|_| !is_hard_filtered)
                    .map(|x| x.qc_metrics_filters.clone()),
                outlier_filtered: is_outlier_filtered,
                high_quality: is_high_quality,
                release_related: is_release_related,
                release: meta.releasable && is_high_quality && !is_release_related,
            }
        })
        .collect();
    Ok(rows)
}

/// Run the finalize metadata stage
///
pub fn run_finalize_metadata(
    shared: &SharedSettings,
    settings: &FinalizeMetadataSettings,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();

    let project_meta = read_project_meta(Utf8Path::new(&settings.project_meta_filename))?;
    let sample_qc: Table<SampleQcMetrics, NoGlobals> = layout.read(&Resource::SampleQcMetrics)?;
    let sex: Table<SexImputation, SexGlobals> = layout.read(&Resource::SexInference)?;
    let hard_filters: Table<SampleHardFilters, HardFilterGlobals> =
        layout.read(&Resource::HardFilters)?;
    if !hard_filters.globals.include_sex_filter {
        bail!(
            "Hard filter table was computed without sex filters. Run `hard-filters --compute-hard-filters --include-sex-filter` first"
        );
    }
    let pops: Table<PopAssignment, PopAssignmentGlobals> = layout.read(&Resource::PopAssignment)?;
    let relatedness: RelatednessTable = layout.read(&Resource::Relatedness)?;
    let related: Table<RelatedSampleToDrop, NoGlobals> =
        layout.read(&Resource::RelatedSamplesToDrop)?;
    let outliers: Table<SampleOutlierFilters, OutlierGlobals> =
        layout.read(&Resource::OutlierFiltering)?;
    let ranks = read_sample_ranks(&layout)?;

    let related_samples_to_drop = related.rows().iter().map(|x| x.s.clone()).collect();
    let inputs = MetadataInputs {
        project_meta: &project_meta,
        sample_qc: &sample_qc,
        sex: &sex,
        hard_filters: &hard_filters,
        pops: &pops,
        pairs: relatedness.rows(),
        related_samples_to_drop: &related_samples_to_drop,
        outliers: &outliers,
        ranks: &ranks,
    };
    let rows = build_sample_metadata(&inputs)?;

    let count = |f: fn(&SampleMetadata) -> bool| rows.iter().filter(|x| f(x)).count();
    let stats = MetadataStats {
        sample_count: rows.len(),
        hard_filtered_sample_count: count(|x| x.hard_filtered),
        outlier_filtered_sample_count: count(|x| x.outlier_filtered),
        high_quality_sample_count: count(|x| x.high_quality),
        release_related_sample_count: count(|x| x.release_related),
        release_sample_count: count(|x| x.release),
    };
    info!(
        "Finalized metadata for {} samples: {} high quality, {} release",
        stats.sample_count.separate_with_commas(),
        stats.high_quality_sample_count.separate_with_commas(),
        stats.release_sample_count.separate_with_commas()
    );

    let globals = MetadataGlobals {
        hard_filters: hard_filters.globals.clone(),
        sex_imputation: sex.globals.clone(),
        relatedness: relatedness.globals.clone(),
        population_inference: pops.globals.clone(),
        outlier_detection: outliers.globals.clone(),
    };
    let table = Table::new(globals, rows)?;
    layout.write(&Resource::FinalizedMetadata, &table, shared.overwrite)?;
    write_run_stats(shared, "finalize_metadata", &stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_qc::ancestry::MislabelLimit;
    use crate::sample_qc::outlier_filtering::{OutlierMethod, OutlierParams};
    use crate::sample_qc::relatedness::Relationship;
    use crate::sample_qc::sex_inference::{PloidyCutoffs, SexImputationParams};

    fn meta(s: &str, releasable: bool) -> ProjectMeta {
        ProjectMeta {
            s: s.to_string(),
            releasable,
            ..Default::default()
        }
    }

    fn hard_filter_row(s: &str, hard_filtered: bool) -> SampleHardFilters {
        SampleHardFilters {
            s: s.to_string(),
            hard_filters: if hard_filtered {
                BTreeSet::from([HardFilter::Contamination])
            } else {
                BTreeSet::new()
            },
            sample_qc_metric_hard_filters: BTreeSet::new(),
            hard_filtered,
        }
    }

    fn outlier_row(s: &str, outlier_filtered: bool) -> SampleOutlierFilters {
        SampleOutlierFilters {
            s: s.to_string(),
            pop: "afr".to_string(),
            metrics: BTreeMap::new(),
            qc_metrics_filters: if outlier_filtered {
                BTreeSet::from(["fail_n_snp".to_string()])
            } else {
                BTreeSet::new()
            },
            outlier_filtered,
        }
    }

    fn sibling_pair(i: &str, j: &str) -> SamplePair {
        SamplePair {
            i: i.to_string(),
            j: j.to_string(),
            kin: 0.25,
            ibd0: 0.25,
            ibd1: 0.5,
            ibd2: 0.25,
            relationship: Relationship::Siblings,
        }
    }

    fn outlier_globals() -> OutlierGlobals {
        OutlierGlobals {
            params: OutlierParams {
                method: OutlierMethod::Mad,
                lower_threshold: 4.0,
                upper_threshold: 4.0,
                regress_n_pcs: 0,
                qc_metrics: Vec::new(),
            },
            regression_coefficients: BTreeMap::new(),
            bounds: BTreeMap::new(),
        }
    }

    fn sex_globals() -> SexGlobals {
        SexGlobals {
            params: SexImputationParams::default(),
            ploidy_cutoffs: PloidyCutoffs {
                upper_x: 1.3,
                lower_xx: 1.7,
                upper_xx: 2.3,
                lower_xxx: 2.7,
                lower_y: 0.2,
                upper_y: 1.3,
                lower_yy: 1.7,
            },
            n_cutoff_samples_xx: 0,
            n_cutoff_samples_xy: 0,
        }
    }

    fn pop_globals() -> PopAssignmentGlobals {
        PopAssignmentGlobals {
            min_prob: 0.75,
            pcs: vec![1],
            n_trees: 1,
            seed: 0,
            missing_label: "unassigned".to_string(),
            mislabel_limit: MislabelLimit::Number(0),
            iterations: 1,
            n_mislabeled_training_samples: 0,
            prop_mislabeled_training_samples: 0.0,
            withhold_prop: None,
            withheld_evaluation: BTreeMap::new(),
        }
    }

    #[test]
    fn test_build_sample_metadata() {
        // A: released. B: sibling of A, lower rank, so dropped as release related. C: hard
        // filtered. D: outlier. E: not releasable.
        let project_meta = [
            meta("A", true),
            meta("B", true),
            meta("C", true),
            meta("D", true),
            meta("E", false),
        ]
        .into_iter()
        .map(|x| (x.s.clone(), x))
        .collect::<BTreeMap<_, _>>();

        let hard_filters = Table::new(
            HardFilterGlobals {
                cutoffs: Default::default(),
                include_sex_filter: true,
            },
            ["A", "B", "C", "D", "E"]
                .iter()
                .map(|s| hard_filter_row(s, *s == "C"))
                .collect(),
        )
        .unwrap();
        let outliers = Table::new(
            outlier_globals(),
            ["A", "B", "D", "E"]
                .iter()
                .map(|s| outlier_row(s, *s == "D"))
                .collect(),
        )
        .unwrap();
        let sample_qc = Table::new(NoGlobals {}, Vec::new()).unwrap();
        let sex = Table::new(sex_globals(), Vec::new()).unwrap();
        let pops = Table::new(pop_globals(), Vec::new()).unwrap();
        let pairs = vec![sibling_pair("A", "B"), sibling_pair("C", "E")];
        let ranks = ["A", "B", "D", "E", "C"]
            .iter()
            .enumerate()
            .map(|(i, s)| (s.to_string(), i))
            .collect::<BTreeMap<_, _>>();
        let related_samples_to_drop = BTreeSet::from(["C".to_string(), "B".to_string()]);

        let inputs = MetadataInputs {
            project_meta: &project_meta,
            sample_qc: &sample_qc,
            sex: &sex,
            hard_filters: &hard_filters,
            pops: &pops,
            pairs: &pairs,
            related_samples_to_drop: &related_samples_to_drop,
            outliers: &outliers,
            ranks: &ranks,
        };
        let rows = build_sample_metadata(&inputs).unwrap();
        let get = |s: &str| rows.iter().find(|x| x.s == s).unwrap();

        assert!(get("A").release);
        assert!(get("A").high_quality);
        assert!(get("B").high_quality);
        assert!(get("B").release_related);
        assert!(!get("B").release);
        assert!(!get("C").high_quality);
        assert_eq!(get("C").relatedness_filters, None);
        assert_eq!(get("C").qc_metrics_filters, None);
        assert!(get("D").outlier_filtered);
        assert!(!get("D").release);
        assert!(get("E").high_quality);
        assert!(!get("E").release);

        let b_flags = get("B").relatedness_filters.clone().unwrap();
        assert!(b_flags.related);
        assert!(b_flags.sibling);
        assert_eq!(get("E").relationships.len(), 1);
        assert!(get("D").relationships.is_empty());

        // Sibling of a hard filtered sample is not a release relationship
        let e_release_flags = get("E").release_relatedness_filters.clone().unwrap();
        assert!(!e_release_flags.sibling);
    }

    #[test]
    fn test_missing_hard_filter_sample_is_error() {
        let project_meta = BTreeMap::from([("A".to_string(), meta("A", true))]);
        let hard_filters = Table::new(
            HardFilterGlobals {
                cutoffs: Default::default(),
                include_sex_filter: true,
            },
            Vec::new(),
        )
        .unwrap();
        let outliers = Table::new(outlier_globals(), Vec::new()).unwrap();
        let sample_qc = Table::new(NoGlobals {}, Vec::new()).unwrap();
        let sex = Table::new(sex_globals(), Vec::new()).unwrap();
        let pops = Table::new(pop_globals(), Vec::new()).unwrap();
        let inputs = MetadataInputs {
            project_meta: &project_meta,
            sample_qc: &sample_qc,
            sex: &sex,
            hard_filters: &hard_filters,
            pops: &pops,
            pairs: &[],
            related_samples_to_drop: &BTreeSet::new(),
            outliers: &outliers,
            ranks: &BTreeMap::new(),
        };
        assert!(build_sample_metadata(&inputs).is_err());
    }
}
