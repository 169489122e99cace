mod assign;
pub mod pca;
mod random_forest;

use std::collections::{BTreeMap, HashSet};

use camino::Utf8Path;
use log::info;
use simple_error::{SimpleResult, bail};
use thousands::Separable;

pub use self::assign::{MislabelLimit, PopAssignment, PopAssignmentGlobals};
use self::assign::{
    MAX_RF_ITERATIONS, assign_pops_with_convergence, evaluate_withheld, get_training_pop,
    withhold_training_labels,
};
use self::pca::{PcaEigenvalue, PcaGlobals, PcaLoading, PcaScore, run_hwe_normalized_pca};
use self::random_forest::{RandomForestClassifier, RandomForestParams};
use crate::cli::{AncestrySettings, SharedSettings};
use crate::genotype_matrix::read_genotype_matrix;
use crate::log_utils::log_category_counts;
use crate::resources::Resource;
use crate::run_stats::{AncestryStats, write_run_stats};
use crate::sample_meta::{read_project_meta, warn_sample_mismatch};
use crate::sample_qc::relatedness::prune::RelatedSampleToDrop;
use crate::table::{NoGlobals, Table};
use crate::tsv_utils::write_tsv;

pub type PcaScoreTable = Table<PcaScore, PcaGlobals>;
pub type PopAssignmentTable = Table<PopAssignment, PopAssignmentGlobals>;

fn run_pca(
    shared: &SharedSettings,
    settings: &AncestrySettings,
    stats: &mut AncestryStats,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let include_unreleasable = !settings.remove_unreleasable_samples;
    let Some(vcf_filename) = settings.vcf_filename.as_deref() else {
        bail!("--vcf is required with --run-pca");
    };

    let related: Table<RelatedSampleToDrop, NoGlobals> =
        layout.read(&Resource::RelatedSamplesToDrop)?;
    let matrix = read_genotype_matrix(Utf8Path::new(vcf_filename), layout.record_limit())?;

    let releasable = if include_unreleasable {
        None
    } else {
        let Some(meta_filename) = settings.project_meta_filename.as_deref() else {
            bail!("--project-meta is required with --remove-unreleasable-samples");
        };
        let meta = read_project_meta(Utf8Path::new(meta_filename))?;
        let missing = matrix
            .samples
            .iter()
            .map(|s| s.as_str())
            .filter(|s| !meta.contains_key(*s))
            .collect::<Vec<_>>();
        warn_sample_mismatch(
            "in the genotype matrix have no project metadata and are excluded from PCA training",
            &missing,
        );
        Some(
            meta.into_values()
                .filter(|x| x.releasable)
                .map(|x| x.s)
                .collect::<HashSet<_>>(),
        )
    };

    let training = matrix
        .samples
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !related.contains_key(&s.to_string()))
        .filter(|s| releasable.as_ref().is_none_or(|x| x.contains(*s)))
        .collect::<HashSet<_>>();

    let result = run_hwe_normalized_pca(&matrix, &training, settings.n_pcs, settings.seed)?;
    stats.pca_training_sample_count = training.len();
    stats.pca_variant_count = result.loadings.len();
    stats.eigenvalues = result.eigenvalues.clone();
    info!(
        "Top PCA eigenvalues: {}",
        result
            .eigenvalues
            .iter()
            .take(5)
            .map(|x| format!("{x:.3}"))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let globals = PcaGlobals {
        n_pcs: result.eigenvalues.len(),
        method: result.method,
        include_unreleasable,
        training_sample_count: training.len(),
        variant_count: result.loadings.len(),
    };
    let eigenvalues = result
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &eigenvalue)| PcaEigenvalue { pc: i + 1, eigenvalue })
        .collect();
    layout.write(
        &Resource::PcaEigenvalues {
            include_unreleasable,
        },
        &Table::new(globals.clone(), eigenvalues)?,
        shared.overwrite,
    )?;
    layout.write(
        &Resource::PcaScores {
            include_unreleasable,
        },
        &Table::new(globals.clone(), result.scores)?,
        shared.overwrite,
    )?;
    let loadings: Table<PcaLoading, PcaGlobals> = Table::new(globals, result.loadings)?;
    layout.write(
        &Resource::PcaLoadings {
            include_unreleasable,
        },
        &loadings,
        shared.overwrite,
    )
}

/// Write the population assignments with one column per class probability and per PC
///
fn write_pop_tsv(
    filename: &Utf8Path,
    assignments: &PopAssignmentTable,
    overwrite: bool,
) -> SimpleResult<()> {
    let pops = assignments
        .rows()
        .iter()
        .flat_map(|x| x.probs.keys().cloned())
        .collect::<std::collections::BTreeSet<_>>();
    let n_pcs = assignments
        .rows()
        .iter()
        .map(|x| x.pca_scores.len())
        .max()
        .unwrap_or(0);

    let mut header = ["s", "pop", "training_pop", "original_training_pop", "withheld_sample"]
        .map(String::from)
        .to_vec();
    header.extend(pops.iter().map(|x| format!("prob_{x}")));
    header.extend((1..=n_pcs).map(|x| format!("PC{x}")));

    let records = assignments
        .rows()
        .iter()
        .map(|x| {
            let mut record = vec![
                x.s.clone(),
                x.pop.clone(),
                x.training_pop.clone().unwrap_or_default(),
                x.original_training_pop.clone().unwrap_or_default(),
                x.withheld_sample.to_string(),
            ];
            record.extend(
                pops.iter()
                    .map(|p| x.probs.get(p).map(|v| v.to_string()).unwrap_or_default()),
            );
            record.extend((0..n_pcs).map(|i| {
                x.pca_scores
                    .get(i)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            }));
            record
        })
        .collect::<Vec<_>>();
    write_tsv(filename, &header, &records, overwrite)
}

fn assign_pops(
    shared: &SharedSettings,
    settings: &AncestrySettings,
    stats: &mut AncestryStats,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let Some(meta_filename) = settings.project_meta_filename.as_deref() else {
        bail!("--project-meta is required with --assign-pops");
    };
    let Some(limit) = settings.mislabel_limit else {
        bail!("A mislabeled training sample limit is required with --assign-pops");
    };

    let scores: PcaScoreTable = layout.read(&Resource::PcaScores {
        include_unreleasable: !settings.remove_unreleasable_samples,
    })?;
    let meta = read_project_meta(Utf8Path::new(meta_filename))?;

    let available_pcs = scores.globals.n_pcs;
    if let Some(pc) = settings.pop_pcs.iter().find(|&&x| x > available_pcs) {
        bail!("PC {pc} was requested for population assignment but only {available_pcs} PCs are available");
    }

    let missing = scores
        .rows()
        .iter()
        .map(|x| x.s.as_str())
        .filter(|s| !meta.contains_key(*s))
        .collect::<Vec<_>>();
    warn_sample_mismatch(
        "with PCA scores have no project metadata and are not used for training",
        &missing,
    );

    let features = scores
        .rows()
        .iter()
        .map(|x| settings.pop_pcs.iter().map(|pc| x.scores[pc - 1]).collect())
        .collect::<Vec<Vec<f64>>>();
    let original_labels = scores
        .rows()
        .iter()
        .map(|x| {
            meta.get(&x.s).and_then(|m| {
                get_training_pop(m.known_pop.as_deref(), m.prior_inferred_pop.as_deref())
            })
        })
        .collect::<Vec<_>>();
    let protected = scores
        .rows()
        .iter()
        .map(|x| meta.get(&x.s).is_some_and(|m| m.is_reference_cohort()))
        .collect::<Vec<_>>();

    let mut labels = original_labels.clone();
    let withheld = match settings.withhold_prop {
        Some(prop) => {
            let withheld = withhold_training_labels(&mut labels, prop, settings.seed);
            info!(
                "Withheld {} training labels for evaluation",
                withheld.iter().filter(|&&x| x).count().separate_with_commas()
            );
            withheld
        }
        None => vec![false; labels.len()],
    };

    let training_count = labels.iter().filter(|x| x.is_some()).count();
    info!(
        "Assigning populations for {} samples with {} training labels",
        features.len().separate_with_commas(),
        training_count.separate_with_commas()
    );

    let classifier = RandomForestClassifier {
        params: RandomForestParams {
            n_trees: settings.n_trees,
            seed: settings.seed,
            ..Default::default()
        },
    };
    let result = assign_pops_with_convergence(
        &classifier,
        &features,
        labels,
        &protected,
        settings.min_pop_prob,
        &settings.missing_label,
        limit,
        MAX_RF_ITERATIONS,
    )?;

    let withheld_evaluation = if settings.withhold_prop.is_some() {
        let evaluation = evaluate_withheld(&original_labels, &withheld, &result.predictions);
        for (pop, x) in evaluation.iter() {
            info!(
                "Withheld sample evaluation for {pop}: precision {:?} recall {:?}",
                x.precision, x.recall
            );
        }
        evaluation
    } else {
        BTreeMap::new()
    };

    stats.rf_iterations = result.iterations;
    stats.training_sample_count = result.stats.training_count;
    stats.mislabeled_training_sample_count = result.stats.mismatch_count;

    let rows = scores
        .rows()
        .iter()
        .enumerate()
        .map(|(i, x)| PopAssignment {
            s: x.s.clone(),
            pop: result.predictions[i].pop.clone(),
            probs: result.predictions[i].probs.clone(),
            training_pop: result.labels[i].clone(),
            original_training_pop: original_labels[i].clone(),
            withheld_sample: withheld[i],
            pca_scores: x.scores.clone(),
        })
        .collect::<Vec<_>>();
    for row in rows.iter() {
        *stats.pop_counts.entry(row.pop.clone()).or_insert(0) += 1;
    }
    log_category_counts("Samples assigned to", &stats.pop_counts);

    let globals = PopAssignmentGlobals {
        min_prob: settings.min_pop_prob,
        pcs: settings.pop_pcs.clone(),
        n_trees: settings.n_trees,
        seed: settings.seed,
        missing_label: settings.missing_label.clone(),
        mislabel_limit: limit,
        iterations: result.iterations,
        n_mislabeled_training_samples: result.stats.mismatch_count,
        prop_mislabeled_training_samples: result.stats.mismatch_proportion(),
        withhold_prop: settings.withhold_prop,
        withheld_evaluation,
    };
    let table = Table::new(globals, rows)?;
    layout.write(&Resource::PopAssignment, &table, shared.overwrite)?;
    write_pop_tsv(&layout.path(&Resource::PopTsv), &table, shared.overwrite)
}

/// Run the ancestry inference stage
///
pub fn run_assign_ancestry(shared: &SharedSettings, settings: &AncestrySettings) -> SimpleResult<()> {
    let mut stats = AncestryStats::default();
    if settings.run_pca {
        run_pca(shared, settings, &mut stats)?;
    }
    if settings.assign_pops {
        assign_pops(shared, settings, &mut stats)?;
    }
    write_run_stats(shared, "assign_ancestry", &stats)
}
