//! Subpopulation analysis within one inferred population
//!
//! Samples assigned to the population are restricted to a population-specific QC site set, filtered
//! on adj genotype call rate, allele frequency, site inbreeding and Hardy-Weinberg equilibrium and
//! then LD-pruned. PCA is run on the unrelated samples with all other population samples
//! projected, and the resulting scores are joined to the project subpopulation labels.
//!

use std::collections::{HashMap, HashSet, VecDeque};

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use super::ancestry::pca::{PcaEigenvalue, PcaGlobals, PcaLoading, PcaScore, run_hwe_normalized_pca};
use super::metadata::{MetadataGlobals, SampleMetadata};
use super::relatedness::prune::RelatedSampleToDrop;
use crate::cli::{SharedSettings, SubpopAnalysisSettings};
use crate::freq::FreqTable;
use crate::genome_regions::GenomeRegions;
use crate::genotype_matrix::{AdjCutoffs, Call, GenotypeMatrix, VariantRow, read_genotype_matrix};
use crate::resources::{Resource, SubpopRun};
use crate::run_stats::{SubpopStats, write_run_stats};
use crate::sample_meta::warn_sample_mismatch;
use crate::stats_utils::hardy_weinberg_pvalue;
use crate::table::{KeyedRow, NoGlobals, Table};
use crate::tsv_utils::read_id_list;

/// Criteria selecting the samples of one population for subpopulation analysis
///
pub struct SubpopSampleFilter<'a> {
    pub pop: &'a str,
    pub include_unreleasable: bool,
    pub high_quality_only: bool,
    pub outliers: &'a HashSet<String>,
}

/// Samples assigned to the population which pass hard filters and the optional release, quality
/// and outlier restrictions
///
pub fn select_subpop_samples(
    metadata: &[SampleMetadata],
    filter: &SubpopSampleFilter,
) -> HashSet<String> {
    metadata
        .iter()
        .filter(|x| {
            x.population_inference
                .as_ref()
                .is_some_and(|p| p.pop == filter.pop)
        })
        .filter(|x| !x.hard_filtered)
        .filter(|x| filter.include_unreleasable || x.project_meta.releasable)
        .filter(|x| !filter.high_quality_only || x.high_quality)
        .filter(|x| !filter.outliers.contains(&x.s))
        .map(|x| x.s.clone())
        .collect()
}

/// Site filters applied to the population QC matrix before PCA
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SubpopQcParams {
    pub min_af: f64,
    pub min_callrate: f64,
    pub min_inbreeding_coeff: f64,
    pub min_hwe_pvalue: f64,

    /// No LD pruning when None
    pub ld_r2: Option<f64>,

    pub ld_window_bp: i64,
    pub adj_cutoffs: AdjCutoffs,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct GenotypeCounts {
    hom_ref: u64,
    het: u64,
    hom_var: u64,
}

impl GenotypeCounts {
    fn called(&self) -> u64 {
        self.hom_ref + self.het + self.hom_var
    }

    fn af(&self) -> Option<f64> {
        let n = self.called();
        (n > 0).then(|| (self.het + 2 * self.hom_var) as f64 / (2 * n) as f64)
    }

    fn inbreeding_coeff(&self) -> Option<f64> {
        let p = self.af()?;
        let expected_het = 2.0 * p * (1.0 - p) * self.called() as f64;
        (expected_het > 0.0).then(|| 1.0 - self.het as f64 / expected_het)
    }
}

/// Counts of adj diploid genotypes, all other entries are treated as missing
fn adj_genotype_counts(row: &VariantRow, cutoffs: &AdjCutoffs) -> GenotypeCounts {
    let mut counts = GenotypeCounts::default();
    for entry in row.entries.iter().filter(|x| x.is_adj(cutoffs)) {
        if let Some(gt @ Call::Diploid(_, _)) = entry.gt {
            match gt.n_alt_alleles() {
                0 => counts.hom_ref += 1,
                1 => counts.het += 1,
                _ => counts.hom_var += 1,
            }
        }
    }
    counts
}

fn passes_site_qc(row: &VariantRow, params: &SubpopQcParams, sample_count: usize) -> bool {
    if !(row.key.is_snv() && row.key.locus.in_autosome()) || row.was_split {
        return false;
    }
    let counts = adj_genotype_counts(row, &params.adj_cutoffs);
    let callrate = counts.called() as f64 / sample_count as f64;
    counts.het + counts.hom_var > 0
        && callrate > params.min_callrate
        && counts.af().is_some_and(|x| x > params.min_af)
        && counts
            .inbreeding_coeff()
            .is_some_and(|x| x > params.min_inbreeding_coeff)
        && hardy_weinberg_pvalue(counts.hom_ref, counts.het, counts.hom_var) > params.min_hwe_pvalue
}

/// Mean-imputed, unit-variance adj dosages of one variant, None for monomorphic variants
fn standardized_dosages(row: &VariantRow, cutoffs: &AdjCutoffs) -> Option<Vec<f64>> {
    let dosages = row
        .entries
        .iter()
        .map(|x| match x.gt {
            Some(gt @ Call::Diploid(_, _)) if x.is_adj(cutoffs) => Some(gt.n_alt_alleles() as f64),
            _ => None,
        })
        .collect::<Vec<_>>();
    let called = dosages.iter().flatten().copied().collect::<Vec<_>>();
    if called.is_empty() {
        return None;
    }
    let mean = called.iter().sum::<f64>() / called.len() as f64;
    let centered = dosages
        .iter()
        .map(|x| x.map_or(0.0, |v| v - mean))
        .collect::<Vec<_>>();
    let norm = centered.iter().map(|x| x * x).sum::<f64>().sqrt();
    (norm > 0.0).then(|| centered.iter().map(|x| x / norm).collect())
}

/// Greedy LD pruning in matrix row order
///
/// A variant is kept unless its squared correlation with a kept variant on the same contig within
/// `window_bp` is at or above `r2`. Returns the indexes of kept rows.
///
pub fn ld_prune(
    matrix: &GenotypeMatrix,
    r2: f64,
    window_bp: i64,
    cutoffs: &AdjCutoffs,
) -> Vec<usize> {
    let mut kept = Vec::new();
    let mut window: VecDeque<(usize, Vec<f64>)> = VecDeque::new();
    for (row_index, row) in matrix.rows.iter().enumerate() {
        let Some(x) = standardized_dosages(row, cutoffs) else {
            continue;
        };
        let locus = &row.key.locus;
        while let Some((front_index, _)) = window.front() {
            let front = &matrix.rows[*front_index].key.locus;
            if front.contig != locus.contig || locus.position - front.position > window_bp {
                window.pop_front();
            } else {
                break;
            }
        }
        let linked = window.iter().any(|(_, y)| {
            let r = x.iter().zip(y.iter()).map(|(a, b)| a * b).sum::<f64>();
            r * r >= r2
        });
        if !linked {
            kept.push(row_index);
            window.push_back((row_index, x));
        }
    }
    kept
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SubpopQcCounts {
    pub input_variant_count: usize,
    pub site_qc_variant_count: usize,
    pub ld_pruned_variant_count: usize,
}

/// Population QC matrix: the population samples over the variants passing site QC and LD pruning
///
pub fn filter_subpop_qc_matrix(
    matrix: &GenotypeMatrix,
    samples: &HashSet<&str>,
    params: &SubpopQcParams,
) -> (GenotypeMatrix, SubpopQcCounts) {
    let mut pop_matrix = matrix.select_samples(samples);
    let sample_count = pop_matrix.sample_count();
    let mut counts = SubpopQcCounts {
        input_variant_count: pop_matrix.rows.len(),
        ..Default::default()
    };
    pop_matrix.retain_rows(|row| passes_site_qc(row, params, sample_count));
    counts.site_qc_variant_count = pop_matrix.rows.len();

    if let Some(r2) = params.ld_r2 {
        let kept = ld_prune(&pop_matrix, r2, params.ld_window_bp, &params.adj_cutoffs);
        let rows = std::mem::take(&mut pop_matrix.rows);
        let mut kept = kept.into_iter().peekable();
        pop_matrix.rows = rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, row)| kept.next_if_eq(&i).map(|_| row))
            .collect();
    }
    counts.ld_pruned_variant_count = pop_matrix.rows.len();
    (pop_matrix, counts)
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SubpopPcaGlobals {
    pub pop: String,
    pub high_quality_only: bool,
    pub min_popmax_af: Option<f64>,
    pub qc_params: SubpopQcParams,
    pub qc_counts: SubpopQcCounts,
    pub pca: PcaGlobals,
}

/// Population PCA scores joined with the project population and subpopulation labels
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SubpopSampleMeta {
    pub s: String,
    pub pop: String,
    pub project_id: Option<String>,
    pub project_pop: Option<String>,
    pub known_subpop: Option<String>,
    pub subpop_description: Option<String>,
    pub v2_pop: Option<String>,
    pub v2_subpop: Option<String>,
    pub pca_scores: Vec<f64>,

    /// Sample was used to compute the population PCs
    pub training: bool,
}

impl KeyedRow for SubpopSampleMeta {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

/// Join population PCA scores to sample metadata
///
/// Samples missing from the metadata are reported and dropped.
///
pub fn annotate_subpop_meta(
    scores: &[PcaScore],
    metadata: &[SampleMetadata],
    pop: &str,
) -> Vec<SubpopSampleMeta> {
    let metadata = metadata
        .iter()
        .map(|x| (x.s.as_str(), x))
        .collect::<HashMap<_, _>>();
    let missing = scores
        .iter()
        .map(|x| x.s.as_str())
        .filter(|s| !metadata.contains_key(s))
        .collect::<Vec<_>>();
    warn_sample_mismatch("with population PCA scores have no sample metadata", &missing);

    scores
        .iter()
        .filter_map(|score| {
            let meta = metadata.get(score.s.as_str())?;
            let project = &meta.project_meta;
            Some(SubpopSampleMeta {
                s: score.s.clone(),
                pop: meta
                    .population_inference
                    .as_ref()
                    .map_or_else(|| pop.to_string(), |x| x.pop.clone()),
                project_id: project.project_id.clone(),
                project_pop: project.project_pop.clone(),
                known_subpop: project.known_subpop.clone(),
                subpop_description: project.subpop_description.clone(),
                v2_pop: project.v2_pop.clone(),
                v2_subpop: project.v2_subpop.clone(),
                pca_scores: score.scores.clone(),
                training: score.training,
            })
        })
        .collect()
}

fn run_subpop_pca(
    shared: &SharedSettings,
    settings: &SubpopAnalysisSettings,
    run: &SubpopRun,
    stats: &mut SubpopStats,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let Some(vcf_filename) = settings.vcf_filename.as_deref() else {
        bail!("--vcf is required with --run-subpop-pca");
    };

    let metadata: Table<SampleMetadata, MetadataGlobals> =
        layout.read(&Resource::FinalizedMetadata)?;
    let related: Table<RelatedSampleToDrop, NoGlobals> =
        layout.read(&Resource::RelatedSamplesToDrop)?;
    let outliers = match settings.outliers_filename.as_deref() {
        Some(filename) => read_id_list(Utf8Path::new(filename), "outlier samples")?
            .into_iter()
            .collect::<HashSet<_>>(),
        None => HashSet::new(),
    };

    let filter = SubpopSampleFilter {
        pop: &run.pop,
        include_unreleasable: run.include_unreleasable,
        high_quality_only: run.high_quality,
        outliers: &outliers,
    };
    let samples = select_subpop_samples(metadata.rows(), &filter);
    if samples.is_empty() {
        bail!("No samples selected for subpopulation analysis of population '{}'", run.pop);
    }
    info!(
        "Selected {} samples assigned to population '{}'",
        samples.len().separate_with_commas(),
        run.pop
    );

    let mut matrix = read_genotype_matrix(Utf8Path::new(vcf_filename), layout.record_limit())?;
    if let Some(min_popmax_af) = settings.min_popmax_af {
        let freq: FreqTable = layout.read(&Resource::Freq { subset: None })?;
        matrix.retain_rows(|row| {
            freq.get(&row.key)
                .and_then(|x| x.popmax.as_ref())
                .is_some_and(|x| x.af > min_popmax_af)
        });
        info!(
            "Retained {} variants with popmax AF above {min_popmax_af}",
            matrix.rows.len().separate_with_commas()
        );
    }
    if let Some(filename) = settings.exclude_regions_filename.as_deref() {
        let regions = GenomeRegions::from_bed(Utf8Path::new(filename), "excluded regions")?;
        matrix.retain_rows(|row| !regions.contains_locus(&row.key.locus));
    }

    let missing = samples
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !matrix.samples.iter().any(|x| x == s))
        .collect::<Vec<_>>();
    warn_sample_mismatch("selected for subpopulation analysis have no genotypes", &missing);

    let sample_refs = samples.iter().map(|s| s.as_str()).collect::<HashSet<_>>();
    let params = settings.qc_params();
    let (pop_matrix, qc_counts) = filter_subpop_qc_matrix(&matrix, &sample_refs, &params);
    info!(
        "Population QC matrix has {} of {} variants after site QC and LD pruning",
        qc_counts.ld_pruned_variant_count.separate_with_commas(),
        qc_counts.input_variant_count.separate_with_commas()
    );

    let training = pop_matrix
        .samples
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !related.contains_key(&s.to_string()))
        .collect::<HashSet<_>>();
    let result = run_hwe_normalized_pca(&pop_matrix, &training, settings.n_pcs, settings.seed)?;

    stats.sample_count = pop_matrix.sample_count();
    stats.training_sample_count = training.len();
    stats.qc_counts = qc_counts.clone();
    stats.eigenvalues = result.eigenvalues.clone();

    let globals = SubpopPcaGlobals {
        pop: run.pop.clone(),
        high_quality_only: run.high_quality,
        min_popmax_af: settings.min_popmax_af,
        qc_params: params,
        qc_counts,
        pca: PcaGlobals {
            n_pcs: result.eigenvalues.len(),
            method: result.method,
            include_unreleasable: run.include_unreleasable,
            training_sample_count: training.len(),
            variant_count: result.loadings.len(),
        },
    };
    let eigenvalues = result
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &eigenvalue)| PcaEigenvalue { pc: i + 1, eigenvalue })
        .collect();
    layout.write(
        &Resource::SubpopPcaEigenvalues(run.clone()),
        &Table::new(globals.clone(), eigenvalues)?,
        shared.overwrite,
    )?;
    layout.write(
        &Resource::SubpopPcaScores(run.clone()),
        &Table::new(globals.clone(), result.scores)?,
        shared.overwrite,
    )?;
    let loadings: Table<PcaLoading, SubpopPcaGlobals> = Table::new(globals, result.loadings)?;
    layout.write(
        &Resource::SubpopPcaLoadings(run.clone()),
        &loadings,
        shared.overwrite,
    )
}

fn run_annotate_subpop_meta(
    shared: &SharedSettings,
    run: &SubpopRun,
    stats: &mut SubpopStats,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let scores: Table<PcaScore, SubpopPcaGlobals> =
        layout.read(&Resource::SubpopPcaScores(run.clone()))?;
    let metadata: Table<SampleMetadata, MetadataGlobals> =
        layout.read(&Resource::FinalizedMetadata)?;

    let rows = annotate_subpop_meta(scores.rows(), metadata.rows(), &run.pop);
    stats.annotated_sample_count = rows.len();
    info!(
        "Annotated {} population samples with subpopulation metadata",
        rows.len().separate_with_commas()
    );
    let table = Table::new(scores.globals.clone(), rows)?;
    layout.write(&Resource::SubpopMeta(run.clone()), &table, shared.overwrite)
}

/// Run the subpopulation analysis stage for one population
///
pub fn run_subpop_analysis(
    shared: &SharedSettings,
    settings: &SubpopAnalysisSettings,
) -> SimpleResult<()> {
    let run = SubpopRun {
        pop: settings.pop.clone(),
        include_unreleasable: settings.include_unreleasable_samples,
        high_quality: settings.high_quality,
    };
    let mut stats = SubpopStats {
        pop: run.pop.clone(),
        ..Default::default()
    };
    if settings.run_subpop_pca {
        run_subpop_pca(shared, settings, &run, &mut stats)?;
    }
    if settings.annotate_subpop_meta {
        run_annotate_subpop_meta(shared, &run, &mut stats)?;
    }
    write_run_stats(shared, &format!("subpop_analysis.{}", run.pop), &stats)
}
