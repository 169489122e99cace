mod cuking;
pub mod pairs;
pub mod prune;
pub mod relationships;

use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use simple_error::{SimpleResult, bail};
use thousands::Separable;

pub use self::pairs::{Relationship, RelationshipCutoffs, RelatednessGlobals, SamplePair};
use self::prune::{
    RankInput, RelatedSampleToDrop, SampleRank, compute_related_samples_to_drop,
    default_rank_order, rank_samples,
};
use crate::cli::{RelatednessSettings, SharedSettings};
use crate::genotype_matrix::read_genotype_matrix;
use crate::log_utils::log_category_counts;
use crate::resources::{Resource, ResourceLayout};
use crate::run_stats::{RelatednessStats, write_run_stats};
use crate::sample_meta::{read_project_meta, read_sample_coverage, warn_sample_mismatch};
use crate::sample_qc::hard_filters::{HardFilterGlobals, SampleHardFilters};
use crate::table::{NoGlobals, Table};

pub type RelatednessTable = Table<SamplePair, RelatednessGlobals>;

/// Read the sample rank table as a map from sample id to rank
///
pub fn read_sample_ranks(layout: &ResourceLayout) -> SimpleResult<BTreeMap<String, usize>> {
    let ranks: Table<SampleRank, NoGlobals> = layout.read(&Resource::SampleRankings)?;
    Ok(ranks
        .into_rows()
        .into_iter()
        .map(|x| (x.s, x.rank))
        .collect())
}

fn prepare_inputs(
    shared: &SharedSettings,
    settings: &RelatednessSettings,
    stats: &mut RelatednessStats,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let Some(vcf_filename) = settings.vcf_filename.as_deref() else {
        bail!("--vcf is required with --prepare-inputs");
    };
    let matrix = read_genotype_matrix(Utf8Path::new(vcf_filename), layout.record_limit())?;
    stats.cuking_input_sample_count = matrix.sample_count();
    stats.cuking_input_variant_count = cuking::write_cuking_input(
        &matrix,
        &layout.path(&Resource::CukingInput),
        shared.overwrite,
    )?;
    Ok(())
}

fn create_relatedness_table(
    shared: &SharedSettings,
    settings: &RelatednessSettings,
    stats: &mut RelatednessStats,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let filename = match settings.cuking_output_filename.as_deref() {
        Some(x) => Utf8PathBuf::from(x),
        None => layout.require(&Resource::CukingOutput)?,
    };
    let pairs = cuking::read_cuking_output(&filename, &settings.relationship_cutoffs)?;

    stats.pair_count = pairs.len();
    for pair in pairs.iter() {
        *stats
            .relationship_counts
            .entry(pair.relationship.to_string())
            .or_insert(0) += 1;
    }
    log_category_counts("Sample pairs classified as", &stats.relationship_counts);

    let globals = RelatednessGlobals {
        relationship_cutoffs: settings.relationship_cutoffs.clone(),
    };
    let table = Table::new(globals, pairs)?;
    layout.write(&Resource::Relatedness, &table, shared.overwrite)
}

fn compute_samples_to_drop(
    shared: &SharedSettings,
    settings: &RelatednessSettings,
    stats: &mut RelatednessStats,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let (Some(meta_filename), Some(coverage_filename)) = (
        settings.project_meta_filename.as_deref(),
        settings.coverage_filename.as_deref(),
    ) else {
        bail!("--project-meta and --coverage are required with --compute-related-samples-to-drop");
    };

    let relatedness: RelatednessTable = layout.read(&Resource::Relatedness)?;
    let hard_filters: Table<SampleHardFilters, HardFilterGlobals> =
        layout.read(&Resource::HardFilters)?;
    let meta = read_project_meta(Utf8Path::new(meta_filename))?;
    let coverage = read_sample_coverage(Utf8Path::new(coverage_filename))?;

    let missing_meta = hard_filters
        .rows()
        .iter()
        .map(|x| x.s.as_str())
        .filter(|s| !meta.contains_key(*s))
        .collect::<Vec<_>>();
    warn_sample_mismatch(
        "have no project metadata and are ranked as unreleasable",
        &missing_meta,
    );

    let rank_inputs = hard_filters
        .rows()
        .iter()
        .map(|x| {
            let m = meta.get(&x.s);
            RankInput {
                s: x.s.clone(),
                hard_filtered: x.hard_filtered,
                prior_release: m.is_some_and(|m| m.prior_release),
                releasable: m.is_some_and(|m| m.releasable),
                chr20_mean_dp: coverage.get(&x.s).and_then(|c| c.chr20_mean_dp),
            }
        })
        .collect::<Vec<_>>();
    let ranked = rank_samples(rank_inputs, default_rank_order);
    stats.ranked_sample_count = ranked.len();
    let ranks = ranked
        .iter()
        .map(|x| (x.s.clone(), x.rank))
        .collect::<BTreeMap<_, _>>();
    layout.write(
        &Resource::SampleRankings,
        &Table::new(NoGlobals {}, ranked)?,
        shared.overwrite,
    )?;

    let filtered = hard_filters
        .rows()
        .iter()
        .filter(|x| x.hard_filtered)
        .map(|x| x.s.clone())
        .collect::<BTreeSet<_>>();
    let to_drop = compute_related_samples_to_drop(relatedness.rows(), &ranks, &filtered)?;
    stats.related_samples_to_drop_count = to_drop.len();
    info!(
        "Selected {} related samples to drop",
        to_drop.len().separate_with_commas()
    );

    let rows = to_drop
        .into_iter()
        .map(|s| RelatedSampleToDrop {
            rank: ranks[&s],
            s,
        })
        .collect();
    layout.write(
        &Resource::RelatedSamplesToDrop,
        &Table::new(NoGlobals {}, rows)?,
        shared.overwrite,
    )
}

/// Run the relatedness stage
///
pub fn run_relatedness(shared: &SharedSettings, settings: &RelatednessSettings) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    if settings.print_cuking_command {
        let command = cuking::get_cuking_command(
            &layout.path(&Resource::CukingInput),
            &layout.path(&Resource::CukingOutput),
            settings
                .min_emission_kinship
                .unwrap_or(settings.relationship_cutoffs.second_degree_min_kin),
            settings.cuking_split_factor,
        );
        info!("Relatedness engine command line:");
        println!("{command}");
        return Ok(());
    }

    let mut stats = RelatednessStats::default();
    if settings.prepare_inputs {
        prepare_inputs(shared, settings, &mut stats)?;
    }
    if settings.create_relatedness_table {
        create_relatedness_table(shared, settings, &mut stats)?;
    }
    if settings.compute_related_samples_to_drop {
        compute_samples_to_drop(shared, settings, &mut stats)?;
    }
    write_run_stats(shared, "relatedness", &stats)
}
