mod cli;
mod freq;
mod genome_regions;
mod genotype_matrix;
mod globals;
mod locus;
mod log_utils;
mod logger;
mod release;
mod resources;
mod run_stats;
mod sample_meta;
mod sample_qc;
mod stats_utils;
mod table;
mod tsv_utils;

use std::{error, process};

use hhmmss::Hhmmss;
use log::info;
use simple_error::SimpleResult;

use crate::cli::Commands;
use crate::freq::run_generate_freq;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_run_dir_and_logger;
use crate::release::run_create_release;
use crate::sample_qc::{
    run_assign_ancestry, run_finalize_metadata, run_hard_filters, run_interval_qc,
    run_outlier_filtering, run_relatedness, run_sex_inference, run_subpop_analysis,
};

/// Dispatch to the stage selected on the command line
///
fn run_command(settings: &cli::Settings) -> SimpleResult<()> {
    let shared = &settings.shared;
    match &settings.command {
        Commands::HardFilters(x) => run_hard_filters(shared, x),
        Commands::SexInference(x) => run_sex_inference(shared, x),
        Commands::IntervalQc(x) => run_interval_qc(shared, x),
        Commands::Relatedness(x) => run_relatedness(shared, x),
        Commands::AssignAncestry(x) => run_assign_ancestry(shared, x),
        Commands::OutlierFiltering(x) => run_outlier_filtering(shared, x),
        Commands::SubpopAnalysis(x) => run_subpop_analysis(shared, x),
        Commands::FinalizeMetadata(x) => run_finalize_metadata(shared, x),
        Commands::GenerateFreq(x) => run_generate_freq(shared, x),
        Commands::CreateRelease(x) => run_create_release(shared, x),
    }
}

fn run(settings: &cli::Settings) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running on {} threads", settings.shared.thread_count);

    let start = std::time::Instant::now();

    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.shared.thread_count)
        .build()?;
    worker_pool.install(|| run_command(settings))?;

    let stage = settings.command.stage_name();
    if let Some(channel) = &settings.shared.slack_channel {
        info!("Stage {stage} completed, notifying slack channel '{channel}'");
    }
    info!(
        "{PROGRAM_NAME} {stage} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    // Setup logger, including creation of the versioned run directory for the log file:
    let layout = settings.shared.resource_layout();
    setup_run_dir_and_logger(
        layout.run_dir(),
        settings.command.stage_name(),
        settings.shared.debug,
    );

    if let Err(err) = run(&settings) {
        log::error!("{err}");
        process::exit(2);
    }
}
