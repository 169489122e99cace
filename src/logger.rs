//! Logger setup for pipeline stages
//!
//! Each stage logs to stderr and to its own file under `<run-dir>/logs/`, so the log history of
//! every stage in a pipeline version is kept next to the stage outputs.
//!

use camino::{Utf8Path, Utf8PathBuf};

use crate::globals::PROGRAM_NAME;

pub fn stage_log_filename(run_dir: &Utf8Path, stage: &str) -> Utf8PathBuf {
    run_dir.join("logs").join(format!("{stage}.log"))
}

fn setup_logger(log_filename: &Utf8Path, stage: &str, debug: bool) -> Result<(), fern::InitError> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let stage = stage.to_string();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{PROGRAM_NAME}:{stage}][{}] {message}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.level(),
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .chain(fern::log_file(log_filename)?)
        .apply()?;
    Ok(())
}

/// Create the versioned run directory and its log directory, then log the given stage there
///
/// Repeated runs of a stage append to the same log file.
///
pub fn setup_run_dir_and_logger(run_dir: &Utf8Path, stage: &str, debug: bool) {
    // No logger is available yet, so failures here go straight to stderr
    if run_dir.exists() && !run_dir.is_dir() {
        eprintln!(
            "Invalid command-line setting: Run directory path exists and is not a directory: '{run_dir}'"
        );
        std::process::exit(exitcode::USAGE);
    }
    let log_filename = stage_log_filename(run_dir, stage);
    if let Some(log_dir) = log_filename.parent() {
        if let Err(err) = std::fs::create_dir_all(log_dir) {
            eprintln!("Unable to create log directory: '{log_dir}': {err}");
            std::process::exit(exitcode::CANTCREAT);
        }
    }
    if let Err(err) = setup_logger(&log_filename, stage, debug) {
        eprintln!("Unable to open stage log file: '{log_filename}': {err}");
        std::process::exit(exitcode::CANTCREAT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_log_filename() {
        assert_eq!(
            stage_log_filename(Utf8Path::new("/data/v4.0"), "sex_inference"),
            Utf8PathBuf::from("/data/v4.0/logs/sex_inference.log")
        );
    }
}
