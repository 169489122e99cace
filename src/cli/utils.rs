use simple_error::{SimpleResult, bail};

/// Check a required input filename
///
/// Assumes no logger has been configured yet
///
pub fn check_required_filename(filename: &str, label: &str) -> SimpleResult<()> {
    if filename.is_empty() {
        bail!("Must specify {label} file");
    }
    let path = std::path::Path::new(&filename);
    if !path.exists() {
        bail!("Can't find specified {label} file: '{filename}'");
    }
    if !path.is_file() {
        bail!("Specified {label} file path does not appear to be a file: '{filename}'");
    }
    Ok(())
}

/// Check an optional input filename
///
/// Assumes no logger has been configured yet
///
pub fn check_optional_filename(filename_opt: Option<&String>, label: &str) -> SimpleResult<()> {
    if let Some(filename) = filename_opt {
        check_required_filename(filename, label)?;
    }
    Ok(())
}

/// Check an input filename which is required only when a given stage flag is set
///
pub fn check_stage_filename(
    filename_opt: Option<&String>,
    label: &str,
    option_name: &str,
    stage_flag: &str,
) -> SimpleResult<()> {
    match filename_opt {
        Some(filename) => check_required_filename(filename, label),
        None => bail!("{option_name} is required with {stage_flag}"),
    }
}

/// Check that a value is a proportion in [0,1]
///
pub fn check_proportion(value: f64, option_name: &str) -> SimpleResult<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{option_name} must be a proportion in [0,1], found {value}");
    }
    Ok(())
}

/// Check a two-value range option and return it as (lower, upper)
///
pub fn check_range(values: &[f64], option_name: &str) -> SimpleResult<(f64, f64)> {
    if values.len() != 2 {
        bail!(
            "{option_name} requires exactly two comma-separated values, found {}",
            values.len()
        );
    }
    if values[0] > values[1] {
        bail!(
            "{option_name} lower bound {} is greater than upper bound {}",
            values[0],
            values[1]
        );
    }
    Ok((values[0], values[1]))
}
