//! Readers and writers for tab-separated text inputs and exports
//!

use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use camino::Utf8Path;
use log::info;
use serde::Deserialize;
use simple_error::{SimpleResult, bail, map_err_with};

/// Open a text file for reading, transparently decompressing gzip input
///
pub fn open_text_reader(filename: &Utf8Path) -> SimpleResult<Box<dyn Read>> {
    let file = map_err_with!(File::open(filename), "Unable to open file: '{filename}'")?;
    if filename.as_str().ends_with(".gz") || filename.as_str().ends_with(".bgz") {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Open a headed tab-separated file
///
pub fn open_tsv_reader(filename: &Utf8Path) -> SimpleResult<csv::Reader<Box<dyn Read>>> {
    let reader = open_text_reader(filename)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader))
}

/// Read every record of a headed tab-separated file
///
pub fn read_tsv_rows<T: for<'de> Deserialize<'de>>(
    filename: &Utf8Path,
    label: &str,
) -> SimpleResult<Vec<T>> {
    info!("Reading {label} from file '{filename}'");
    let mut reader = open_tsv_reader(filename)?;
    let mut rows = Vec::new();
    for (line_index, result) in reader.deserialize().enumerate() {
        let row: T = map_err_with!(
            result,
            "Failed to parse record on line {} of {label} file: '{filename}'",
            line_index + 2
        )?;
        rows.push(row);
    }
    Ok(rows)
}

/// Read a one-sample-per-line ID list, skipping blank and '#' lines
///
pub fn read_id_list(filename: &Utf8Path, label: &str) -> SimpleResult<Vec<String>> {
    info!("Reading {label} list from file '{filename}'");
    let reader = BufReader::new(open_text_reader(filename)?);
    let mut ids = Vec::new();
    for (line_index, line) in reader.lines().enumerate() {
        let line = map_err_with!(
            line,
            "Can't read line {} from {label} file: '{filename}'",
            line_index + 1
        )?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        ids.push(line.to_string());
    }
    Ok(ids)
}

pub fn parse_bool(value: &str, label: &str) -> SimpleResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Ok(true),
        "false" | "f" | "0" | "no" | "" => Ok(false),
        _ => bail!("Can't parse boolean value '{value}' for field '{label}'"),
    }
}

/// Split a comma-separated label list, dropping empty entries
pub fn parse_label_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
        .collect()
}

/// Write a headed tab-separated file from string records
///
pub fn write_tsv(
    filename: &Utf8Path,
    header: &[String],
    records: &[Vec<String>],
    overwrite: bool,
) -> SimpleResult<()> {
    if filename.exists() && !overwrite {
        bail!("Output file '{filename}' already exists. Rerun with --overwrite to replace it");
    }
    if let Some(parent) = filename.parent() {
        map_err_with!(
            std::fs::create_dir_all(parent),
            "Unable to create output directory '{parent}'"
        )?;
    }
    info!("Writing tab-separated file: '{filename}'");
    let mut writer = map_err_with!(
        csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(filename),
        "Unable to create file: '{filename}'"
    )?;
    map_err_with!(writer.write_record(header), "Unable to write to '{filename}'")?;
    for record in records {
        map_err_with!(writer.write_record(record), "Unable to write to '{filename}'")?;
    }
    map_err_with!(writer.flush(), "Unable to write to '{filename}'")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::io::Write;

    #[test]
    fn test_read_id_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# failed fingerprinting").unwrap();
        writeln!(file, "S1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, " S2 ").unwrap();
        file.flush().unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        assert_eq!(read_id_list(path, "test").unwrap(), vec!["S1", "S2"]);
    }

    #[test]
    fn test_gzip_reader() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let dir = tempfile::tempdir().unwrap();
        let filename = Utf8PathBuf::from_path_buf(dir.path().join("ids.txt.gz")).unwrap();
        let mut encoder = GzEncoder::new(File::create(&filename).unwrap(), Compression::default());
        writeln!(encoder, "S1\nS2").unwrap();
        encoder.finish().unwrap();
        assert_eq!(read_id_list(&filename, "test").unwrap(), vec!["S1", "S2"]);
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_bool("True", "x").unwrap());
        assert!(!parse_bool("", "x").unwrap());
        assert!(parse_bool("maybe", "x").is_err());
        assert_eq!(parse_label_list("hgdp, tgp,,"), vec!["hgdp", "tgp"]);
    }
}
