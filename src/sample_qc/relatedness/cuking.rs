//! Input and output contracts of the external pairwise relatedness engine (cuKING)
//!

use std::collections::BTreeSet;

use camino::Utf8Path;
use log::info;
use serde::Deserialize;
use simple_error::{SimpleResult, bail, map_err_with};
use thousands::Separable;

use super::pairs::{RelationshipCutoffs, SamplePair, get_relationship};
use crate::genotype_matrix::{GenotypeMatrix, VariantRow};
use crate::tsv_utils::{open_tsv_reader, write_tsv};

/// Dosage character for one genotype in the engine input format
fn dosage_char(row: &VariantRow, sample_index: usize) -> char {
    match row.entries[sample_index].gt {
        Some(gt) if gt.ploidy() == 2 => match gt.n_alt_alleles() {
            0 => '0',
            1 => '1',
            _ => '2',
        },
        _ => '.',
    }
}

/// Rows usable by the relatedness engine: biallelic autosomal sites
fn is_cuking_site(row: &VariantRow) -> bool {
    row.key.is_biallelic() && row.key.locus.in_autosome()
}

/// Write the dense QC matrix as one dosage string per sample
///
/// Each line holds the sample id, the number of variants, and a string with one dosage character
/// (`0`, `1`, `2` or `.` for missing) per variant, in matrix row order.
///
/// Returns the number of variants written per sample.
///
pub fn write_cuking_input(
    matrix: &GenotypeMatrix,
    filename: &Utf8Path,
    overwrite: bool,
) -> SimpleResult<usize> {
    let rows = matrix
        .rows
        .iter()
        .filter(|x| is_cuking_site(x))
        .collect::<Vec<_>>();
    if rows.is_empty() {
        bail!("No biallelic autosomal sites available for relatedness input");
    }
    let variant_count = rows.len();
    info!(
        "Writing relatedness engine input for {} samples over {} variants",
        matrix.sample_count().separate_with_commas(),
        variant_count.separate_with_commas()
    );

    let header = ["s", "n_variants", "dosages"].map(String::from);
    let records = matrix
        .samples
        .iter()
        .enumerate()
        .map(|(sample_index, s)| {
            let dosages = rows
                .iter()
                .map(|row| dosage_char(row, sample_index))
                .collect::<String>();
            vec![s.clone(), variant_count.to_string(), dosages]
        })
        .collect::<Vec<_>>();
    write_tsv(filename, &header, &records, overwrite)?;
    Ok(variant_count)
}

/// Command line for the external relatedness engine
///
pub fn get_cuking_command(
    input_filename: &Utf8Path,
    output_filename: &Utf8Path,
    min_emission_kinship: f64,
    split_factor: usize,
) -> String {
    format!(
        "cuking --input={input_filename} --output={output_filename} --king-coeff-threshold={min_emission_kinship} --split-factor={split_factor}"
    )
}

#[derive(Deserialize)]
struct CukingRecord {
    i: String,
    j: String,
    kin: f64,
    ibd0: f64,
    ibd1: f64,
    ibd2: f64,
}

/// Read engine output into canonically ordered, classified sample pairs
///
/// Pairs are stored with `i < j`. Self pairs, duplicate pairs and non-finite statistics are
/// errors.
///
pub fn read_cuking_output(
    filename: &Utf8Path,
    cutoffs: &RelationshipCutoffs,
) -> SimpleResult<Vec<SamplePair>> {
    info!("Reading relatedness engine output from file '{filename}'");
    let mut reader = open_tsv_reader(filename)?;
    let mut seen = BTreeSet::new();
    let mut pairs = Vec::new();
    for (line_index, result) in reader.deserialize().enumerate() {
        let line_number = line_index + 2;
        let r: CukingRecord = map_err_with!(
            result,
            "Failed to parse record on line {line_number} of relatedness file: '{filename}'"
        )?;
        if r.i == r.j {
            bail!("Self pair for sample '{}' on line {line_number} of '{filename}'", r.i);
        }
        if ![r.kin, r.ibd0, r.ibd1, r.ibd2].iter().all(|x| x.is_finite()) {
            bail!("Non-finite kinship statistic on line {line_number} of '{filename}'");
        }
        let (i, j) = if r.i < r.j { (r.i, r.j) } else { (r.j, r.i) };
        if !seen.insert((i.clone(), j.clone())) {
            bail!("Duplicate sample pair ({i}, {j}) in '{filename}'");
        }
        let relationship = get_relationship(r.kin, r.ibd0, r.ibd1, r.ibd2, cutoffs);
        pairs.push(SamplePair {
            i,
            j,
            kin: r.kin,
            ibd0: r.ibd0,
            ibd1: r.ibd1,
            ibd2: r.ibd2,
            relationship,
        });
    }
    info!(
        "Read {} sample pairs from relatedness engine output",
        pairs.len().separate_with_commas()
    );
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype_matrix::tests::entry;
    use crate::genotype_matrix::{Call, GenotypeEntry};
    use crate::locus::{Locus, VariantKey};
    use crate::sample_qc::relatedness::pairs::Relationship;
    use std::io::Write;

    #[test]
    fn test_write_cuking_input() {
        let row = |contig: &str, entries: Vec<GenotypeEntry>| VariantRow {
            key: VariantKey::new(
                Locus::new(contig, 100),
                vec!["A".to_string(), "G".to_string()],
            ),
            a_index: 1,
            was_split: false,
            entries,
        };
        let matrix = GenotypeMatrix {
            samples: vec!["S1".to_string(), "S2".to_string()],
            rows: vec![
                row(
                    "chr1",
                    vec![
                        entry(Some(Call::Diploid(0, 1)), 30, 20, [10, 10]),
                        entry(Some(Call::Diploid(1, 1)), 30, 20, [0, 20]),
                    ],
                ),
                row(
                    "chr2",
                    vec![
                        entry(Some(Call::Diploid(0, 0)), 30, 20, [20, 0]),
                        GenotypeEntry::default(),
                    ],
                ),
                // sex chromosome sites are skipped
                row(
                    "chrX",
                    vec![
                        entry(Some(Call::Diploid(0, 0)), 30, 20, [20, 0]),
                        entry(Some(Call::Diploid(0, 0)), 30, 20, [20, 0]),
                    ],
                ),
            ],
        };

        let dir = tempfile::tempdir().unwrap();
        let filename = Utf8Path::from_path(dir.path()).unwrap().join("cuking.tsv");
        let n = write_cuking_input(&matrix, &filename, false).unwrap();
        assert_eq!(n, 2);
        let content = std::fs::read_to_string(&filename).unwrap();
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines, vec!["s\tn_variants\tdosages", "S1\t2\t10", "S2\t2\t2."]);

        // Refuse to replace existing output without overwrite
        assert!(write_cuking_input(&matrix, &filename, false).is_err());
        assert!(write_cuking_input(&matrix, &filename, true).is_ok());
    }

    #[test]
    fn test_read_cuking_output() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "i\tj\tkin\tibd0\tibd1\tibd2").unwrap();
        writeln!(file, "S2\tS1\t0.25\t0.0\t1.0\t0.0").unwrap();
        writeln!(file, "S1\tS3\t0.05\t0.9\t0.1\t0.0").unwrap();
        file.flush().unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let pairs = read_cuking_output(path, &RelationshipCutoffs::default()).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].i.as_str(), pairs[0].j.as_str()), ("S1", "S2"));
        assert_eq!(pairs[0].relationship, Relationship::ParentChild);
        assert_eq!(pairs[1].relationship, Relationship::Unrelated);
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "i\tj\tkin\tibd0\tibd1\tibd2").unwrap();
        writeln!(file, "S1\tS2\t0.25\t0.0\t1.0\t0.0").unwrap();
        writeln!(file, "S2\tS1\t0.25\t0.0\t1.0\t0.0").unwrap();
        file.flush().unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        assert!(read_cuking_output(path, &RelationshipCutoffs::default()).is_err());
    }

    #[test]
    fn test_self_pair_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "i\tj\tkin\tibd0\tibd1\tibd2").unwrap();
        writeln!(file, "S1\tS1\t0.5\t0.0\t0.0\t1.0").unwrap();
        file.flush().unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        assert!(read_cuking_output(path, &RelationshipCutoffs::default()).is_err());
    }
}
