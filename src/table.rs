//! Keyed tables with table-level globals, persisted in MessagePack format
//!
//! Tables are the unit of exchange between pipeline stages. Every row carries a unique key, rows
//! are kept in key order, and all joins between stages are done by key lookup.
//!

use std::fmt;

use camino::Utf8Path;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail, map_err_with};
use thousands::Separable;
use unwrap::unwrap;

/// A table row with a unique ordering key
///
pub trait KeyedRow {
    type Key: Ord + Clone + fmt::Display;

    fn key(&self) -> Self::Key;
}

/// Empty table globals
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct NoGlobals {}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Table<R, G> {
    pub globals: G,
    rows: Vec<R>,
}

impl<R: KeyedRow, G> Table<R, G> {
    /// Create a new table, sorting rows into key order
    ///
    /// Fails if any key occurs more than once.
    ///
    pub fn new(globals: G, mut rows: Vec<R>) -> SimpleResult<Self> {
        rows.sort_by_key(|x| x.key());
        for (a, b) in rows.iter().zip(rows.iter().skip(1)) {
            if a.key() == b.key() {
                bail!("Duplicate table key '{}'", a.key());
            }
        }
        Ok(Self { globals, rows })
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.rows
            .binary_search_by(|x| x.key().cmp(key))
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn contains_key(&self, key: &R::Key) -> bool {
        self.get(key).is_some()
    }
}

/// Write table to a binary file
///
/// The write is atomic: the table is first written to a temporary file in the same directory and
/// then renamed into place, so a failed run never leaves a partial table behind.
///
/// # Arguments
/// * `overwrite` - If false, refuse to replace an existing table
///
pub fn write_table<R: KeyedRow + Serialize, G: Serialize>(
    table: &Table<R, G>,
    filename: &Utf8Path,
    overwrite: bool,
) -> SimpleResult<()> {
    if filename.exists() && !overwrite {
        bail!("Output table '{filename}' already exists. Rerun with --overwrite to replace it");
    }
    if let Some(parent) = filename.parent() {
        map_err_with!(
            std::fs::create_dir_all(parent),
            "Unable to create output directory '{parent}'"
        )?;
    }

    let mut buf = Vec::new();
    unwrap!(
        table.serialize(&mut rmp_serde::Serializer::new(&mut buf)),
        "Unable to serialize table for file: '{filename}'"
    );

    info!(
        "Writing table with {} rows to binary file: '{filename}'",
        table.len().separate_with_commas()
    );

    let tmp_filename = filename.with_extension("tmp");
    map_err_with!(
        std::fs::write(&tmp_filename, buf.as_slice()),
        "Unable to open and write table binary file: '{tmp_filename}'"
    )?;
    map_err_with!(
        std::fs::rename(&tmp_filename, filename),
        "Unable to move table binary file into place: '{filename}'"
    )?;
    Ok(())
}

pub fn read_table<R: KeyedRow + DeserializeOwned, G: DeserializeOwned>(
    filename: &Utf8Path,
) -> SimpleResult<Table<R, G>> {
    info!("Reading table from binary file: '{filename}'");
    let buf = map_err_with!(
        std::fs::read(filename),
        "Unable to open and read table binary file: '{filename}'"
    )?;
    let table = map_err_with!(
        rmp_serde::from_slice(&buf),
        "Unable to parse table binary file: '{filename}'"
    )?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::collections::BTreeMap;

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    struct TestRow {
        s: String,
        value: f64,
    }

    impl KeyedRow for TestRow {
        type Key = String;
        fn key(&self) -> String {
            self.s.clone()
        }
    }

    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    struct TestGlobals {
        labels: BTreeMap<String, usize>,
    }

    fn test_table() -> Table<TestRow, TestGlobals> {
        let rows = vec![
            TestRow {
                s: "b".to_string(),
                value: 2.0,
            },
            TestRow {
                s: "a".to_string(),
                value: 1.0,
            },
        ];
        let mut globals = TestGlobals::default();
        globals.labels.insert("x".to_string(), 1);
        globals.labels.insert("y".to_string(), 2);
        Table::new(globals, rows).unwrap()
    }

    #[test]
    fn test_table_order_and_lookup() {
        let table = test_table();
        assert_eq!(table.rows()[0].s, "a");
        assert_eq!(table.get(&"b".to_string()).unwrap().value, 2.0);
        assert!(table.get(&"c".to_string()).is_none());
    }

    #[test]
    fn test_duplicate_key() {
        let rows = vec![
            TestRow {
                s: "a".to_string(),
                value: 1.0,
            },
            TestRow {
                s: "a".to_string(),
                value: 2.0,
            },
        ];
        assert!(Table::new(NoGlobals {}, rows).is_err());
    }

    #[test]
    fn test_overwrite_gate_and_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let filename = Utf8PathBuf::from_path_buf(dir.path().join("t.mpack")).unwrap();
        let table = test_table();

        write_table(&table, &filename, false).unwrap();
        let first = std::fs::read(&filename).unwrap();

        assert!(write_table(&table, &filename, false).is_err());

        write_table(&table, &filename, true).unwrap();
        let second = std::fs::read(&filename).unwrap();
        assert_eq!(first, second);

        let table2: Table<TestRow, TestGlobals> = read_table(&filename).unwrap();
        assert_eq!(table2.rows(), table.rows());
        assert_eq!(table2.globals, table.globals);
    }
}
