//! Per-sample tabular inputs produced outside of this pipeline
//!

use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8Path;
use log::warn;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

use crate::tsv_utils::{parse_bool, parse_label_list, read_tsv_rows};

/// Subsets whose members are reference panels with trusted population labels
pub const REFERENCE_COHORTS: [&str; 2] = ["hgdp", "tgp"];

/// Project-level sample metadata
///
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ProjectMeta {
    pub s: String,
    pub releasable: bool,

    /// Sample was present in, and released with, the prior release
    pub prior_release: bool,

    /// Population label provided by the contributing project
    pub known_pop: Option<String>,

    /// Population inferred for this sample in the prior release
    pub prior_inferred_pop: Option<String>,

    pub known_subpop: Option<String>,

    pub subsets: BTreeSet<String>,

    pub project_id: Option<String>,

    /// Population label as recorded by the contributing project, before harmonization
    pub project_pop: Option<String>,

    pub v2_pop: Option<String>,
    pub v2_subpop: Option<String>,
    pub subpop_description: Option<String>,
}

impl ProjectMeta {
    pub fn is_reference_cohort(&self) -> bool {
        REFERENCE_COHORTS.iter().any(|x| self.subsets.contains(*x))
    }
}

#[derive(Deserialize)]
struct ProjectMetaRecord {
    s: String,
    releasable: String,
    prior_release: String,
    known_pop: Option<String>,
    prior_inferred_pop: Option<String>,
    known_subpop: Option<String>,
    subsets: Option<String>,

    // Subpopulation annotation columns are optional
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    project_pop: Option<String>,
    #[serde(default)]
    v2_pop: Option<String>,
    #[serde(default)]
    v2_subpop: Option<String>,
    #[serde(default)]
    subpop_description: Option<String>,
}

/// Alignment-level metrics, rates given as proportions
///
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BamMetrics {
    pub s: String,
    pub contam_rate: Option<f64>,
    pub chimeras_rate: Option<f64>,
    pub bases_dp_over_1: Option<f64>,
    pub bases_dp_over_20: Option<f64>,
}

/// Mean depth over chromosomes used for coverage filtering and sex inference
///
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SampleCoverage {
    pub s: String,
    pub chr20_mean_dp: Option<f64>,
    pub chrx_mean_dp: Option<f64>,
    pub chry_mean_dp: Option<f64>,
}

/// Index rows by sample id, failing on duplicates
///
fn index_by_sample<T, F: Fn(&T) -> &str>(
    rows: Vec<T>,
    get_id: F,
    label: &str,
) -> SimpleResult<BTreeMap<String, T>> {
    let mut map = BTreeMap::new();
    for row in rows {
        let s = get_id(&row).to_string();
        if s.is_empty() {
            bail!("Empty sample id in {label} input");
        }
        if map.insert(s.clone(), row).is_some() {
            bail!("Duplicate sample id '{s}' in {label} input");
        }
    }
    Ok(map)
}

fn non_empty(x: Option<String>) -> Option<String> {
    x.filter(|v| !v.is_empty())
}

/// Log a sample set mismatch between two joined inputs, listing the offending ids
///
pub fn warn_sample_mismatch(message: &str, ids: &[&str]) {
    const MAX_LISTED_IDS: usize = 50;
    if ids.is_empty() {
        return;
    }
    let listed = ids.iter().take(MAX_LISTED_IDS).copied().collect::<Vec<_>>().join(", ");
    if ids.len() > MAX_LISTED_IDS {
        warn!(
            "{} samples {message}: {listed} ... ({} more)",
            ids.len(),
            ids.len() - MAX_LISTED_IDS
        );
    } else {
        warn!("{} samples {message}: {listed}", ids.len());
    }
}

pub fn read_project_meta(filename: &Utf8Path) -> SimpleResult<BTreeMap<String, ProjectMeta>> {
    let records: Vec<ProjectMetaRecord> = read_tsv_rows(filename, "project metadata")?;
    let mut rows = Vec::new();
    for r in records {
        rows.push(ProjectMeta {
            releasable: parse_bool(&r.releasable, "releasable")?,
            prior_release: parse_bool(&r.prior_release, "prior_release")?,
            known_pop: non_empty(r.known_pop),
            prior_inferred_pop: non_empty(r.prior_inferred_pop),
            known_subpop: non_empty(r.known_subpop),
            subsets: r
                .subsets
                .as_deref()
                .map(parse_label_list)
                .unwrap_or_default()
                .into_iter()
                .collect(),
            project_id: non_empty(r.project_id),
            project_pop: non_empty(r.project_pop),
            v2_pop: non_empty(r.v2_pop),
            v2_subpop: non_empty(r.v2_subpop),
            subpop_description: non_empty(r.subpop_description),
            s: r.s,
        });
    }
    index_by_sample(rows, |x| &x.s, "project metadata")
}

pub fn read_bam_metrics(filename: &Utf8Path) -> SimpleResult<BTreeMap<String, BamMetrics>> {
    let rows = read_tsv_rows(filename, "alignment metrics")?;
    index_by_sample(rows, |x: &BamMetrics| &x.s, "alignment metrics")
}

pub fn read_sample_coverage(filename: &Utf8Path) -> SimpleResult<BTreeMap<String, SampleCoverage>> {
    let rows = read_tsv_rows(filename, "sample coverage")?;
    index_by_sample(rows, |x: &SampleCoverage| &x.s, "sample coverage")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_project_meta() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "s\treleasable\tprior_release\tknown_pop\tprior_inferred_pop\tknown_subpop\tsubsets"
        )
        .unwrap();
        writeln!(file, "S1\ttrue\tfalse\tafr\t\t\thgdp").unwrap();
        writeln!(file, "S2\tfalse\ttrue\t\tnfe\t\tnon_cancer,non_neuro").unwrap();
        file.flush().unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let meta = read_project_meta(path).unwrap();
        assert_eq!(meta.len(), 2);
        let s1 = &meta["S1"];
        assert!(s1.releasable);
        assert_eq!(s1.known_pop.as_deref(), Some("afr"));
        assert_eq!(s1.prior_inferred_pop, None);
        assert!(s1.is_reference_cohort());
        let s2 = &meta["S2"];
        assert!(s2.prior_release);
        assert_eq!(s2.subsets.len(), 2);
        assert!(!s2.is_reference_cohort());
        assert_eq!(s2.project_id, None);
    }

    #[test]
    fn test_read_subpop_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "s\treleasable\tprior_release\tknown_pop\tprior_inferred_pop\tknown_subpop\tsubsets\tproject_id\tproject_pop\tv2_pop\tv2_subpop\tsubpop_description"
        )
        .unwrap();
        writeln!(file, "S1\ttrue\tfalse\teas\t\tjpt\ttgp\tRP1\tEAS\teas\tjpn\tJapanese in Tokyo").unwrap();
        file.flush().unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let meta = read_project_meta(path).unwrap();
        let s1 = &meta["S1"];
        assert_eq!(s1.project_id.as_deref(), Some("RP1"));
        assert_eq!(s1.v2_subpop.as_deref(), Some("jpn"));
        assert_eq!(s1.subpop_description.as_deref(), Some("Japanese in Tokyo"));
    }

    #[test]
    fn test_duplicate_sample() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "s\tchr20_mean_dp\tchrx_mean_dp\tchry_mean_dp").unwrap();
        writeln!(file, "S1\t30.0\t15.0\t14.0").unwrap();
        writeln!(file, "S1\t31.0\t\t").unwrap();
        file.flush().unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        assert!(read_sample_coverage(path).is_err());
    }

    #[test]
    fn test_missing_metric() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "s\tcontam_rate\tchimeras_rate\tbases_dp_over_1\tbases_dp_over_20"
        )
        .unwrap();
        writeln!(file, "S1\t0.01\t\t6e7\t5e7").unwrap();
        file.flush().unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let metrics = read_bam_metrics(path).unwrap();
        assert_eq!(metrics["S1"].contam_rate, Some(0.01));
        assert_eq!(metrics["S1"].chimeras_rate, None);
    }
}
