//! Per-sample genotype QC metrics
//!

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::genotype_matrix::{AdjCutoffs, GenotypeMatrix, VariantRow};
use crate::table::KeyedRow;

/// Sites are only used for the adj call rate when their raw call rate exceeds this value
pub const ADJ_CALLRATE_MIN_SITE_CALL_RATE: f64 = 0.99;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SampleQcMetrics {
    pub s: String,
    pub n_called: u64,
    pub n_not_called: u64,
    pub n_hom_ref: u64,
    pub n_het: u64,
    pub n_hom_var: u64,
    pub n_non_ref: u64,
    pub n_singleton: u64,
    pub n_snp: u64,
    pub n_insertion: u64,
    pub n_deletion: u64,
    pub n_transition: u64,
    pub n_transversion: u64,
    pub call_rate: Option<f64>,
    pub r_ti_tv: Option<f64>,
    pub r_het_hom_var: Option<f64>,
    pub r_insertion_deletion: Option<f64>,

    /// Fraction of high call-rate sites with an adj genotype
    pub adj_call_rate: Option<f64>,
}

impl KeyedRow for SampleQcMetrics {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

/// Names of the metrics available for outlier detection
pub const QC_METRIC_NAMES: [&str; 11] = [
    "n_snp",
    "n_singleton",
    "r_ti_tv",
    "r_insertion_deletion",
    "n_insertion",
    "n_deletion",
    "r_het_hom_var",
    "n_het",
    "n_hom_var",
    "n_transition",
    "n_transversion",
];

impl SampleQcMetrics {
    /// Lookup a metric value by name
    ///
    pub fn get_metric(&self, name: &str) -> Option<f64> {
        match name {
            "n_called" => Some(self.n_called as f64),
            "n_not_called" => Some(self.n_not_called as f64),
            "n_hom_ref" => Some(self.n_hom_ref as f64),
            "n_het" => Some(self.n_het as f64),
            "n_hom_var" => Some(self.n_hom_var as f64),
            "n_non_ref" => Some(self.n_non_ref as f64),
            "n_singleton" => Some(self.n_singleton as f64),
            "n_snp" => Some(self.n_snp as f64),
            "n_insertion" => Some(self.n_insertion as f64),
            "n_deletion" => Some(self.n_deletion as f64),
            "n_transition" => Some(self.n_transition as f64),
            "n_transversion" => Some(self.n_transversion as f64),
            "call_rate" => self.call_rate,
            "r_ti_tv" => self.r_ti_tv,
            "r_het_hom_var" => self.r_het_hom_var,
            "r_insertion_deletion" => self.r_insertion_deletion,
            "adj_call_rate" => self.adj_call_rate,
            _ => None,
        }
    }

    pub fn is_metric_name(name: &str) -> bool {
        QC_METRIC_NAMES.contains(&name)
            || matches!(
                name,
                "n_called" | "n_not_called" | "n_hom_ref" | "n_non_ref" | "call_rate" | "adj_call_rate"
            )
    }
}

#[derive(Clone, Default)]
struct SampleCounts {
    n_called: u64,
    n_not_called: u64,
    n_hom_ref: u64,
    n_het: u64,
    n_hom_var: u64,
    n_singleton: u64,
    n_snp: u64,
    n_insertion: u64,
    n_deletion: u64,
    n_transition: u64,
    n_transversion: u64,
    n_adj_callrate_sites: u64,
    n_adj_called: u64,
}

impl SampleCounts {
    fn merge(&mut self, other: &Self) {
        self.n_called += other.n_called;
        self.n_not_called += other.n_not_called;
        self.n_hom_ref += other.n_hom_ref;
        self.n_het += other.n_het;
        self.n_hom_var += other.n_hom_var;
        self.n_singleton += other.n_singleton;
        self.n_snp += other.n_snp;
        self.n_insertion += other.n_insertion;
        self.n_deletion += other.n_deletion;
        self.n_transition += other.n_transition;
        self.n_transversion += other.n_transversion;
        self.n_adj_callrate_sites += other.n_adj_callrate_sites;
        self.n_adj_called += other.n_adj_called;
    }
}

fn ratio(num: u64, denom: u64) -> Option<f64> {
    if denom == 0 {
        None
    } else {
        Some(num as f64 / denom as f64)
    }
}

fn add_row_counts(row: &VariantRow, adj_cutoffs: &AdjCutoffs, counts: &mut [SampleCounts]) {
    let key = &row.key;
    let n_called = row.entries.iter().filter(|x| x.gt.is_some()).count();
    let ac = row
        .entries
        .iter()
        .filter_map(|x| x.gt)
        .map(|gt| gt.n_alt_alleles())
        .sum::<u32>();
    let site_call_rate = n_called as f64 / row.entries.len().max(1) as f64;
    let use_for_adj_callrate = site_call_rate > ADJ_CALLRATE_MIN_SITE_CALL_RATE;

    for (entry, c) in row.entries.iter().zip(counts.iter_mut()) {
        if use_for_adj_callrate {
            c.n_adj_callrate_sites += 1;
            if entry.is_adj(adj_cutoffs) {
                c.n_adj_called += 1;
            }
        }

        let Some(gt) = entry.gt else {
            c.n_not_called += 1;
            continue;
        };
        c.n_called += 1;

        let n_alt = gt.n_alt_alleles() as u64;
        if n_alt == 0 {
            c.n_hom_ref += 1;
            continue;
        }
        if gt.is_het() {
            c.n_het += 1;
        } else {
            c.n_hom_var += 1;
        }
        if ac == 1 {
            c.n_singleton += 1;
        }
        if key.is_snv() {
            c.n_snp += n_alt;
            if key.is_transition() {
                c.n_transition += n_alt;
            } else {
                c.n_transversion += n_alt;
            }
        } else if key.is_insertion() {
            c.n_insertion += n_alt;
        } else if key.is_deletion() {
            c.n_deletion += n_alt;
        }
    }
}

/// Compute per-sample QC metrics over the autosomal rows of the genotype matrix
///
pub fn compute_sample_qc_metrics(
    matrix: &GenotypeMatrix,
    adj_cutoffs: &AdjCutoffs,
) -> Vec<SampleQcMetrics> {
    let sample_count = matrix.sample_count();
    let counts = matrix
        .rows
        .par_iter()
        .filter(|row| row.key.locus.in_autosome())
        .fold(
            || vec![SampleCounts::default(); sample_count],
            |mut acc, row| {
                add_row_counts(row, adj_cutoffs, &mut acc);
                acc
            },
        )
        .reduce(
            || vec![SampleCounts::default(); sample_count],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    x.merge(y);
                }
                a
            },
        );

    matrix
        .samples
        .iter()
        .zip(counts)
        .map(|(s, c)| SampleQcMetrics {
            s: s.clone(),
            n_called: c.n_called,
            n_not_called: c.n_not_called,
            n_hom_ref: c.n_hom_ref,
            n_het: c.n_het,
            n_hom_var: c.n_hom_var,
            n_non_ref: c.n_het + c.n_hom_var,
            n_singleton: c.n_singleton,
            n_snp: c.n_snp,
            n_insertion: c.n_insertion,
            n_deletion: c.n_deletion,
            n_transition: c.n_transition,
            n_transversion: c.n_transversion,
            call_rate: ratio(c.n_called, c.n_called + c.n_not_called),
            r_ti_tv: ratio(c.n_transition, c.n_transversion),
            r_het_hom_var: ratio(c.n_het, c.n_hom_var),
            r_insertion_deletion: ratio(c.n_insertion, c.n_deletion),
            adj_call_rate: ratio(c.n_adj_called, c.n_adj_callrate_sites),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype_matrix::tests::entry;
    use crate::genotype_matrix::{Call, GenotypeEntry};
    use crate::locus::{Locus, VariantKey};

    fn row(contig: &str, pos: i64, alleles: [&str; 2], entries: Vec<GenotypeEntry>) -> VariantRow {
        VariantRow {
            key: VariantKey::new(
                Locus::new(contig, pos),
                alleles.iter().map(|x| x.to_string()).collect(),
            ),
            a_index: 1,
            was_split: false,
            entries,
        }
    }

    #[test]
    fn test_sample_qc_metrics() {
        let het = Some(Call::Diploid(0, 1));
        let hom = Some(Call::Diploid(1, 1));
        let reference = Some(Call::Diploid(0, 0));
        let matrix = GenotypeMatrix {
            samples: vec!["S1".to_string(), "S2".to_string()],
            rows: vec![
                // transition, singleton het in S1
                row(
                    "chr1",
                    100,
                    ["A", "G"],
                    vec![entry(het, 40, 20, [10, 10]), entry(reference, 40, 20, [20, 0])],
                ),
                // transversion hom in S2
                row(
                    "chr1",
                    200,
                    ["A", "C"],
                    vec![entry(reference, 40, 20, [20, 0]), entry(hom, 40, 20, [0, 20])],
                ),
                // insertion, S2 not called
                row(
                    "chr1",
                    300,
                    ["A", "AT"],
                    vec![entry(hom, 40, 20, [0, 20]), GenotypeEntry::default()],
                ),
                // non-autosomal rows are ignored
                row(
                    "chrX",
                    300,
                    ["A", "G"],
                    vec![entry(hom, 40, 20, [0, 20]), entry(hom, 40, 20, [0, 20])],
                ),
            ],
        };

        let metrics = compute_sample_qc_metrics(&matrix, &AdjCutoffs::default());
        let s1 = &metrics[0];
        assert_eq!(s1.n_called, 3);
        assert_eq!(s1.n_het, 1);
        assert_eq!(s1.n_hom_var, 1);
        assert_eq!(s1.n_hom_ref, 1);
        assert_eq!(s1.n_singleton, 1);
        assert_eq!(s1.n_snp, 1);
        assert_eq!(s1.n_transition, 1);
        assert_eq!(s1.n_insertion, 2);
        assert_eq!(s1.r_het_hom_var, Some(1.0));
        assert_eq!(s1.r_ti_tv, None);

        let s2 = &metrics[1];
        assert_eq!(s2.n_not_called, 1);
        assert_eq!(s2.n_transversion, 2);
        assert_eq!(s2.n_singleton, 0);
        assert_eq!(s2.call_rate, Some(2.0 / 3.0));

        // Only the two fully called sites count toward the adj call rate
        assert_eq!(s1.adj_call_rate, Some(1.0));
    }
}
