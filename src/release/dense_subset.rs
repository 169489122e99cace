//! Dense genotype matrix of the release subset, joined to sample and variant annotations
//!

use std::collections::{BTreeMap, HashSet};

use log::info;
use serde::{Deserialize, Serialize};
use thousands::Separable;

use super::annotations::{VariantAnnotation, VariantAnnotationGlobals};
use super::sample_annotations::SubsetSampleAnnotation;
use crate::genotype_matrix::{
    AdjCutoffs, Call, GenotypeEntry, GenotypeMatrix, VariantRow, adjust_sex_ploidy,
};
use crate::locus::VariantKey;
use crate::sample_meta::warn_sample_mismatch;
use crate::sample_qc::sex_inference::SexKaryotype;
use crate::table::{KeyedRow, Table};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DenseGenotype {
    /// Call after sex ploidy adjustment
    pub gt: Option<Call>,
    pub gq: Option<i32>,
    pub dp: Option<i32>,
    pub ad: Option<[i32; 2]>,
    pub adj: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DenseSubsetRow {
    pub annotation: VariantAnnotation,

    /// One genotype per sample, in the sample order of the table globals
    pub genotypes: Vec<DenseGenotype>,
}

impl KeyedRow for DenseSubsetRow {
    type Key = VariantKey;
    fn key(&self) -> VariantKey {
        self.annotation.key.clone()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DenseSubsetGlobals {
    pub samples: Vec<SubsetSampleAnnotation>,
    pub variant_annotations: VariantAnnotationGlobals,
    pub adj_cutoffs: AdjCutoffs,
}

#[derive(Debug, Default, PartialEq)]
pub struct DenseSubsetCounts {
    pub input_variant_count: usize,
    pub alleles: SubsetAlleleCounts,
    pub excluded_no_annotation_count: usize,
    pub excluded_as_lowqual_count: usize,
    pub excluded_telomere_or_centromere_count: usize,
    pub excluded_no_alt_count: usize,
}

#[derive(Debug, Default, PartialEq)]
pub struct SubsetAlleleCounts {
    /// Alt alleles without a non-reference call in the subset
    pub dropped_allele_count: usize,

    /// Multiallelic records left with a single alt allele
    pub unsplit_record_count: usize,
}

/// Restrict every input record to the alt alleles carried by the subset samples
///
/// Rows split from one record are consecutive with increasing `a_index`. Alt alleles without a
/// non-reference call are dropped, and the remaining alleles of each record are re-indexed. A
/// record left with one alt allele is no longer marked as split. All kept rows are re-keyed by
/// their minimal representation.
///
pub fn adjust_subset_alleles(matrix: &mut GenotypeMatrix) -> SubsetAlleleCounts {
    let mut counts = SubsetAlleleCounts::default();
    let mut records: Vec<Vec<VariantRow>> = Vec::new();
    for row in std::mem::take(&mut matrix.rows) {
        let continues_record = row.was_split
            && records
                .last()
                .and_then(|x| x.last())
                .is_some_and(|prev| prev.was_split && prev.a_index < row.a_index);
        match records.last_mut() {
            Some(record) if continues_record => record.push(row),
            _ => records.push(vec![row]),
        }
    }

    for record in records {
        let was_split = record.len() > 1 || record.iter().any(|x| x.was_split);
        let kept = record
            .into_iter()
            .filter(|row| {
                let carried = row
                    .entries
                    .iter()
                    .any(|x| x.gt.is_some_and(|gt| gt.is_non_ref()));
                if !carried {
                    counts.dropped_allele_count += 1;
                }
                carried
            })
            .collect::<Vec<_>>();
        if was_split && kept.len() == 1 {
            counts.unsplit_record_count += 1;
        }
        let still_split = kept.len() > 1;
        for (i, mut row) in kept.into_iter().enumerate() {
            row.a_index = i + 1;
            row.was_split = still_split;
            row.key = row.key.min_rep();
            matrix.rows.push(row);
        }
    }
    counts
}

fn adjust_entry(
    entry: &GenotypeEntry,
    annotation: &VariantAnnotation,
    karyotype: Option<SexKaryotype>,
    adj_cutoffs: &AdjCutoffs,
) -> DenseGenotype {
    let gt = adjust_sex_ploidy(entry.gt, &annotation.key.locus, karyotype);
    let adjusted = GenotypeEntry {
        gt,
        ..entry.clone()
    };
    DenseGenotype {
        gt,
        gq: entry.gq,
        dp: entry.dp,
        ad: entry.ad,
        adj: adjusted.is_adj(adj_cutoffs),
    }
}

/// Build the dense subset rows from a genotype matrix
///
/// Matrix samples without a subset sample annotation are dropped. Variants are kept only if they
/// have a variant annotation, are not allele-specific low quality, are outside telomere and
/// centromere regions, and retain at least one non-reference call after sex ploidy adjustment.
///
pub fn build_dense_subset<G>(
    matrix: &GenotypeMatrix,
    sample_annotations: &Table<SubsetSampleAnnotation, G>,
    variant_annotations: &Table<VariantAnnotation, VariantAnnotationGlobals>,
    adj_cutoffs: &AdjCutoffs,
) -> (Vec<DenseSubsetRow>, Vec<SubsetSampleAnnotation>, DenseSubsetCounts) {
    let missing = matrix
        .samples
        .iter()
        .filter(|s| !sample_annotations.contains_key(*s))
        .map(|x| x.as_str())
        .collect::<Vec<_>>();
    warn_sample_mismatch(
        "in the subset genotype matrix have no subset sample annotation and are excluded",
        &missing,
    );

    let keep = matrix
        .samples
        .iter()
        .filter(|s| sample_annotations.contains_key(*s))
        .map(|x| x.as_str())
        .collect::<HashSet<_>>();
    let mut matrix = matrix.select_samples(&keep);
    let input_variant_count = matrix.rows.len();
    let allele_counts = adjust_subset_alleles(&mut matrix);
    if allele_counts.dropped_allele_count > 0 {
        info!(
            "Dropped {} alt alleles not carried by subset samples, {} records are no longer multiallelic",
            allele_counts.dropped_allele_count.separate_with_commas(),
            allele_counts.unsplit_record_count.separate_with_commas()
        );
    }
    let samples = matrix
        .samples
        .iter()
        .filter_map(|s| sample_annotations.get(s).cloned())
        .collect::<Vec<_>>();
    let karyotypes = samples
        .iter()
        .map(|x| x.sex_imputation.as_ref().map(|x| x.sex_karyotype))
        .collect::<Vec<_>>();

    let mut counts = DenseSubsetCounts {
        input_variant_count,
        alleles: allele_counts,
        ..Default::default()
    };
    let mut rows = Vec::new();
    for row in matrix.rows.iter() {
        let Some(annotation) = variant_annotations.get(&row.key) else {
            counts.excluded_no_annotation_count += 1;
            continue;
        };
        if annotation.as_lowqual {
            counts.excluded_as_lowqual_count += 1;
            continue;
        }
        if annotation.telomere_or_centromere {
            counts.excluded_telomere_or_centromere_count += 1;
            continue;
        }
        let genotypes = row
            .entries
            .iter()
            .zip(karyotypes.iter())
            .map(|(entry, karyotype)| adjust_entry(entry, annotation, *karyotype, adj_cutoffs))
            .collect::<Vec<_>>();
        if !genotypes.iter().any(|x| x.gt.is_some_and(|gt| gt.is_non_ref())) {
            counts.excluded_no_alt_count += 1;
            continue;
        }
        rows.push(DenseSubsetRow {
            annotation: annotation.clone(),
            genotypes,
        });
    }

    let exclusions = BTreeMap::from([
        ("no variant annotation", counts.excluded_no_annotation_count),
        ("allele-specific low quality", counts.excluded_as_lowqual_count),
        (
            "telomere or centromere",
            counts.excluded_telomere_or_centromere_count,
        ),
        ("no remaining alt call", counts.excluded_no_alt_count),
    ]);
    for (reason, count) in exclusions.iter().filter(|(_, x)| **x > 0) {
        info!(
            "Excluded {} dense subset variants: {reason}",
            count.separate_with_commas()
        );
    }
    info!(
        "Kept {} of {} variants over {} subset samples",
        rows.len().separate_with_commas(),
        counts.input_variant_count.separate_with_commas(),
        samples.len().separate_with_commas()
    );

    (rows, samples, counts)
}
