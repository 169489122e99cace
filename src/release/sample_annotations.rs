//! Per-sample annotations of the release subset
//!

use std::collections::{BTreeMap, BTreeSet};

use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use crate::sample_meta::ProjectMeta;
use crate::sample_qc::SampleQcMetrics;
use crate::sample_qc::hard_filters::HardFilter;
use crate::sample_qc::metadata::{MetadataGlobals, PopulationInference, SampleMetadata};
use crate::sample_qc::relatedness::Relationship;
use crate::sample_qc::relatedness::relationships::{RelatedSample, get_relationship_dict};
use crate::sample_qc::sex_inference::SexImputation;
use crate::table::KeyedRow;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SubsetSampleFilters {
    pub hard_filters: BTreeSet<HardFilter>,
    pub hard_filtered: bool,

    /// Flagged as a population outlier by manual review
    pub pop_outlier: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SubsetSampleAnnotation {
    pub s: String,
    pub project_meta: ProjectMeta,
    pub sample_qc: Option<SampleQcMetrics>,
    pub sex_imputation: Option<SexImputation>,
    pub population_inference: Option<PopulationInference>,

    /// Related samples by relationship, restricted to pairs with both samples in the subset
    pub relationships: BTreeMap<Relationship, BTreeSet<String>>,

    pub sample_filters: SubsetSampleFilters,
    pub high_quality: bool,

    /// Sample is part of the full callset release
    pub gnomad_release: bool,
}

impl KeyedRow for SubsetSampleAnnotation {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SubsetSampleGlobals {
    pub subsets: Vec<String>,
    pub pop_outliers: BTreeSet<String>,
    pub metadata: MetadataGlobals,
}

fn in_subsets(meta: &SampleMetadata, subsets: &[String]) -> bool {
    subsets.iter().any(|x| meta.project_meta.subsets.contains(x))
}

/// Build the annotation rows of all samples in any of the given subsets
///
/// Every sample listed in `pop_outliers` must be a subset member.
///
pub fn build_subset_sample_annotations(
    metadata: &[SampleMetadata],
    subsets: &[String],
    pop_outliers: &BTreeSet<String>,
) -> SimpleResult<Vec<SubsetSampleAnnotation>> {
    let members = metadata
        .iter()
        .filter(|x| in_subsets(x, subsets))
        .collect::<Vec<_>>();
    let member_ids = members.iter().map(|x| x.s.clone()).collect::<BTreeSet<_>>();

    let missing_outliers = pop_outliers
        .iter()
        .filter(|s| !member_ids.contains(*s))
        .collect::<Vec<_>>();
    if let Some(first) = missing_outliers.first() {
        bail!(
            "{} population outlier samples are not in subset(s) {}, including '{first}'",
            missing_outliers.len(),
            subsets.join(", ")
        );
    }

    let rows = members
        .into_iter()
        .map(|meta| {
            let relationships = meta
                .relationships
                .iter()
                .filter(|x| member_ids.contains(&x.s))
                .cloned()
                .collect::<Vec<RelatedSample>>();
            let pop_outlier = pop_outliers.contains(&meta.s);
            SubsetSampleAnnotation {
                s: meta.s.clone(),
                project_meta: meta.project_meta.clone(),
                sample_qc: meta.sample_qc.clone(),
                sex_imputation: meta.sex_imputation.clone(),
                population_inference: meta.population_inference.clone(),
                relationships: get_relationship_dict(&relationships),
                sample_filters: SubsetSampleFilters {
                    hard_filters: meta.hard_filters.clone(),
                    hard_filtered: meta.hard_filtered,
                    pop_outlier,
                },
                high_quality: !meta.hard_filtered && !pop_outlier,
                gnomad_release: meta.release,
            }
        })
        .collect::<Vec<_>>();

    info!(
        "Annotated {} samples in subset(s) {}, {} high quality",
        rows.len().separate_with_commas(),
        subsets.join(", "),
        rows.iter()
            .filter(|x| x.high_quality)
            .count()
            .separate_with_commas()
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn related(s: &str, relationship: Relationship) -> RelatedSample {
        RelatedSample {
            s: s.to_string(),
            relationship,
            kin: 0.25,
            ibd0: 0.25,
            ibd1: 0.5,
            ibd2: 0.25,
        }
    }

    fn metadata(s: &str, subset: Option<&str>, hard_filtered: bool, relationships: Vec<RelatedSample>) -> SampleMetadata {
        SampleMetadata {
            s: s.to_string(),
            project_meta: ProjectMeta {
                s: s.to_string(),
                releasable: true,
                subsets: subset.into_iter().map(|x| x.to_string()).collect(),
                ..Default::default()
            },
            sample_qc: None,
            sex_imputation: None,
            population_inference: None,
            hard_filters: if hard_filtered {
                BTreeSet::from([HardFilter::Contamination])
            } else {
                BTreeSet::new()
            },
            sample_qc_metric_hard_filters: BTreeSet::new(),
            hard_filtered,
            relationships,
            relatedness_filters: None,
            release_relatedness_filters: None,
            qc_metrics_filters: None,
            outlier_filtered: false,
            high_quality: !hard_filtered,
            release_related: false,
            release: !hard_filtered,
        }
    }

    fn subsets() -> Vec<String> {
        vec!["hgdp".to_string(), "tgp".to_string()]
    }

    #[test]
    fn test_build_subset_sample_annotations() {
        let rows = vec![
            metadata("A", Some("hgdp"), false, vec![related("B", Relationship::Siblings), related("X", Relationship::ParentChild)]),
            metadata("B", Some("tgp"), true, vec![related("A", Relationship::Siblings)]),
            metadata("C", Some("hgdp"), false, Vec::new()),
            metadata("X", None, false, vec![related("A", Relationship::ParentChild)]),
        ];
        let outliers = BTreeSet::from(["C".to_string()]);
        let annotations = build_subset_sample_annotations(&rows, &subsets(), &outliers).unwrap();

        assert_eq!(annotations.iter().map(|x| x.s.as_str()).collect::<Vec<_>>(), ["A", "B", "C"]);

        let a = &annotations[0];
        assert_eq!(a.relationships.len(), 1);
        assert_eq!(a.relationships[&Relationship::Siblings], BTreeSet::from(["B".to_string()]));
        assert!(a.high_quality);

        let b = &annotations[1];
        assert!(b.sample_filters.hard_filtered);
        assert!(!b.high_quality);

        let c = &annotations[2];
        assert!(c.relationships.is_empty());
        assert!(c.sample_filters.pop_outlier);
        assert!(!c.high_quality);
    }

    #[test]
    fn test_pop_outlier_outside_subset_is_error() {
        let rows = vec![metadata("A", Some("hgdp"), false, Vec::new()), metadata("X", None, false, Vec::new())];
        let outliers = BTreeSet::from(["X".to_string()]);
        assert!(build_subset_sample_annotations(&rows, &subsets(), &outliers).is_err());
    }
}
