//! Per-sample views of the pair table
//!

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::pairs::{Relationship, SamplePair};

/// One relationship of a sample, as seen from that sample
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RelatedSample {
    pub s: String,
    pub relationship: Relationship,
    pub kin: f64,
    pub ibd0: f64,
    pub ibd1: f64,
    pub ibd2: f64,
}

fn related_sample(pair: &SamplePair, other: &str) -> RelatedSample {
    RelatedSample {
        s: other.to_string(),
        relationship: pair.relationship,
        kin: pair.kin,
        ibd0: pair.ibd0,
        ibd1: pair.ibd1,
        ibd2: pair.ibd2,
    }
}

/// Collect the relationships of each sample from both pair roles
///
/// Every sample in `samples` gets an entry, which is empty when the sample has no related pair.
/// Unrelated pairs are excluded. When `within` is given, only pairs with both samples in this set
/// are used.
///
pub fn get_sample_relationships<'a>(
    pairs: impl IntoIterator<Item = &'a SamplePair>,
    samples: impl IntoIterator<Item = &'a String>,
    within: Option<&BTreeSet<String>>,
) -> BTreeMap<String, Vec<RelatedSample>> {
    let mut relationships = samples
        .into_iter()
        .map(|s| (s.clone(), Vec::new()))
        .collect::<BTreeMap<_, _>>();

    let in_scope = |s: &String| within.is_none_or(|x| x.contains(s));
    for pair in pairs.into_iter().filter(|x| x.is_related()) {
        if !(in_scope(&pair.i) && in_scope(&pair.j)) {
            continue;
        }
        if let Some(x) = relationships.get_mut(&pair.i) {
            x.push(related_sample(pair, &pair.j));
        }
        if let Some(x) = relationships.get_mut(&pair.j) {
            x.push(related_sample(pair, &pair.i));
        }
    }
    for x in relationships.values_mut() {
        x.sort_by(|a, b| a.s.cmp(&b.s));
    }
    relationships
}

/// Group a sample's related samples by relationship category
///
pub fn get_relationship_dict(
    relationships: &[RelatedSample],
) -> BTreeMap<Relationship, BTreeSet<String>> {
    let mut dict = BTreeMap::<_, BTreeSet<_>>::new();
    for r in relationships {
        dict.entry(r.relationship).or_default().insert(r.s.clone());
    }
    dict
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RelatednessFlags {
    /// Sample was selected to drop in related sample pruning
    pub related: bool,
    pub duplicate_or_twin: bool,
    pub parent_child: bool,
    pub sibling: bool,
}

/// Relatedness filter flags for one sample
///
/// Returns None for hard filtered samples, which are not evaluated.
///
pub fn get_relatedness_flags(
    s: &str,
    relationships: &[RelatedSample],
    related_samples_to_drop: &BTreeSet<String>,
    hard_filtered: bool,
) -> Option<RelatednessFlags> {
    if hard_filtered {
        return None;
    }
    let has = |r: Relationship| relationships.iter().any(|x| x.relationship == r);
    Some(RelatednessFlags {
        related: related_samples_to_drop.contains(s),
        duplicate_or_twin: has(Relationship::DuplicateOrTwins),
        parent_child: has(Relationship::ParentChild),
        sibling: has(Relationship::Siblings),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(i: &str, j: &str, relationship: Relationship) -> SamplePair {
        SamplePair {
            i: i.to_string(),
            j: j.to_string(),
            kin: 0.25,
            ibd0: 0.0,
            ibd1: 1.0,
            ibd2: 0.0,
            relationship,
        }
    }

    #[test]
    fn test_sample_relationships() {
        let pairs = vec![
            pair("A", "B", Relationship::ParentChild),
            pair("B", "C", Relationship::Siblings),
            pair("C", "D", Relationship::Unrelated),
        ];
        let samples = ["A", "B", "C", "D", "E"].map(String::from);
        let rels = get_sample_relationships(&pairs, &samples, None);
        assert_eq!(rels.len(), 5);
        assert_eq!(rels["B"].len(), 2);
        assert_eq!(rels["B"][0].s, "A");
        assert_eq!(rels["A"][0].s, "B");
        assert!(rels["D"].is_empty());
        assert!(rels["E"].is_empty());

        let dict = get_relationship_dict(&rels["B"]);
        assert_eq!(dict[&Relationship::Siblings], BTreeSet::from(["C".to_string()]));

        let within = BTreeSet::from(["B".to_string(), "C".to_string()]);
        let rels = get_sample_relationships(&pairs, &samples, Some(&within));
        assert_eq!(rels["B"].len(), 1);
        assert!(rels["A"].is_empty());
    }

    #[test]
    fn test_relatedness_flags() {
        let pairs = vec![pair("A", "B", Relationship::DuplicateOrTwins)];
        let samples = ["A".to_string()];
        let rels = get_sample_relationships(&pairs, &samples, None);
        let to_drop = BTreeSet::from(["A".to_string()]);
        let flags = get_relatedness_flags("A", &rels["A"], &to_drop, false).unwrap();
        assert!(flags.related);
        assert!(flags.duplicate_or_twin);
        assert!(!flags.sibling);
        assert_eq!(get_relatedness_flags("A", &rels["A"], &to_drop, true), None);
    }
}
