//! Sample ranking and greedy pruning of related samples
//!
//! Related sample pruning approximates a maximum independent set of the relatedness graph. The
//! highest degree sample is removed repeatedly until no edges remain, with degree ties broken
//! toward the least preferred sample according to a precomputed rank.
//!

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

use super::pairs::SamplePair;
use crate::log_utils::debug_msg;
use crate::table::KeyedRow;

/// Sample attributes used to rank samples for retention
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RankInput {
    pub s: String,
    pub hard_filtered: bool,
    pub prior_release: bool,
    pub releasable: bool,
    pub chr20_mean_dp: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SampleRank {
    pub s: String,

    /// Position in retention preference order, 0 is the most preferred sample
    pub rank: usize,

    pub hard_filtered: bool,
    pub prior_release: bool,
    pub releasable: bool,
    pub chr20_mean_dp: Option<f64>,
}

impl KeyedRow for SampleRank {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RelatedSampleToDrop {
    pub s: String,
    pub rank: usize,
}

impl KeyedRow for RelatedSampleToDrop {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

/// Default retention preference order
///
/// Samples passing hard filters come first, then samples in the prior release which are still
/// releasable, then releasable samples, then samples with higher chr20 mean depth. Sample id
/// makes the order total.
///
pub fn default_rank_order(a: &RankInput, b: &RankInput) -> Ordering {
    let depth = |x: &RankInput| x.chr20_mean_dp.unwrap_or(f64::NEG_INFINITY);
    a.hard_filtered
        .cmp(&b.hard_filtered)
        .then_with(|| {
            (b.prior_release && b.releasable).cmp(&(a.prior_release && a.releasable))
        })
        .then_with(|| b.releasable.cmp(&a.releasable))
        .then_with(|| depth(b).total_cmp(&depth(a)))
        .then_with(|| a.s.cmp(&b.s))
}

/// Rank samples with the given total order
///
pub fn rank_samples<F>(mut inputs: Vec<RankInput>, order: F) -> Vec<SampleRank>
where
    F: Fn(&RankInput, &RankInput) -> Ordering,
{
    inputs.sort_by(|a, b| order(a, b));
    inputs
        .into_iter()
        .enumerate()
        .map(|(rank, x)| SampleRank {
            s: x.s,
            rank,
            hard_filtered: x.hard_filtered,
            prior_release: x.prior_release,
            releasable: x.releasable,
            chr20_mean_dp: x.chr20_mean_dp,
        })
        .collect()
}

/// Undirected graph of related samples stored as adjacency sets
///
#[derive(Default)]
pub struct RelatednessGraph {
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl RelatednessGraph {
    /// Build the graph from all pairs classified as second degree relatives or closer
    ///
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a SamplePair>) -> Self {
        let mut graph = Self::default();
        for pair in pairs.into_iter().filter(|x| x.is_related()) {
            graph
                .adjacency
                .entry(pair.i.clone())
                .or_default()
                .insert(pair.j.clone());
            graph
                .adjacency
                .entry(pair.j.clone())
                .or_default()
                .insert(pair.i.clone());
        }
        graph
    }

    pub fn samples(&self) -> impl Iterator<Item = &String> {
        self.adjacency.keys()
    }

    pub fn degree(&self, s: &str) -> usize {
        self.adjacency.get(s).map_or(0, |x| x.len())
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|x| x.len()).sum::<usize>() / 2
    }

    /// Remove a sample and all of its edges, returning its former neighbors
    ///
    pub fn remove_sample(&mut self, s: &str) -> BTreeSet<String> {
        let neighbors = self.adjacency.remove(s).unwrap_or_default();
        for n in neighbors.iter() {
            if let Some(x) = self.adjacency.get_mut(n) {
                x.remove(s);
            }
        }
        neighbors
    }
}

/// Compute the set of samples to drop so that no two remaining samples are related
///
/// # Arguments
/// * `ranks` - Rank of every sample in the graph, lower rank is preferred for retention
/// * `filtered` - Samples which are always removed first, regardless of degree
///
pub fn compute_related_samples_to_drop<'a>(
    pairs: impl IntoIterator<Item = &'a SamplePair>,
    ranks: &BTreeMap<String, usize>,
    filtered: &BTreeSet<String>,
) -> SimpleResult<BTreeSet<String>> {
    let mut graph = RelatednessGraph::from_pairs(pairs);

    for s in graph.samples() {
        if !ranks.contains_key(s) {
            bail!("Related sample '{s}' has no entry in the sample rank table");
        }
    }

    let mut to_drop = BTreeSet::new();
    let filtered_in_graph = graph
        .samples()
        .filter(|s| filtered.contains(*s))
        .cloned()
        .collect::<Vec<_>>();
    for s in filtered_in_graph {
        graph.remove_sample(&s);
        to_drop.insert(s);
    }

    // Heap entries are (degree, rank, sample). Entries are invalidated lazily: an entry is used
    // only if it still matches the current degree of a sample remaining in the graph.
    let mut heap = graph
        .samples()
        .map(|s| (graph.degree(s), ranks[s], s.clone()))
        .filter(|x| x.0 > 0)
        .collect::<BinaryHeap<_>>();

    let debug = false;
    let mut edge_count = graph.edge_count();
    while edge_count > 0 {
        let Some((degree, _, s)) = heap.pop() else {
            break;
        };
        if graph.degree(&s) != degree {
            continue;
        }
        let neighbors = graph.remove_sample(&s);
        edge_count -= neighbors.len();
        debug_msg!(
            debug,
            "Dropping related sample '{s}' with degree {degree}, {edge_count} edges remain"
        );
        for n in neighbors {
            let d = graph.degree(&n);
            if d > 0 {
                heap.push((d, ranks[&n], n));
            }
        }
        to_drop.insert(s);
    }

    Ok(to_drop)
}
