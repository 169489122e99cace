use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Position of one sample in the global and per-population downsampling orders
///
/// A sample is a member of the downsampling of size `N` if its index is less than `N`.
///
#[derive(Clone, Debug, PartialEq)]
pub struct DownsamplingIndex {
    pub global_idx: usize,

    /// None for samples without a population label
    pub pop_idx: Option<usize>,
}

/// Rank samples by a uniform random draw from a seeded stream
///
/// Draws are made in sample order, so the same seed and sample order always give the same
/// subsamples. Ties in the draw are broken by sample order.
///
pub fn compute_downsampling_indexes(pops: &[Option<&str>], seed: u64) -> Vec<DownsamplingIndex> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let draws = pops.iter().map(|_| rng.r#gen::<f64>()).collect::<Vec<_>>();

    let mut order = (0..pops.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| draws[a].total_cmp(&draws[b]).then(a.cmp(&b)));

    let mut indexes = vec![
        DownsamplingIndex {
            global_idx: 0,
            pop_idx: None,
        };
        pops.len()
    ];
    let mut pop_counts = BTreeMap::<&str, usize>::new();
    for (rank, &sample_index) in order.iter().enumerate() {
        let x = &mut indexes[sample_index];
        x.global_idx = rank;
        if let Some(pop) = pops[sample_index] {
            let count = pop_counts.entry(pop).or_insert(0);
            x.pop_idx = Some(*count);
            *count += 1;
        }
    }
    indexes
}
