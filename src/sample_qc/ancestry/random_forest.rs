//! Random forest classifier used to assign population labels from PC scores
//!
//! Each tree is grown on a bootstrap sample of the training rows. At each node a random subset of
//! `sqrt(n_features)` features is searched for the threshold minimizing the weighted Gini impurity
//! of the child nodes. Class probabilities are averaged over all trees.
//!

use std::collections::{BTreeMap, BTreeSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RandomForestParams {
    pub n_trees: usize,
    pub seed: u64,

    /// Features searched at each split, defaults to `sqrt(n_features)`
    pub max_features: Option<usize>,

    pub min_samples_leaf: usize,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 24,
            max_features: None,
            min_samples_leaf: 1,
        }
    }
}

enum Node {
    Leaf {
        class_probs: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Decision tree with nodes stored in an arena, the root at index 0
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict(&self, x: &[f64]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { class_probs } => return class_probs,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

fn class_counts(rows: &[usize], y: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &r in rows {
        counts[y[r]] += 1;
    }
    counts
}

/// Gini impurity scaled by node size, `n * (1 - sum(p^2))`
fn weighted_gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    let sum_sq = counts
        .iter()
        .map(|&c| (c as f64 / n) * (c as f64 / n))
        .sum::<f64>();
    n * (1.0 - sum_sq)
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

fn find_best_split(
    x: &[Vec<f64>],
    y: &[usize],
    rows: &[usize],
    features: &[usize],
    n_classes: usize,
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let parent_counts = class_counts(rows, y, n_classes);
    let parent_score = weighted_gini(&parent_counts, rows.len());
    let mut best: Option<SplitCandidate> = None;

    for &feature in features {
        let mut sorted = rows.to_vec();
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]).then(a.cmp(&b)));

        let mut left_counts = vec![0; n_classes];
        let mut right_counts = parent_counts.clone();
        for split_index in 1..sorted.len() {
            let moved = sorted[split_index - 1];
            left_counts[y[moved]] += 1;
            right_counts[y[moved]] -= 1;

            let lo = x[moved][feature];
            let hi = x[sorted[split_index]][feature];
            if lo == hi {
                continue;
            }
            let n_left = split_index;
            let n_right = sorted.len() - split_index;
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }
            let score =
                weighted_gini(&left_counts, n_left) + weighted_gini(&right_counts, n_right);
            if score < parent_score - 1e-12 && best.as_ref().is_none_or(|b| score < b.score) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: 0.5 * (lo + hi),
                    score,
                });
            }
        }
    }
    best
}

fn grow_tree(
    x: &[Vec<f64>],
    y: &[usize],
    n_classes: usize,
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut ChaCha20Rng,
) -> DecisionTree {
    let n = y.len();
    let n_features = x[0].len();
    let bootstrap = (0..n).map(|_| rng.gen_range(0..n)).collect::<Vec<_>>();

    let mut nodes = vec![Node::Leaf {
        class_probs: Vec::new(),
    }];
    let mut stack = vec![(0usize, bootstrap)];
    while let Some((node_index, rows)) = stack.pop() {
        let counts = class_counts(&rows, y, n_classes);
        let is_pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        let split = if is_pure || rows.len() < 2 * min_samples_leaf {
            None
        } else {
            let mut features = rand::seq::index::sample(rng, n_features, max_features).into_vec();
            features.sort_unstable();
            find_best_split(x, y, &rows, &features, n_classes, min_samples_leaf)
        };

        match split {
            Some(split) => {
                let (left_rows, right_rows): (Vec<_>, Vec<_>) = rows
                    .into_iter()
                    .partition(|&r| x[r][split.feature] <= split.threshold);
                let left = nodes.len();
                let right = left + 1;
                nodes.push(Node::Leaf {
                    class_probs: Vec::new(),
                });
                nodes.push(Node::Leaf {
                    class_probs: Vec::new(),
                });
                nodes[node_index] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
                stack.push((right, right_rows));
                stack.push((left, left_rows));
            }
            None => {
                let total = rows.len() as f64;
                nodes[node_index] = Node::Leaf {
                    class_probs: counts.iter().map(|&c| c as f64 / total).collect(),
                };
            }
        }
    }
    DecisionTree { nodes }
}

pub struct RandomForest {
    classes: Vec<String>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Train a forest on feature rows `x` with class labels `labels`
    ///
    /// Trees are trained in parallel. Tree `i` draws from a random stream seeded with `seed + i`, so
    /// the forest does not depend on the thread count.
    ///
    pub fn fit(x: &[Vec<f64>], labels: &[String], params: &RandomForestParams) -> SimpleResult<Self> {
        if x.is_empty() {
            bail!("Random forest training set is empty");
        }
        if x.len() != labels.len() {
            bail!(
                "Random forest training set has {} feature rows but {} labels",
                x.len(),
                labels.len()
            );
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|r| r.len() != n_features) {
            bail!("Random forest feature rows must share a non-zero length");
        }
        if params.n_trees == 0 {
            bail!("Random forest requires at least one tree");
        }

        let classes = labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let class_index = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect::<BTreeMap<_, _>>();
        let y = labels
            .iter()
            .map(|l| class_index[l.as_str()])
            .collect::<Vec<_>>();

        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().round() as usize)
            .clamp(1, n_features);
        let min_samples_leaf = params.min_samples_leaf.max(1);

        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|tree_index| {
                let mut rng = ChaCha20Rng::seed_from_u64(params.seed.wrapping_add(tree_index as u64));
                grow_tree(x, &y, classes.len(), max_features, min_samples_leaf, &mut rng)
            })
            .collect();

        Ok(Self { classes, trees })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Class probabilities for one feature row, in `classes()` order
    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        let mut probs = vec![0.0; self.classes.len()];
        for tree in self.trees.iter() {
            for (p, v) in probs.iter_mut().zip(tree.predict(x)) {
                *p += v;
            }
        }
        let n = self.trees.len() as f64;
        probs.iter_mut().for_each(|p| *p /= n);
        probs
    }
}

/// A classifier trained on labeled feature rows and applied to all rows
///
pub trait PopClassifier {
    /// Train on `train_x`/`train_y` and return the class probabilities of every row of `predict_x`
    fn fit_predict(
        &self,
        train_x: &[Vec<f64>],
        train_y: &[String],
        predict_x: &[Vec<f64>],
    ) -> SimpleResult<Vec<BTreeMap<String, f64>>>;
}

pub struct RandomForestClassifier {
    pub params: RandomForestParams,
}

impl PopClassifier for RandomForestClassifier {
    fn fit_predict(
        &self,
        train_x: &[Vec<f64>],
        train_y: &[String],
        predict_x: &[Vec<f64>],
    ) -> SimpleResult<Vec<BTreeMap<String, f64>>> {
        let forest = RandomForest::fit(train_x, train_y, &self.params)?;
        Ok(predict_x
            .par_iter()
            .map(|x| {
                forest
                    .classes()
                    .iter()
                    .cloned()
                    .zip(forest.predict_proba(x))
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn clustered_data() -> (Vec<Vec<f64>>, Vec<String>) {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let centers = [("afr", [-3.0, 0.0]), ("eas", [3.0, 0.0]), ("nfe", [0.0, 4.0])];
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (label, center) in centers {
            for _ in 0..30 {
                x.push(vec![
                    center[0] + rng.gen_range(-1.0..1.0),
                    center[1] + rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                ]);
                y.push(label.to_string());
            }
        }
        (x, y)
    }

    #[test]
    fn test_forest_separates_clusters() {
        let (x, y) = clustered_data();
        let params = RandomForestParams {
            n_trees: 25,
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();
        assert_eq!(forest.classes(), ["afr", "eas", "nfe"]);

        let probs = forest.predict_proba(&[-3.0, 0.0, 0.0]);
        assert_abs_diff_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(probs[0] > 0.9);
        let probs = forest.predict_proba(&[0.0, 4.0, 0.0]);
        assert!(probs[2] > 0.9);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = clustered_data();
        let classifier = RandomForestClassifier {
            params: RandomForestParams {
                n_trees: 10,
                ..Default::default()
            },
        };
        let query = vec![vec![0.5, 1.5, 0.0], vec![-1.5, 2.0, 0.3]];
        let a = classifier.fit_predict(&x, &y, &query).unwrap();
        let b = classifier.fit_predict(&x, &y, &query).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_training_set() {
        let params = RandomForestParams::default();
        assert!(RandomForest::fit(&[], &[], &params).is_err());
    }
}
