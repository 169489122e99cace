//! Population assignment with iterative removal of mislabeled training samples
//!

use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

use super::random_forest::PopClassifier;
use crate::table::KeyedRow;

/// Upper bound on classifier fits in the mislabel removal loop
pub const MAX_RF_ITERATIONS: usize = 50;

/// Prior inferred labels which are not used for training
const NON_TRAINING_PRIOR_POPS: [&str; 2] = ["oth", "remaining"];

/// Mislabel tolerance of the training loop, as a count or as a proportion of labeled samples
///
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum MislabelLimit {
    Number(usize),
    Proportion(f64),
}

impl MislabelLimit {
    fn is_exceeded(&self, stats: &MismatchStats) -> bool {
        match self {
            MislabelLimit::Number(x) => stats.mismatch_count > *x,
            MislabelLimit::Proportion(x) => stats.mismatch_proportion() > *x,
        }
    }
}

/// Training label for one sample from its project metadata
///
pub fn get_training_pop(known_pop: Option<&str>, prior_inferred_pop: Option<&str>) -> Option<String> {
    known_pop
        .or(prior_inferred_pop.filter(|x| !NON_TRAINING_PRIOR_POPS.contains(x)))
        .map(|x| x.to_string())
}

/// Blank a random subset of training labels
///
/// Returns the withheld flag for each sample. Labels are drawn in sample order from a ChaCha20
/// stream seeded with `seed`, one draw per labeled sample.
///
pub fn withhold_training_labels(
    labels: &mut [Option<String>],
    withhold_prop: f64,
    seed: u64,
) -> Vec<bool> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    labels
        .iter_mut()
        .map(|label| {
            if label.is_some() && rng.r#gen::<f64>() < withhold_prop {
                *label = None;
                true
            } else {
                false
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct PopPrediction {
    /// Assigned label, or the missing label if no class reached the minimum probability
    pub pop: String,
    pub probs: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MismatchStats {
    pub training_count: usize,
    pub mismatch_count: usize,

    /// Sample indexes whose training label differs from the assigned label
    pub mismatched: Vec<usize>,
}

impl MismatchStats {
    /// Mismatches as a proportion of samples with a training label
    pub fn mismatch_proportion(&self) -> f64 {
        if self.training_count == 0 {
            0.0
        } else {
            self.mismatch_count as f64 / self.training_count as f64
        }
    }
}

fn assign_label(probs: &BTreeMap<String, f64>, min_prob: f64, missing_label: &str) -> String {
    let mut best: Option<(&String, f64)> = None;
    for (pop, &p) in probs.iter() {
        if best.is_none_or(|(_, bp)| p > bp) {
            best = Some((pop, p));
        }
    }
    match best {
        Some((pop, p)) if p >= min_prob => pop.clone(),
        _ => missing_label.to_string(),
    }
}

/// Fit the classifier on the labeled samples, then predict and assign a label for every sample
///
/// A missing-label assignment counts as a mismatch for a labeled sample.
///
pub fn assign_pops_step(
    classifier: &dyn PopClassifier,
    features: &[Vec<f64>],
    labels: &[Option<String>],
    min_prob: f64,
    missing_label: &str,
) -> SimpleResult<(Vec<PopPrediction>, MismatchStats)> {
    let (train_x, train_y): (Vec<_>, Vec<_>) = features
        .iter()
        .zip(labels.iter())
        .filter_map(|(x, y)| y.as_ref().map(|y| (x.clone(), y.clone())))
        .unzip();
    if train_x.is_empty() {
        bail!("Population assignment training set is empty");
    }

    let probs = classifier.fit_predict(&train_x, &train_y, features)?;
    let predictions = probs
        .into_iter()
        .map(|probs| PopPrediction {
            pop: assign_label(&probs, min_prob, missing_label),
            probs,
        })
        .collect::<Vec<_>>();

    let mut stats = MismatchStats {
        training_count: train_x.len(),
        ..Default::default()
    };
    for (i, (label, prediction)) in labels.iter().zip(predictions.iter()).enumerate() {
        if let Some(label) = label {
            if *label != prediction.pop {
                stats.mismatched.push(i);
            }
        }
    }
    stats.mismatch_count = stats.mismatched.len();
    Ok((predictions, stats))
}

#[derive(Clone, Debug)]
pub struct ConvergenceResult {
    pub predictions: Vec<PopPrediction>,

    /// Training labels used in the final fit
    pub labels: Vec<Option<String>>,

    pub iterations: usize,
    pub stats: MismatchStats,
}

/// Repeat classifier fits, removing mislabeled training samples, until the mislabel limit is met
///
/// Labels of `protected` samples are never removed. The loop also stops, with a warning, when a
/// pass could not remove any label or the iteration bound is reached. An emptied training set is
/// an error.
///
#[allow(clippy::too_many_arguments)]
pub fn assign_pops_with_convergence(
    classifier: &dyn PopClassifier,
    features: &[Vec<f64>],
    initial_labels: Vec<Option<String>>,
    protected: &[bool],
    min_prob: f64,
    missing_label: &str,
    limit: MislabelLimit,
    max_iterations: usize,
) -> SimpleResult<ConvergenceResult> {
    let mut labels = initial_labels;
    let mut iterations = 0;
    loop {
        iterations += 1;
        let (predictions, stats) =
            assign_pops_step(classifier, features, &labels, min_prob, missing_label)?;
        info!(
            "Population assignment iteration {iterations}: {} of {} training samples mislabeled ({:.4})",
            stats.mismatch_count,
            stats.training_count,
            stats.mismatch_proportion()
        );

        let removable = stats
            .mismatched
            .iter()
            .filter(|&&i| !protected[i])
            .copied()
            .collect::<Vec<_>>();
        let stop = if !limit.is_exceeded(&stats) {
            true
        } else if removable.is_empty() {
            warn!(
                "Mislabel limit is exceeded but all mislabeled training samples are protected reference samples, stopping"
            );
            true
        } else if iterations >= max_iterations {
            warn!("Mislabel limit is still exceeded after {max_iterations} iterations, stopping");
            true
        } else {
            false
        };
        if stop {
            return Ok(ConvergenceResult {
                predictions,
                labels,
                iterations,
                stats,
            });
        }

        let mut next = labels.clone();
        for i in removable {
            next[i] = None;
        }
        labels = next;
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PrecisionRecall {
    pub precision: Option<f64>,
    pub recall: Option<f64>,
}

/// Per-population precision and recall of the assigned labels over withheld samples
///
pub fn evaluate_withheld(
    original_labels: &[Option<String>],
    withheld: &[bool],
    predictions: &[PopPrediction],
) -> BTreeMap<String, PrecisionRecall> {
    let pops = original_labels
        .iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>();
    let evaluated = (0..predictions.len())
        .filter(|&i| withheld[i])
        .filter_map(|i| original_labels[i].as_ref().map(|t| (t, &predictions[i].pop)))
        .collect::<Vec<_>>();

    pops.into_iter()
        .map(|pop| {
            let tp = evaluated.iter().filter(|(t, p)| **t == pop && **p == pop).count();
            let predicted = evaluated.iter().filter(|(_, p)| **p == pop).count();
            let actual = evaluated.iter().filter(|(t, _)| **t == pop).count();
            let ratio = |n: usize, d: usize| (d > 0).then(|| n as f64 / d as f64);
            let pr = PrecisionRecall {
                precision: ratio(tp, predicted),
                recall: ratio(tp, actual),
            };
            (pop, pr)
        })
        .collect()
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PopAssignment {
    pub s: String,
    pub pop: String,

    /// Class probability of each population in the final fit
    pub probs: BTreeMap<String, f64>,

    /// Training label used in the final fit
    pub training_pop: Option<String>,

    /// Training label before withholding and mislabel removal
    pub original_training_pop: Option<String>,

    pub withheld_sample: bool,

    /// All PC scores of the sample
    pub pca_scores: Vec<f64>,
}

impl KeyedRow for PopAssignment {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PopAssignmentGlobals {
    pub min_prob: f64,

    /// 1-based PCs used as classifier features
    pub pcs: Vec<usize>,

    pub n_trees: usize,
    pub seed: u64,
    pub missing_label: String,
    pub mislabel_limit: MislabelLimit,
    pub iterations: usize,
    pub n_mislabeled_training_samples: usize,
    pub prop_mislabeled_training_samples: f64,
    pub withhold_prop: Option<f64>,
    pub withheld_evaluation: BTreeMap<String, PrecisionRecall>,
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Predicts 'afr' for negative first features and 'eur' otherwise, ignoring training labels
    pub struct ThresholdClassifier;

    impl PopClassifier for ThresholdClassifier {
        fn fit_predict(
            &self,
            _train_x: &[Vec<f64>],
            _train_y: &[String],
            predict_x: &[Vec<f64>],
        ) -> SimpleResult<Vec<BTreeMap<String, f64>>> {
            Ok(predict_x
                .iter()
                .map(|x| {
                    let afr = if x[0] < 0.0 { 0.9 } else { 0.1 };
                    BTreeMap::from([("afr".to_string(), afr), ("eur".to_string(), 1.0 - afr)])
                })
                .collect())
        }
    }

    /// Ten labeled samples, the last three deliberately mislabeled
    fn mislabeled_input() -> (Vec<Vec<f64>>, Vec<Option<String>>) {
        let features = (0..10)
            .map(|i| vec![if i < 5 { -1.0 } else { 1.0 }])
            .collect::<Vec<_>>();
        let labels = (0..10)
            .map(|i| {
                let truth = if i < 5 { "afr" } else { "eur" };
                let label = match (i >= 7, truth) {
                    (true, "eur") => "afr",
                    _ => truth,
                };
                Some(label.to_string())
            })
            .collect();
        (features, labels)
    }

    #[test]
    fn test_convergence_single_fit_within_limit() {
        let (features, labels) = mislabeled_input();
        let result = assign_pops_with_convergence(
            &ThresholdClassifier,
            &features,
            labels,
            &[false; 10],
            0.75,
            "unassigned",
            MislabelLimit::Number(5),
            MAX_RF_ITERATIONS,
        )
        .unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(result.stats.mismatch_count, 3);
        assert_eq!(result.stats.training_count, 10);
    }

    #[test]
    fn test_convergence_retrains_when_limit_exceeded() {
        let (features, labels) = mislabeled_input();
        let result = assign_pops_with_convergence(
            &ThresholdClassifier,
            &features,
            labels,
            &[false; 10],
            0.75,
            "unassigned",
            MislabelLimit::Number(2),
            MAX_RF_ITERATIONS,
        )
        .unwrap();
        assert_eq!(result.iterations, 2);
        assert_eq!(result.stats.mismatch_count, 0);
        assert_eq!(result.stats.training_count, 7);
        assert!(result.labels[7..].iter().all(|x| x.is_none()));
    }

    #[test]
    fn test_proportion_limit_uses_labeled_denominator() {
        let (features, mut labels) = mislabeled_input();
        // Unlabeled samples do not change the denominator
        labels[0] = None;
        labels[1] = None;
        let (_, stats) =
            assign_pops_step(&ThresholdClassifier, &features, &labels, 0.75, "unassigned").unwrap();
        assert_eq!(stats.training_count, 8);
        assert!((stats.mismatch_proportion() - 3.0 / 8.0).abs() < 1e-12);
        assert!(MislabelLimit::Proportion(0.3).is_exceeded(&stats));
        assert!(!MislabelLimit::Proportion(0.4).is_exceeded(&stats));
    }

    #[test]
    fn test_protected_labels_kept() {
        let (features, labels) = mislabeled_input();
        let mut protected = [false; 10];
        protected[7..].iter_mut().for_each(|x| *x = true);
        let result = assign_pops_with_convergence(
            &ThresholdClassifier,
            &features,
            labels,
            &protected,
            0.75,
            "unassigned",
            MislabelLimit::Number(2),
            MAX_RF_ITERATIONS,
        )
        .unwrap();
        assert_eq!(result.iterations, 1);
        assert!(result.labels[7].is_some());
    }

    #[test]
    fn test_empty_training_set_is_error() {
        let (features, _) = mislabeled_input();
        let labels = vec![None; 10];
        assert!(
            assign_pops_step(&ThresholdClassifier, &features, &labels, 0.75, "unassigned").is_err()
        );
    }

    #[test]
    fn test_low_probability_is_unassigned() {
        let probs = BTreeMap::from([("afr".to_string(), 0.6), ("eur".to_string(), 0.4)]);
        assert_eq!(assign_label(&probs, 0.75, "unassigned"), "unassigned");
        assert_eq!(assign_label(&probs, 0.5, "unassigned"), "afr");
    }

    #[test]
    fn test_training_pop() {
        assert_eq!(get_training_pop(Some("afr"), Some("eur")), Some("afr".to_string()));
        assert_eq!(get_training_pop(None, Some("eur")), Some("eur".to_string()));
        assert_eq!(get_training_pop(None, Some("remaining")), None);
        assert_eq!(get_training_pop(None, None), None);
    }

    #[test]
    fn test_withhold_is_seeded() {
        let labels = (0..100)
            .map(|i| (i % 3 != 0).then(|| "afr".to_string()))
            .collect::<Vec<_>>();
        let mut a = labels.clone();
        let mut b = labels.clone();
        let wa = withhold_training_labels(&mut a, 0.3, 11);
        let wb = withhold_training_labels(&mut b, 0.3, 11);
        assert_eq!(wa, wb);
        assert!(wa.iter().any(|x| *x));
        for (i, w) in wa.iter().enumerate() {
            if *w {
                assert!(labels[i].is_some());
                assert!(a[i].is_none());
            }
        }
    }

    #[test]
    fn test_evaluate_withheld() {
        let original = vec![Some("afr".to_string()), Some("eur".to_string()), Some("afr".to_string())];
        let withheld = vec![true, true, false];
        let pred = |pop: &str| PopPrediction {
            pop: pop.to_string(),
            probs: BTreeMap::new(),
        };
        let predictions = vec![pred("afr"), pred("afr"), pred("eur")];
        let eval = evaluate_withheld(&original, &withheld, &predictions);
        assert_eq!(eval["afr"].precision, Some(0.5));
        assert_eq!(eval["afr"].recall, Some(1.0));
        assert_eq!(eval["eur"].precision, None);
        assert_eq!(eval["eur"].recall, Some(0.0));
    }
}
