//! Histogram-binned gradient-boosted trees.

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::SparseVector;
use crate::learner::ProbabilisticClassifier;
use crate::learner::common::{
    BinnedMatrix, HESSIAN_FLOOR, LabelMap, TreeNode, softmax, validate_training_input,
};

/// Hyperparameters for [`HistBooster`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistParams {
    /// Number of boosting rounds.
    pub n_rounds: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Shrinkage applied to every tree's contribution.
    pub learning_rate: f64,
    /// Fraction of rows sampled per round.
    pub subsample_rows: f64,
    /// Fraction of features sampled per round.
    pub subsample_features: f64,
    /// Histogram bin budget per feature.
    pub max_bins: usize,
    /// L2 regularization on leaf values.
    pub l2_regularization: f64,
    /// Minimum hessian weight on each side of a split.
    pub min_child_weight: f64,
    /// RNG seed for row/feature subsampling.
    pub seed: u64,
}

impl Default for HistParams {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            max_depth: 5,
            learning_rate: 0.1,
            subsample_rows: 0.8,
            subsample_features: 0.8,
            max_bins: 256,
            l2_regularization: 1.0,
            min_child_weight: 1.0,
            seed: 42,
        }
    }
}

/// Multi-class gradient boosting with shallow, regularized, depth-wise
/// trees over histogram-binned splits.
///
/// Trains one regression tree per class per round against the softmax
/// log-loss gradients (Newton boosting: leaf values are `-G / (H + lambda)`).
/// Rows and features are subsampled each round.
#[derive(Clone, Serialize, Deserialize)]
pub struct HistBooster {
    params: HistParams,
    label_map: LabelMap,
    /// `trees[round][class]`.
    trees: Vec<Vec<TreeNode>>,
    n_features: usize,
}

impl std::fmt::Debug for HistBooster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistBooster")
            .field("rounds", &self.trees.len())
            .field("classes", &self.label_map.n_classes())
            .field("n_features", &self.n_features)
            .finish()
    }
}

/// Per-bin gradient/hessian accumulator.
#[derive(Clone, Copy, Default)]
struct BinStats {
    grad: f64,
    hess: f64,
    count: usize,
}

impl HistBooster {
    /// Fit a booster on a feature matrix and 1-indexed labels.
    pub fn fit(rows: &[SparseVector], labels: &[u32], params: HistParams) -> Result<Self> {
        let n_features = validate_training_input(rows, labels)?;
        let label_map = LabelMap::fit(labels)?;
        let dense = label_map.dense_labels(labels)?;
        let n_rows = rows.len();
        let n_classes = label_map.n_classes();

        let binned = BinnedMatrix::from_rows(rows, params.max_bins);
        let mut rng = StdRng::seed_from_u64(params.seed);

        // Raw additive scores, row-major over classes.
        let mut scores = vec![0.0f64; n_rows * n_classes];
        let mut trees: Vec<Vec<TreeNode>> = Vec::with_capacity(params.n_rounds);

        let sampled_rows = ((n_rows as f64) * params.subsample_rows).round().max(1.0) as usize;
        let sampled_features = if n_features == 0 {
            0
        } else {
            (((n_features as f64) * params.subsample_features).round() as usize)
                .clamp(1, n_features)
        };

        for _ in 0..params.n_rounds {
            // Class probabilities under the current scores.
            let mut probs = scores.clone();
            for row in probs.chunks_mut(n_classes) {
                softmax(row);
            }

            let row_sample: Vec<usize> = rand::seq::index::sample(
                &mut rng,
                n_rows,
                sampled_rows.min(n_rows),
            )
            .into_vec();
            let feature_sample: Vec<usize> = if n_features == 0 {
                Vec::new()
            } else {
                rand::seq::index::sample(&mut rng, n_features, sampled_features).into_vec()
            };

            let mut round_trees = Vec::with_capacity(n_classes);
            for class in 0..n_classes {
                let mut grads = vec![0.0f64; n_rows];
                let mut hess = vec![0.0f64; n_rows];
                for i in 0..n_rows {
                    let p = probs[i * n_classes + class];
                    let target = if dense[i] == class { 1.0 } else { 0.0 };
                    grads[i] = p - target;
                    hess[i] = (p * (1.0 - p)).max(HESSIAN_FLOOR);
                }

                let tree = build_tree(
                    &binned,
                    &grads,
                    &hess,
                    &row_sample,
                    &feature_sample,
                    0,
                    &params,
                );

                for i in 0..n_rows {
                    scores[i * n_classes + class] +=
                        params.learning_rate * tree.predict(&rows[i]);
                }
                round_trees.push(tree);
            }
            trees.push(round_trees);
        }

        Ok(Self {
            params,
            label_map,
            trees,
            n_features,
        })
    }

    /// Raw (pre-softmax) additive scores for one row.
    fn raw_scores(&self, row: &SparseVector) -> Vec<f64> {
        let n_classes = self.label_map.n_classes();
        let mut scores = vec![0.0f64; n_classes];
        for round in &self.trees {
            for (class, tree) in round.iter().enumerate() {
                scores[class] += self.params.learning_rate * tree.predict(row);
            }
        }
        scores
    }

    /// Number of features the booster was fitted on.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// The fitted label map.
    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    /// The hyperparameters used at fit time.
    pub fn params(&self) -> &HistParams {
        &self.params
    }
}

impl ProbabilisticClassifier for HistBooster {
    fn predict_proba(&self, rows: &[SparseVector]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                let mut scores = self.raw_scores(row);
                softmax(&mut scores);
                scores
            })
            .collect()
    }

    fn classes(&self) -> &[u32] {
        self.label_map.classes()
    }
}

/// Recursively grow a tree on the sampled rows.
fn build_tree(
    binned: &BinnedMatrix,
    grads: &[f64],
    hess: &[f64],
    node_rows: &[usize],
    features: &[usize],
    depth: usize,
    params: &HistParams,
) -> TreeNode {
    let grad_sum: f64 = node_rows.iter().map(|&i| grads[i]).sum();
    let hess_sum: f64 = node_rows.iter().map(|&i| hess[i]).sum();
    let leaf_value = -grad_sum / (hess_sum + params.l2_regularization);

    if depth >= params.max_depth || node_rows.len() < 2 {
        return TreeNode::leaf(leaf_value);
    }

    let parent_score = grad_sum * grad_sum / (hess_sum + params.l2_regularization);
    let mut best: Option<(usize, usize, f64)> = None; // (feature, bin, gain)

    for &feature in features {
        let n_bins = binned.n_bins(feature);
        if n_bins < 2 {
            continue;
        }
        let mut histogram = vec![BinStats::default(); n_bins];
        for &i in node_rows {
            let stats = &mut histogram[binned.bin(i, feature) as usize];
            stats.grad += grads[i];
            stats.hess += hess[i];
            stats.count += 1;
        }

        let mut left_grad = 0.0;
        let mut left_hess = 0.0;
        let mut left_count = 0;
        for bin in 0..n_bins - 1 {
            left_grad += histogram[bin].grad;
            left_hess += histogram[bin].hess;
            left_count += histogram[bin].count;

            let right_count = node_rows.len() - left_count;
            if left_count == 0 || right_count == 0 {
                continue;
            }
            let right_hess = hess_sum - left_hess;
            if left_hess < params.min_child_weight || right_hess < params.min_child_weight {
                continue;
            }

            let right_grad = grad_sum - left_grad;
            let gain = left_grad * left_grad / (left_hess + params.l2_regularization)
                + right_grad * right_grad / (right_hess + params.l2_regularization)
                - parent_score;

            if gain > 1e-12 && best.is_none_or(|(_, _, best_gain)| gain > best_gain) {
                best = Some((feature, bin, gain));
            }
        }
    }

    let Some((feature, bin, _)) = best else {
        return TreeNode::leaf(leaf_value);
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = node_rows
        .iter()
        .copied()
        .partition(|&i| binned.bin(i, feature) as usize <= bin);

    let left = build_tree(binned, grads, hess, &left_rows, features, depth + 1, params);
    let right = build_tree(binned, grads, hess, &right_rows, features, depth + 1, params);
    TreeNode::split(feature, binned.threshold(feature, bin), left, right)
}
