//! Oblivious-tree gradient boosting with ordered leaf statistics.

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::SparseVector;
use crate::learner::ProbabilisticClassifier;
use crate::learner::common::{
    BinnedMatrix, HESSIAN_FLOOR, LabelMap, softmax, validate_training_input,
};

/// Hyperparameters for [`ObliviousBooster`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObliviousParams {
    /// Number of boosting rounds.
    pub n_rounds: usize,
    /// Tree depth; every tree has exactly `2^depth` leaves.
    pub depth: usize,
    /// Shrinkage applied to every tree's contribution.
    pub learning_rate: f64,
    /// Histogram bin budget per feature.
    pub max_bins: usize,
    /// L2 regularization on leaf values.
    pub l2_regularization: f64,
    /// RNG seed for the ordered-boosting permutation.
    pub seed: u64,
}

impl Default for ObliviousParams {
    fn default() -> Self {
        Self {
            n_rounds: 200,
            depth: 6,
            learning_rate: 0.1,
            max_bins: 64,
            l2_regularization: 3.0,
            seed: 7,
        }
    }
}

/// A symmetric (oblivious) decision tree: one `(feature, threshold)` split
/// per level, shared by every node on that level, with per-class values in
/// each of the `2^depth` leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObliviousTree {
    /// Per-level splits, root first.
    splits: Vec<(u32, f64)>,
    /// `leaf_values[leaf * n_classes + class]`.
    leaf_values: Vec<f64>,
    n_classes: usize,
}

impl ObliviousTree {
    fn leaf_index(&self, row: &SparseVector) -> usize {
        let mut leaf = 0usize;
        for &(feature, threshold) in &self.splits {
            leaf <<= 1;
            if row.get(feature) > threshold {
                leaf |= 1;
            }
        }
        leaf
    }

    /// Accumulate this tree's (unscaled) contribution into `scores`.
    fn accumulate(&self, row: &SparseVector, scale: f64, scores: &mut [f64]) {
        let leaf = self.leaf_index(row);
        let values = &self.leaf_values[leaf * self.n_classes..(leaf + 1) * self.n_classes];
        for (score, value) in scores.iter_mut().zip(values) {
            *score += scale * value;
        }
    }
}

/// Multi-class gradient boosting with deeper, symmetric trees.
///
/// Every level of a tree applies one split across all nodes, the CatBoost
/// tree shape. Leaf values are Newton steps (`-G / (H + lambda)`) over softmax
/// log-loss statistics. During fitting, the scores fed into the next
/// round's gradients come from *ordered* leaf estimates: rows are visited
/// in a fixed random permutation and each row only sees statistics of rows
/// before it, which decorrelates this learner's errors from the
/// histogram booster's. The persisted tree keeps the full-data leaf
/// values.
#[derive(Clone, Serialize, Deserialize)]
pub struct ObliviousBooster {
    params: ObliviousParams,
    label_map: LabelMap,
    trees: Vec<ObliviousTree>,
    n_features: usize,
}

impl std::fmt::Debug for ObliviousBooster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObliviousBooster")
            .field("rounds", &self.trees.len())
            .field("classes", &self.label_map.n_classes())
            .field("n_features", &self.n_features)
            .finish()
    }
}

impl ObliviousBooster {
    /// Fit a booster on a feature matrix and 1-indexed labels.
    pub fn fit(rows: &[SparseVector], labels: &[u32], params: ObliviousParams) -> Result<Self> {
        let n_features = validate_training_input(rows, labels)?;
        let label_map = LabelMap::fit(labels)?;
        let dense = label_map.dense_labels(labels)?;
        let n_rows = rows.len();
        let n_classes = label_map.n_classes();

        let binned = BinnedMatrix::from_rows(rows, params.max_bins);
        let mut rng = StdRng::seed_from_u64(params.seed);

        // The ordered-boosting permutation, drawn once per fit.
        let mut permutation: Vec<usize> = (0..n_rows).collect();
        permutation.shuffle(&mut rng);

        let mut scores = vec![0.0f64; n_rows * n_classes];
        let mut trees = Vec::with_capacity(params.n_rounds);

        let mut grads = vec![0.0f64; n_rows * n_classes];
        let mut hess = vec![0.0f64; n_rows * n_classes];

        for _ in 0..params.n_rounds {
            let mut probs = scores.clone();
            for row in probs.chunks_mut(n_classes) {
                softmax(row);
            }
            for i in 0..n_rows {
                for class in 0..n_classes {
                    let p = probs[i * n_classes + class];
                    let target = if dense[i] == class { 1.0 } else { 0.0 };
                    grads[i * n_classes + class] = p - target;
                    hess[i * n_classes + class] = (p * (1.0 - p)).max(HESSIAN_FLOOR);
                }
            }

            let tree = grow_tree(&binned, &grads, &hess, n_classes, &params);

            // Ordered score update: each row is updated with leaf values
            // estimated from the rows before it in the permutation only.
            let n_leaves = 1usize << tree.splits.len();
            let leaf_of: Vec<usize> = (0..n_rows).map(|i| tree.leaf_index(&rows[i])).collect();
            let mut running_grad = vec![0.0f64; n_leaves * n_classes];
            let mut running_hess = vec![0.0f64; n_leaves * n_classes];
            for &i in &permutation {
                let leaf = leaf_of[i];
                for class in 0..n_classes {
                    let slot = leaf * n_classes + class;
                    let value =
                        -running_grad[slot] / (running_hess[slot] + params.l2_regularization);
                    scores[i * n_classes + class] += params.learning_rate * value;
                    running_grad[slot] += grads[i * n_classes + class];
                    running_hess[slot] += hess[i * n_classes + class];
                }
            }

            trees.push(tree);
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
        let mut scores = vec![0.0f64; self.label_map.n_classes()];
        for tree in &self.trees {
            tree.accumulate(row, self.params.learning_rate, &mut scores);
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
    pub fn params(&self) -> &ObliviousParams {
        &self.params
    }
}

impl ProbabilisticClassifier for ObliviousBooster {
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

/// Grow one oblivious tree: greedily pick the best shared split per level,
/// then fill leaves with full-data Newton values.
fn grow_tree(
    binned: &BinnedMatrix,
    grads: &[f64],
    hess: &[f64],
    n_classes: usize,
    params: &ObliviousParams,
) -> ObliviousTree {
    let n_rows = binned.n_rows();
    let n_features = binned.n_features();

    let mut splits: Vec<(u32, f64)> = Vec::with_capacity(params.depth);
    let mut leaf_of = vec![0usize; n_rows];

    for level in 0..params.depth {
        if n_features == 0 {
            break;
        }
        let n_leaves = 1usize << level;
        let mut best: Option<(usize, usize, f64)> = None; // (feature, bin, score)

        for feature in 0..n_features {
            let n_bins = binned.n_bins(feature);
            if n_bins < 2 {
                continue;
            }

            // Per (leaf, bin, class) statistics for this feature.
            let mut grad_hist = vec![0.0f64; n_leaves * n_bins * n_classes];
            let mut hess_hist = vec![0.0f64; n_leaves * n_bins * n_classes];
            for i in 0..n_rows {
                let bin = binned.bin(i, feature) as usize;
                let base = (leaf_of[i] * n_bins + bin) * n_classes;
                for class in 0..n_classes {
                    grad_hist[base + class] += grads[i * n_classes + class];
                    hess_hist[base + class] += hess[i * n_classes + class];
                }
            }

            // Leaf totals, for the right-hand side of each candidate cut.
            let mut grad_total = vec![0.0f64; n_leaves * n_classes];
            let mut hess_total = vec![0.0f64; n_leaves * n_classes];
            for leaf in 0..n_leaves {
                for bin in 0..n_bins {
                    let base = (leaf * n_bins + bin) * n_classes;
                    for class in 0..n_classes {
                        grad_total[leaf * n_classes + class] += grad_hist[base + class];
                        hess_total[leaf * n_classes + class] += hess_hist[base + class];
                    }
                }
            }

            let mut left_grad = vec![0.0f64; n_leaves * n_classes];
            let mut left_hess = vec![0.0f64; n_leaves * n_classes];
            for bin in 0..n_bins - 1 {
                let mut score = 0.0;
                for leaf in 0..n_leaves {
                    for class in 0..n_classes {
                        let slot = leaf * n_classes + class;
                        let base = (leaf * n_bins + bin) * n_classes + class;
                        left_grad[slot] += grad_hist[base];
                        left_hess[slot] += hess_hist[base];

                        let lg = left_grad[slot];
                        let lh = left_hess[slot];
                        let rg = grad_total[slot] - lg;
                        let rh = hess_total[slot] - lh;
                        score += lg * lg / (lh + params.l2_regularization)
                            + rg * rg / (rh + params.l2_regularization);
                    }
                }
                if best.is_none_or(|(_, _, best_score)| score > best_score) {
                    best = Some((feature, bin, score));
                }
            }
        }

        let Some((feature, bin, _)) = best else {
            break;
        };
        let threshold = binned.threshold(feature, bin);
        splits.push((feature as u32, threshold));
        for i in 0..n_rows {
            leaf_of[i] = (leaf_of[i] << 1) | usize::from(binned.bin(i, feature) as usize > bin);
        }
    }

    // Full-data Newton leaf values.
    let n_leaves = 1usize << splits.len();
    let mut grad_sum = vec![0.0f64; n_leaves * n_classes];
    let mut hess_sum = vec![0.0f64; n_leaves * n_classes];
    for i in 0..n_rows {
        let base = leaf_of[i] * n_classes;
        for class in 0..n_classes {
            grad_sum[base + class] += grads[i * n_classes + class];
            hess_sum[base + class] += hess[i * n_classes + class];
        }
    }
    let leaf_values: Vec<f64> = grad_sum
        .iter()
        .zip(&hess_sum)
        .map(|(&g, &h)| -g / (h + params.l2_regularization))
        .collect();

    ObliviousTree {
        splits,
        leaf_values,
        n_classes,
    }
}
