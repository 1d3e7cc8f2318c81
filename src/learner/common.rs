//! Shared machinery for the gradient-boosted learners.

use serde::{Deserialize, Serialize};

use crate::error::{LodestarError, Result};
use crate::features::SparseVector;

/// Mapping between 1-indexed destination ids and the dense 0-indexed class
/// range used while fitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    classes: Vec<u32>,
}

impl LabelMap {
    /// Build the mapping from training labels.
    ///
    /// Requires at least two distinct classes; a single-class dataset
    /// cannot be routed and is a data-integrity failure.
    pub fn fit(labels: &[u32]) -> Result<Self> {
        let mut classes: Vec<u32> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(LodestarError::data_integrity(format!(
                "training requires at least 2 destination classes, got {}",
                classes.len()
            )));
        }
        Ok(Self { classes })
    }

    /// Number of distinct classes.
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Dense 0-indexed class for a destination id.
    pub fn to_dense(&self, label: u32) -> Option<usize> {
        self.classes.binary_search(&label).ok()
    }

    /// Destination id for a dense class index.
    pub fn to_label(&self, index: usize) -> u32 {
        self.classes[index]
    }

    /// All destination ids in dense column order.
    pub fn classes(&self) -> &[u32] {
        &self.classes
    }

    /// Map every training label into the dense range.
    pub fn dense_labels(&self, labels: &[u32]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|&label| {
                self.to_dense(label).ok_or_else(|| {
                    LodestarError::data_integrity(format!("unknown destination id {label}"))
                })
            })
            .collect()
    }
}

/// In-place softmax over one row of raw scores.
pub(crate) fn softmax(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for score in scores.iter_mut() {
        *score = (*score - max).exp();
        sum += *score;
    }
    if sum > 0.0 {
        for score in scores.iter_mut() {
            *score /= sum;
        }
    }
}

/// Floor applied to hessians so Newton steps stay bounded.
pub(crate) const HESSIAN_FLOOR: f64 = 1e-16;

/// Validate a feature matrix / label vector pair before fitting.
pub(crate) fn validate_training_input(rows: &[SparseVector], labels: &[u32]) -> Result<usize> {
    if rows.is_empty() {
        return Err(LodestarError::data_integrity(
            "cannot fit on an empty feature matrix",
        ));
    }
    if rows.len() != labels.len() {
        return Err(LodestarError::data_integrity(format!(
            "feature matrix has {} rows but {} labels",
            rows.len(),
            labels.len()
        )));
    }
    let dim = rows[0].dim();
    if rows.iter().any(|row| row.dim() != dim) {
        return Err(LodestarError::data_integrity(
            "feature vectors have inconsistent dimensions",
        ));
    }
    Ok(dim)
}

/// Feature matrix pre-binned for histogram split finding.
///
/// Each feature's values are bucketed against a sorted list of candidate
/// thresholds (midpoints between consecutive distinct values, subsampled
/// down to the bin budget). Splitting "bin <= b" is equivalent to the raw
/// comparison `value <= threshold(b)`, which is what the fitted trees
/// store and what inference evaluates.
#[derive(Debug)]
pub(crate) struct BinnedMatrix {
    n_rows: usize,
    n_features: usize,
    /// Row-major bin ids.
    bins: Vec<u16>,
    /// Per-feature ascending candidate thresholds.
    thresholds: Vec<Vec<f64>>,
}

impl BinnedMatrix {
    pub fn from_rows(rows: &[SparseVector], max_bins: usize) -> Self {
        let n_rows = rows.len();
        let n_features = rows.first().map_or(0, |row| row.dim());

        // Distinct values per feature. Absent sparse entries are zero, so
        // zero is always a candidate value.
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); n_features];
        for row in rows {
            for (index, value) in row.iter() {
                values[index as usize].push(value);
            }
        }

        let mut thresholds = Vec::with_capacity(n_features);
        for feature_values in &mut values {
            feature_values.push(0.0);
            feature_values.sort_by(|a, b| a.partial_cmp(b).expect("feature values are finite"));
            feature_values.dedup();

            let mut cuts: Vec<f64> = feature_values
                .windows(2)
                .map(|pair| (pair[0] + pair[1]) / 2.0)
                .collect();

            // Respect the bin budget by striding over the candidate cuts.
            if cuts.len() > max_bins - 1 {
                let stride = cuts.len() as f64 / (max_bins - 1) as f64;
                cuts = (0..max_bins - 1)
                    .map(|i| cuts[(i as f64 * stride) as usize])
                    .collect();
            }
            thresholds.push(cuts);
        }

        let mut bins = vec![0u16; n_rows * n_features];
        for (row_index, row) in rows.iter().enumerate() {
            for (index, value) in row.iter() {
                let feature = index as usize;
                let bin = thresholds[feature].partition_point(|&t| t < value);
                bins[row_index * n_features + feature] = bin as u16;
            }
        }

        // Absent sparse entries are zero. The fill above leaves them in bin
        // 0, which is only correct while zero is the smallest value; a
        // feature with negative values needs its zero bucket placed.
        let zero_bins: Vec<u16> = thresholds
            .iter()
            .map(|cuts| cuts.partition_point(|&t| t < 0.0) as u16)
            .collect();
        if zero_bins.iter().any(|&bin| bin != 0) {
            for (row_index, row) in rows.iter().enumerate() {
                let mut nonzero = row.iter().map(|(index, _)| index as usize).peekable();
                for feature in 0..n_features {
                    if nonzero.peek() == Some(&feature) {
                        nonzero.next();
                        continue;
                    }
                    if zero_bins[feature] != 0 {
                        bins[row_index * n_features + feature] = zero_bins[feature];
                    }
                }
            }
        }

        Self {
            n_rows,
            n_features,
            bins,
            thresholds,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn bin(&self, row: usize, feature: usize) -> u16 {
        self.bins[row * self.n_features + feature]
    }

    /// Number of bins for a feature (thresholds + 1).
    pub fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }

    /// The raw split value equivalent to "bin <= bin_index".
    pub fn threshold(&self, feature: usize, bin_index: usize) -> f64 {
        self.thresholds[feature][bin_index]
    }
}

/// A binary regression tree node. `feature == -1` marks a leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TreeNode {
    pub feature: i32,
    pub threshold: f64,
    pub value: f64,
    pub left: Option<Box<TreeNode>>,
    pub right: Option<Box<TreeNode>>,
}

impl TreeNode {
    pub fn leaf(value: f64) -> Self {
        Self {
            feature: -1,
            threshold: 0.0,
            value,
            left: None,
            right: None,
        }
    }

    pub fn split(feature: usize, threshold: f64, left: TreeNode, right: TreeNode) -> Self {
        Self {
            feature: feature as i32,
            threshold,
            value: 0.0,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    /// Walk the tree for one feature vector.
    pub fn predict(&self, row: &SparseVector) -> f64 {
        let mut node = self;
        loop {
            if node.feature < 0 {
                return node.value;
            }
            let next = if row.get(node.feature as u32) <= node.threshold {
                node.left.as_deref()
            } else {
                node.right.as_deref()
            };
            match next {
                Some(child) => node = child,
                None => return node.value,
            }
        }
    }
}
