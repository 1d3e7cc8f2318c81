//! Base learners for the voting ensemble.
//!
//! Two independently configured multi-class gradient-boosted tree
//! ensembles trained with a softmax log-loss objective:
//!
//! - [`HistBooster`]: shallow, strongly regularized trees grown depth-wise
//!   over histogram-binned features, with row and feature subsampling.
//! - [`ObliviousBooster`]: deeper symmetric (oblivious) trees, one split
//!   per level shared across all nodes, with an ordered-boosting style
//!   permutation governing how leaf statistics feed back into training.
//!
//! The two differ in tree construction and regularization on purpose: their
//! errors are weakly correlated, which is what makes averaging them better
//! than using either alone. They share no mutable state and may be fitted
//! in either order or in parallel.

pub mod common;
pub mod hist;
pub mod oblivious;

pub use common::LabelMap;
pub use hist::{HistBooster, HistParams};
pub use oblivious::{ObliviousBooster, ObliviousParams};

use crate::features::SparseVector;

/// The capability both base learners expose to the voting ensemble.
///
/// This is a closed set of two implementations, not a plugin surface; the
/// ensemble composes them with a fixed averaging rule.
pub trait ProbabilisticClassifier {
    /// Per-row probability distribution over the fitted classes. Each
    /// output row has one entry per class and sums to 1.
    fn predict_proba(&self, rows: &[SparseVector]) -> Vec<Vec<f64>>;

    /// The original (1-indexed) destination ids, in dense column order.
    fn classes(&self) -> &[u32];
}
