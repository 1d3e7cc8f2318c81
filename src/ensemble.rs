//! Soft-voting ensemble over the two base learners.

use serde::{Deserialize, Serialize};

use crate::error::{LodestarError, Result};
use crate::features::SparseVector;
use crate::learner::{
    HistBooster, HistParams, LabelMap, ObliviousBooster, ObliviousParams, ProbabilisticClassifier,
};

/// Configuration for [`VotingEnsemble::fit`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Hyperparameters for the histogram booster.
    pub hist: HistParams,
    /// Hyperparameters for the oblivious booster.
    pub oblivious: ObliviousParams,
}

/// A fixed-arity soft-voting ensemble.
///
/// Fitting the ensemble means fitting both base learners on identical
/// inputs; it holds no learned parameters beyond them. Prediction averages
/// the two learners' per-class probability estimates and emits the arg-max
/// class, ties broken by the lower class index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingEnsemble {
    hist: HistBooster,
    oblivious: ObliviousBooster,
    n_features: usize,
}

impl VotingEnsemble {
    /// Fit both base learners on the same `(rows, labels)` pair.
    ///
    /// The learners share no mutable state, so they are fitted in
    /// parallel; this call blocks until both complete.
    pub fn fit(rows: &[SparseVector], labels: &[u32], config: EnsembleConfig) -> Result<Self> {
        let EnsembleConfig { hist, oblivious } = config;
        let (hist, oblivious) = rayon::join(
            || HistBooster::fit(rows, labels, hist),
            || ObliviousBooster::fit(rows, labels, oblivious),
        );
        let hist = hist?;
        let oblivious = oblivious?;

        debug_assert_eq!(hist.classes(), oblivious.classes());

        let n_features = hist.n_features();
        Ok(Self {
            hist,
            oblivious,
            n_features,
        })
    }

    /// Averaged per-class probabilities, one row per input.
    pub fn predict_proba(&self, rows: &[SparseVector]) -> Vec<Vec<f64>> {
        let hist_probs = self.hist.predict_proba(rows);
        let oblivious_probs = self.oblivious.predict_proba(rows);

        hist_probs
            .into_iter()
            .zip(oblivious_probs)
            .map(|(a, b)| {
                a.into_iter()
                    .zip(b)
                    .map(|(pa, pb)| (pa + pb) / 2.0)
                    .collect()
            })
            .collect()
    }

    /// Predicted destination ids (arg-max of the averaged probabilities,
    /// ties broken by the lower class index).
    pub fn predict(&self, rows: &[SparseVector]) -> Vec<u32> {
        self.predict_proba(rows)
            .into_iter()
            .map(|probs| self.label_map().to_label(argmax(&probs)))
            .collect()
    }

    /// Validate and predict a single row.
    pub fn predict_one(&self, row: &SparseVector) -> Result<u32> {
        if row.dim() != self.n_features {
            return Err(LodestarError::artifact_mismatch(format!(
                "feature vector has dimension {} but the ensemble expects {}",
                row.dim(),
                self.n_features
            )));
        }
        Ok(self.predict(std::slice::from_ref(row))[0])
    }

    /// The fitted label map (shared by both learners).
    pub fn label_map(&self) -> &LabelMap {
        self.hist.label_map()
    }

    /// Destination ids in dense column order.
    pub fn classes(&self) -> &[u32] {
        self.hist.classes()
    }

    /// Number of destination classes.
    pub fn n_classes(&self) -> usize {
        self.label_map().n_classes()
    }

    /// Feature dimension both learners were fitted on.
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

/// Index of the largest value; the first occurrence wins on ties.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, &value) in values.iter().enumerate().skip(1) {
        if value > values[best] {
            best = index;
        }
    }
    best
}
