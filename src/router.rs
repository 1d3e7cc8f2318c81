//! Query routing at inference time.

use std::path::Path;

use crate::analysis::normalize;
use crate::artifact;
use crate::ensemble::VotingEnsemble;
use crate::error::{LodestarError, Result};
use crate::features::{SparseVector, TfIdfVectorizer};

/// The inference service: routes a free-form question to a destination id.
///
/// Holds the fitted vectorizer/ensemble pair read-only; routing never
/// mutates it, so one loaded router can be shared across threads and
/// serve concurrent queries.
#[derive(Debug)]
pub struct QueryRouter {
    vectorizer: TfIdfVectorizer,
    ensemble: VotingEnsemble,
}

impl QueryRouter {
    /// Build a router from an already-fitted pair.
    ///
    /// Rejects a pair whose dimensions do not match; such a pair would
    /// silently produce garbage predictions.
    pub fn new(vectorizer: TfIdfVectorizer, ensemble: VotingEnsemble) -> Result<Self> {
        if vectorizer.vocabulary_size() != ensemble.n_features() {
            return Err(LodestarError::artifact_mismatch(format!(
                "vectorizer dimension {} does not match ensemble dimension {}",
                vectorizer.vocabulary_size(),
                ensemble.n_features()
            )));
        }
        Ok(Self {
            vectorizer,
            ensemble,
        })
    }

    /// Load a router from a persisted artifact pair.
    pub fn load(vectorizer_path: &Path, ensemble_path: &Path) -> Result<Self> {
        let (vectorizer, ensemble) = artifact::load_pair(vectorizer_path, ensemble_path)?;
        Ok(Self {
            vectorizer,
            ensemble,
        })
    }

    /// Route a query to a destination id.
    ///
    /// Empty or whitespace-only queries are rejected before feature
    /// extraction; they would otherwise become a zero vector that the
    /// ensemble would classify arbitrarily.
    pub fn route(&self, query: &str) -> Result<u32> {
        let row = self.vectorize(query)?;
        self.ensemble.predict_one(&row)
    }

    /// Route a query and return every destination's averaged probability,
    /// highest first.
    pub fn route_with_scores(&self, query: &str) -> Result<Vec<(u32, f64)>> {
        let row = self.vectorize(query)?;
        let probs = self.ensemble.predict_proba(std::slice::from_ref(&row));

        let mut scored: Vec<(u32, f64)> = probs[0]
            .iter()
            .enumerate()
            .map(|(index, &p)| (self.ensemble.label_map().to_label(index), p))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("finite probabilities"));
        Ok(scored)
    }

    /// The destination ids this router can emit.
    pub fn destinations(&self) -> &[u32] {
        self.ensemble.classes()
    }

    /// The feature dimension of the loaded pair.
    pub fn dimension(&self) -> usize {
        self.ensemble.n_features()
    }

    fn vectorize(&self, query: &str) -> Result<SparseVector> {
        if query.trim().is_empty() {
            return Err(LodestarError::invalid_query(
                "query is empty or whitespace-only",
            ));
        }
        let normalized = normalize(query);
        Ok(self.vectorizer.transform(&normalized))
    }
}
