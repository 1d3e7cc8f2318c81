//! TF-IDF vectorizer over word n-grams.

use std::collections::HashMap;

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::analysis::word_ngrams;
use crate::error::Result;
use crate::features::vector::SparseVector;

/// Configuration for [`TfIdfVectorizer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfIdfConfig {
    /// Minimum word n-gram length.
    pub ngram_min: usize,
    /// Maximum word n-gram length.
    pub ngram_max: usize,
    /// Minimum number of distinct documents an n-gram must appear in.
    pub min_df: usize,
    /// Cap on the vocabulary size; the highest-count n-grams are kept.
    pub max_features: usize,
}

impl Default for TfIdfConfig {
    fn default() -> Self {
        Self {
            ngram_min: 1,
            ngram_max: 2,
            min_df: 3,
            max_features: 5000,
        }
    }
}

/// TF-IDF vectorizer for query feature extraction.
///
/// `fit` learns a vocabulary of word 1- and 2-grams from the training
/// corpus, discarding rare n-grams (below `min_df` distinct documents) and
/// capping the vocabulary at the `max_features` highest corpus-wide counts.
/// `transform` projects any text into that fixed vocabulary: counts are
/// weighted by smoothed inverse document frequency and the result is
/// L2-normalized. Out-of-vocabulary n-grams contribute nothing, so every
/// output has the same dimension as the fitted vocabulary.
#[derive(Clone, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    config: TfIdfConfig,
    /// Vocabulary: n-gram -> column index, indices assigned in
    /// lexicographic n-gram order.
    vocabulary: HashMap<String, u32>,
    /// Inverse document frequency per column.
    idf: Vec<f64>,
    /// Total number of documents seen during fitting.
    n_documents: usize,
}

impl std::fmt::Debug for TfIdfVectorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfIdfVectorizer")
            .field("vocabulary_size", &self.vocabulary.len())
            .field("n_documents", &self.n_documents)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for TfIdfVectorizer {
    fn default() -> Self {
        Self::new(TfIdfConfig::default())
    }
}

impl TfIdfVectorizer {
    /// Create a new, unfitted vectorizer.
    pub fn new(config: TfIdfConfig) -> Self {
        Self {
            config,
            vocabulary: HashMap::new(),
            idf: Vec::new(),
            n_documents: 0,
        }
    }

    /// Fit the vectorizer on a corpus of normalized documents.
    ///
    /// A corpus too small to clear the `min_df` threshold yields an empty
    /// vocabulary. That is a valid, degenerate fit: `transform` will then
    /// produce all-zero vectors of dimension zero.
    pub fn fit(&mut self, corpus: &[String]) -> Result<()> {
        self.n_documents = corpus.len();

        let mut document_frequency: AHashMap<String, usize> = AHashMap::new();
        let mut corpus_counts: AHashMap<String, u64> = AHashMap::new();

        for doc in corpus {
            let ngrams = word_ngrams(doc, self.config.ngram_min, self.config.ngram_max);
            let mut seen: AHashSet<&str> = AHashSet::new();
            for ngram in &ngrams {
                *corpus_counts.entry(ngram.clone()).or_insert(0) += 1;
                if seen.insert(ngram.as_str()) {
                    *document_frequency.entry(ngram.clone()).or_insert(0) += 1;
                }
            }
        }

        // Keep n-grams that clear the document-frequency threshold, then cap
        // at the highest corpus-wide counts. Ties break lexicographically so
        // repeated fits over the same corpus are identical.
        let mut retained: Vec<(String, usize)> = document_frequency
            .into_iter()
            .filter(|(_, df)| *df >= self.config.min_df)
            .collect();

        if retained.len() > self.config.max_features {
            retained.sort_by(|(term_a, _), (term_b, _)| {
                let count_a = corpus_counts[term_a];
                let count_b = corpus_counts[term_b];
                count_b.cmp(&count_a).then_with(|| term_a.cmp(term_b))
            });
            retained.truncate(self.config.max_features);
        }

        // Column order is lexicographic over the retained n-grams.
        retained.sort_by(|(term_a, _), (term_b, _)| term_a.cmp(term_b));

        let mut vocabulary = HashMap::with_capacity(retained.len());
        let mut idf = Vec::with_capacity(retained.len());
        for (index, (term, df)) in retained.into_iter().enumerate() {
            vocabulary.insert(term, index as u32);
            // Smoothed IDF: ln((1 + N) / (1 + df)) + 1
            idf.push(((1.0 + self.n_documents as f64) / (1.0 + df as f64)).ln() + 1.0);
        }

        self.vocabulary = vocabulary;
        self.idf = idf;

        Ok(())
    }

    /// Transform one normalized document into a TF-IDF feature vector.
    ///
    /// The output dimension is always the fitted vocabulary size.
    pub fn transform(&self, document: &str) -> SparseVector {
        let ngrams = word_ngrams(document, self.config.ngram_min, self.config.ngram_max);

        let mut counts: AHashMap<u32, f64> = AHashMap::new();
        for ngram in &ngrams {
            if let Some(&index) = self.vocabulary.get(ngram.as_str()) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(u32, f64)> = counts
            .into_iter()
            .map(|(index, count)| (index, count * self.idf[index as usize]))
            .collect();
        entries.sort_unstable_by_key(|(index, _)| *index);

        let (indices, values): (Vec<u32>, Vec<f64>) = entries.into_iter().unzip();
        let mut vector = SparseVector::new(self.vocabulary.len(), indices, values);
        vector.l2_normalize();
        vector
    }

    /// Transform a batch of normalized documents.
    pub fn transform_batch(&self, documents: &[String]) -> Vec<SparseVector> {
        documents.iter().map(|doc| self.transform(doc)).collect()
    }

    /// Size of the fitted vocabulary (the feature-vector dimension).
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Number of documents seen at fit time.
    pub fn n_documents(&self) -> usize {
        self.n_documents
    }

    /// The configuration this vectorizer was built with.
    pub fn config(&self) -> &TfIdfConfig {
        &self.config
    }
}
