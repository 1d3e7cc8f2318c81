//! Text analysis for query routing.
//!
//! This module provides the normalization and word n-gram extraction that
//! feed the feature extractor. Normalization is deliberately the only text
//! transform shared between training and inference; the two call sites must
//! stay bit-identical.

pub mod ngram;
pub mod normalizer;

pub use ngram::word_ngrams;
pub use normalizer::normalize;
