//! Feature extraction for query routing.
//!
//! Turns normalized query text into fixed-dimension sparse TF-IDF vectors.
//! The vectorizer is fitted once on the training corpus and then reused,
//! unchanged, by every inference call; queries are always projected into the
//! vocabulary learned at fit time.

pub mod tfidf;
pub mod vector;

pub use tfidf::{TfIdfConfig, TfIdfVectorizer};
pub use vector::SparseVector;
