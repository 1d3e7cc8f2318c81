//! Core dataset types.

use serde::{Deserialize, Serialize};

/// One labeled training example.
///
/// `destination` is the 1-indexed id of the specialist model that should
/// answer `question`. Destination ids are drawn from exactly the set of
/// known destinations; the learners map them to a dense 0-indexed range
/// internally and map predictions back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// The raw question text.
    pub question: String,
    /// The 1-indexed destination id.
    pub destination: u32,
}

impl Example {
    /// Create a new example.
    pub fn new<S: Into<String>>(question: S, destination: u32) -> Self {
        Self {
            question: question.into(),
            destination,
        }
    }
}
