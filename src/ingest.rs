//! Upstream dataset production.
//!
//! The router's training data comes from two external collaborators: a
//! content source that yields per-unit raw text for a destination, and a
//! generative labeler that turns a unit's text into (question, answer)
//! pairs under a destination persona. Both are consumed behind traits; the
//! configured labeler client is an explicitly passed handle with caller-
//! controlled lifetime, never ambient process-wide state.
//!
//! [`LabelingJob`] drives the two against a per-destination CSV
//! checkpoint. The checkpoint is appended and flushed after every
//! completed unit, so a crashed or cancelled job restarts from the last
//! completed unit instead of losing the batch. Per-unit failures are
//! recoverable: a failed fetch skips the unit, a failed labeling call is
//! retried once and then skipped. Neither aborts the run.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{LodestarError, Result};

/// Yields per-unit raw source text for a destination.
pub trait ContentSource {
    /// Number of content units available for a destination.
    fn unit_count(&self, destination: u32) -> Result<usize>;

    /// Fetch one unit's raw text. Failures here are handled per unit.
    fn fetch_unit(&self, destination: u32, unit: usize) -> Result<String>;
}

/// Generates labeled question/answer pairs from raw unit text.
pub trait Labeler {
    /// Produce (question, answer) pairs for a unit under a destination
    /// persona. A failing call is retried once before the unit is skipped.
    fn label(&self, text: &str, persona: &str) -> Result<Vec<QaPair>>;
}

/// One generated question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    /// The generated user question.
    pub question: String,
    /// The generated answer.
    pub answer: String,
}

/// A unit that was skipped and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedUnit {
    /// The unit index.
    pub unit: usize,
    /// The upstream failure that caused the skip.
    pub reason: String,
}

/// What one labeling run accomplished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    /// The destination the run labeled for.
    pub destination: u32,
    /// Units completed in this run (excluding previously checkpointed).
    pub units_completed: usize,
    /// Question/answer pairs appended in this run.
    pub pairs_written: usize,
    /// Units skipped after upstream failures.
    pub skipped: Vec<SkippedUnit>,
    /// The last unit found in the checkpoint at startup, if any.
    pub resumed_after: Option<usize>,
}

/// A resumable per-destination labeling job.
pub struct LabelingJob<'a> {
    source: &'a dyn ContentSource,
    labeler: &'a dyn Labeler,
    checkpoint_path: PathBuf,
}

impl<'a> LabelingJob<'a> {
    /// Create a job writing to the given checkpoint CSV.
    pub fn new(
        source: &'a dyn ContentSource,
        labeler: &'a dyn Labeler,
        checkpoint_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            labeler,
            checkpoint_path: checkpoint_path.into(),
        }
    }

    /// Label every remaining unit for a destination.
    ///
    /// Starts after the last unit already present in the checkpoint.
    /// Output is appended and flushed after each completed unit.
    pub fn run(&self, destination: u32, persona: &str) -> Result<JobSummary> {
        let resumed_after = last_completed_unit(&self.checkpoint_path, destination)?;
        let start = resumed_after.map_or(0, |unit| unit + 1);
        let unit_count = self.source.unit_count(destination)?;

        let write_header = !self.checkpoint_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.checkpoint_path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if write_header {
            writer.write_record(["destination", "unit", "question", "answer"])?;
            writer.flush()?;
        }

        let mut summary = JobSummary {
            destination,
            units_completed: 0,
            pairs_written: 0,
            skipped: Vec::new(),
            resumed_after,
        };

        for unit in start..unit_count {
            let text = match self.source.fetch_unit(destination, unit) {
                Ok(text) => text,
                Err(e) => {
                    summary.skipped.push(SkippedUnit {
                        unit,
                        reason: format!("fetch failed: {e}"),
                    });
                    continue;
                }
            };

            let pairs = match self.label_with_retry(&text, persona) {
                Ok(pairs) => pairs,
                Err(e) => {
                    summary.skipped.push(SkippedUnit {
                        unit,
                        reason: format!("labeling failed twice: {e}"),
                    });
                    continue;
                }
            };

            for pair in &pairs {
                writer.write_record([
                    destination.to_string(),
                    unit.to_string(),
                    pair.question.clone(),
                    pair.answer.clone(),
                ])?;
            }
            writer.flush()?;

            summary.units_completed += 1;
            summary.pairs_written += pairs.len();
        }

        Ok(summary)
    }

    fn label_with_retry(&self, text: &str, persona: &str) -> Result<Vec<QaPair>> {
        match self.labeler.label(text, persona) {
            Ok(pairs) => Ok(pairs),
            Err(_) => self.labeler.label(text, persona),
        }
    }
}

/// The highest unit index already checkpointed for a destination.
fn last_completed_unit(path: &Path, destination: u32) -> Result<Option<usize>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = ReaderBuilder::new().from_path(path)?;
    let headers = reader.headers()?.clone();
    let destination_index = headers.iter().position(|h| h == "destination");
    let unit_index = headers.iter().position(|h| h == "unit");
    let (Some(destination_index), Some(unit_index)) = (destination_index, unit_index) else {
        return Err(LodestarError::configuration(format!(
            "checkpoint {} is missing destination/unit columns",
            path.display()
        )));
    };

    let mut last = None;
    for record in reader.records() {
        let record = record?;
        let row_destination: u32 = record
            .get(destination_index)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if row_destination != destination {
            continue;
        }
        if let Some(unit) = record.get(unit_index).and_then(|v| v.parse::<usize>().ok()) {
            last = Some(last.map_or(unit, |current: usize| current.max(unit)));
        }
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use tempfile::TempDir;

    use super::*;

    struct FakeSource {
        units: Vec<&'static str>,
        /// Units whose fetch always fails.
        broken: Vec<usize>,
    }

    impl ContentSource for FakeSource {
        fn unit_count(&self, _destination: u32) -> Result<usize> {
            Ok(self.units.len())
        }

        fn fetch_unit(&self, _destination: u32, unit: usize) -> Result<String> {
            if self.broken.contains(&unit) {
                return Err(LodestarError::upstream("connection reset"));
            }
            Ok(self.units[unit].to_string())
        }
    }

    struct FakeLabeler {
        /// Transient failures to inject, consumed one per call.
        transient_failures: RefCell<usize>,
        /// Unit texts the labeler always fails on.
        broken_texts: Vec<&'static str>,
    }

    impl FakeLabeler {
        fn reliable() -> Self {
            Self {
                transient_failures: RefCell::new(0),
                broken_texts: Vec::new(),
            }
        }

        fn failing(times: usize) -> Self {
            Self {
                transient_failures: RefCell::new(times),
                broken_texts: Vec::new(),
            }
        }

        fn broken_on(texts: Vec<&'static str>) -> Self {
            Self {
                transient_failures: RefCell::new(0),
                broken_texts: texts,
            }
        }
    }

    impl Labeler for FakeLabeler {
        fn label(&self, text: &str, persona: &str) -> Result<Vec<QaPair>> {
            if self.broken_texts.iter().any(|t| *t == text) {
                return Err(LodestarError::upstream("service unavailable"));
            }
            let mut failures = self.transient_failures.borrow_mut();
            if *failures > 0 {
                *failures -= 1;
                return Err(LodestarError::upstream("service unavailable"));
            }
            Ok(vec![QaPair {
                question: format!("what does {text} mean for me"),
                answer: format!("{persona} says: reflect on {text}"),
            }])
        }
    }

    fn read_rows(path: &Path) -> Vec<(u32, usize, String)> {
        let mut reader = ReaderBuilder::new().from_path(path).unwrap();
        reader
            .records()
            .map(|record| {
                let record = record.unwrap();
                (
                    record[0].parse().unwrap(),
                    record[1].parse().unwrap(),
                    record[2].to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_labels_every_unit() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("dest_1.csv");
        let source = FakeSource {
            units: vec!["duty", "action", "stillness"],
            broken: vec![],
        };
        let labeler = FakeLabeler::reliable();

        let job = LabelingJob::new(&source, &labeler, &checkpoint);
        let summary = job.run(1, "a patient guide").unwrap();

        assert_eq!(summary.units_completed, 3);
        assert_eq!(summary.pairs_written, 3);
        assert!(summary.skipped.is_empty());
        assert_eq!(read_rows(&checkpoint).len(), 3);
    }

    #[test]
    fn test_fetch_failures_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("dest_1.csv");
        let source = FakeSource {
            units: vec!["a", "b", "c", "d"],
            broken: vec![1, 2],
        };
        let labeler = FakeLabeler::reliable();

        let summary = LabelingJob::new(&source, &labeler, &checkpoint)
            .run(1, "guide")
            .unwrap();

        assert_eq!(summary.units_completed, 2);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(summary.skipped[0].unit, 1);
    }

    #[test]
    fn test_labeler_is_retried_once() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("dest_1.csv");
        let source = FakeSource {
            units: vec!["only unit"],
            broken: vec![],
        };

        // One transient failure: the retry succeeds.
        let labeler = FakeLabeler::failing(1);
        let summary = LabelingJob::new(&source, &labeler, &checkpoint)
            .run(1, "guide")
            .unwrap();
        assert_eq!(summary.units_completed, 1);
        assert!(summary.skipped.is_empty());

        // Two failures in a row: the unit is skipped.
        let checkpoint_two = dir.path().join("dest_2.csv");
        let labeler = FakeLabeler::failing(2);
        let summary = LabelingJob::new(&source, &labeler, &checkpoint_two)
            .run(2, "guide")
            .unwrap();
        assert_eq!(summary.units_completed, 0);
        assert_eq!(summary.skipped.len(), 1);
    }

    #[test]
    fn test_resumes_after_last_completed_unit() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("dest_1.csv");
        let source = FakeSource {
            units: vec!["a", "b", "c", "d"],
            broken: vec![],
        };

        // First run: the labeler persistently fails on units 2 and 3, so
        // only units 0 and 1 land in the checkpoint.
        let labeler = FakeLabeler::broken_on(vec!["c", "d"]);
        let summary = LabelingJob::new(&source, &labeler, &checkpoint)
            .run(1, "guide")
            .unwrap();
        assert_eq!(summary.units_completed, 2);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(summary.resumed_after, None);

        // Second run resumes after unit 1 and completes the rest without
        // duplicating earlier rows.
        let labeler = FakeLabeler::reliable();
        let summary = LabelingJob::new(&source, &labeler, &checkpoint)
            .run(1, "guide")
            .unwrap();
        assert_eq!(summary.resumed_after, Some(1));
        assert_eq!(summary.units_completed, 2);

        let rows = read_rows(&checkpoint);
        assert_eq!(rows.len(), 4);
        let units: Vec<usize> = rows.iter().map(|(_, unit, _)| *unit).collect();
        assert_eq!(units, vec![0, 1, 2, 3]);
    }
}
