//! Training workflow orchestration.
//!
//! The trainer runs a linear state machine over the full pipeline:
//!
//! ```text
//! Idle -> Loaded -> Normalized -> FeaturesFit -> BaseLearnersFit
//!      -> EnsembleReady -> Evaluated -> Persisted
//! ```
//!
//! Each transition is a pure function of the previous state's output.
//! Failure at any transition aborts the run with an error naming the
//! transition; a partially trained artifact pair is never written.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::analysis::normalize;
use crate::artifact;
use crate::dataset::load_examples;
use crate::ensemble::{EnsembleConfig, VotingEnsemble};
use crate::error::{LodestarError, Result};
use crate::features::{SparseVector, TfIdfConfig, TfIdfVectorizer};

/// The transitions of the training state machine, used to report which
/// step a failed run aborted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingStage {
    /// Reading and validating the dataset file.
    Loaded,
    /// Normalizing question text.
    Normalized,
    /// Fitting the TF-IDF vectorizer.
    FeaturesFit,
    /// Fitting the two base learners.
    BaseLearnersFit,
    /// Assembling the voting ensemble.
    EnsembleReady,
    /// Evaluating training-set accuracy.
    Evaluated,
    /// Writing the artifact pair.
    Persisted,
}

impl std::fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrainingStage::Loaded => "Loaded",
            TrainingStage::Normalized => "Normalized",
            TrainingStage::FeaturesFit => "FeaturesFit",
            TrainingStage::BaseLearnersFit => "BaseLearnersFit",
            TrainingStage::EnsembleReady => "EnsembleReady",
            TrainingStage::Evaluated => "Evaluated",
            TrainingStage::Persisted => "Persisted",
        };
        f.write_str(name)
    }
}

/// Configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// The balanced, shuffled training dataset (CSV with `question`/`llm`).
    pub dataset_path: PathBuf,
    /// Where to write the fitted vectorizer artifact.
    pub vectorizer_path: PathBuf,
    /// Where to write the fitted ensemble artifact.
    pub ensemble_path: PathBuf,
    /// Feature-extraction settings.
    pub tfidf: TfIdfConfig,
    /// Base-learner settings.
    pub ensemble: EnsembleConfig,
    /// Bound on base-learner fitting. Overrun aborts the run; there is no
    /// mid-fit cancellation, so the caller abandons the whole run.
    pub training_timeout: Option<Duration>,
}

impl TrainerConfig {
    /// A configuration with default hyperparameters and the given paths.
    pub fn new(dataset_path: PathBuf, vectorizer_path: PathBuf, ensemble_path: PathBuf) -> Self {
        Self {
            dataset_path,
            vectorizer_path,
            ensemble_path,
            tfidf: TfIdfConfig::default(),
            ensemble: EnsembleConfig::default(),
            training_timeout: None,
        }
    }
}

/// What a successful training run produced.
///
/// `training_accuracy` is measured against the training data itself: it is
/// a fit sanity check, not a generalization estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Rows used for training after normalization.
    pub examples: usize,
    /// Rows dropped because they normalized to the empty string.
    pub dropped_empty: usize,
    /// Number of distinct destinations.
    pub destinations: usize,
    /// Fitted vocabulary size (the feature dimension).
    pub vocabulary_size: usize,
    /// Accuracy of the full pipeline on its own training data.
    pub training_accuracy: f64,
    /// Wall-clock training time.
    pub duration_ms: u64,
    /// Where the vectorizer artifact was written.
    pub vectorizer_path: PathBuf,
    /// Where the ensemble artifact was written.
    pub ensemble_path: PathBuf,
}

/// Orchestrates the full training workflow.
pub struct Trainer {
    config: TrainerConfig,
}

/// The in-memory result of a training run, before or after persistence.
#[derive(Debug)]
pub struct TrainedPipeline {
    /// The fitted feature extractor.
    pub vectorizer: TfIdfVectorizer,
    /// The fitted voting ensemble.
    pub ensemble: VotingEnsemble,
    /// The run report.
    pub report: TrainingReport,
}

impl Trainer {
    /// Create a trainer for the given configuration.
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Run the workflow end to end and persist the artifact pair.
    pub fn run(&self) -> Result<TrainedPipeline> {
        let start = Instant::now();

        // Loaded
        let examples = load_examples(&self.config.dataset_path)
            .and_then(|examples| {
                check_balance(&examples.iter().map(|e| e.destination).collect::<Vec<_>>())?;
                Ok(examples)
            })
            .map_err(|e| LodestarError::training_aborted(TrainingStage::Loaded, e))?;

        // Normalized
        let mut texts = Vec::with_capacity(examples.len());
        let mut labels = Vec::with_capacity(examples.len());
        let mut dropped_empty = 0usize;
        for example in &examples {
            let normalized = normalize(&example.question);
            if normalized.trim().is_empty() {
                dropped_empty += 1;
                continue;
            }
            texts.push(normalized);
            labels.push(example.destination);
        }
        if texts.is_empty() {
            return Err(LodestarError::training_aborted(
                TrainingStage::Normalized,
                LodestarError::data_integrity("every row normalized to the empty string"),
            ));
        }

        // FeaturesFit
        let mut vectorizer = TfIdfVectorizer::new(self.config.tfidf.clone());
        vectorizer
            .fit(&texts)
            .map_err(|e| LodestarError::training_aborted(TrainingStage::FeaturesFit, e))?;
        let rows = Arc::new(vectorizer.transform_batch(&texts));
        let labels = Arc::new(labels);

        // BaseLearnersFit + EnsembleReady
        let ensemble = match self.config.training_timeout {
            None => VotingEnsemble::fit(&rows, &labels, self.config.ensemble.clone()),
            Some(timeout) => fit_with_timeout(
                Arc::clone(&rows),
                Arc::clone(&labels),
                self.config.ensemble.clone(),
                timeout,
            ),
        }
        .map_err(|e| LodestarError::training_aborted(TrainingStage::BaseLearnersFit, e))?;

        // Evaluated
        let predictions = ensemble.predict(&rows);
        let correct = predictions
            .iter()
            .zip(labels.iter())
            .filter(|(predicted, label)| predicted == label)
            .count();
        let training_accuracy = correct as f64 / labels.len() as f64;

        // Persisted: encode both artifacts fully before writing either, so
        // a serialization failure never leaves one file behind.
        let vectorizer_bytes = artifact::encode_vectorizer(&vectorizer)
            .map_err(|e| LodestarError::training_aborted(TrainingStage::Persisted, e))?;
        let ensemble_bytes = artifact::encode_ensemble(&ensemble)
            .map_err(|e| LodestarError::training_aborted(TrainingStage::Persisted, e))?;
        std::fs::write(&self.config.vectorizer_path, vectorizer_bytes)
            .map_err(|e| LodestarError::training_aborted(TrainingStage::Persisted, e.into()))?;
        std::fs::write(&self.config.ensemble_path, ensemble_bytes)
            .map_err(|e| LodestarError::training_aborted(TrainingStage::Persisted, e.into()))?;

        let report = TrainingReport {
            examples: texts.len(),
            dropped_empty,
            destinations: ensemble.n_classes(),
            vocabulary_size: vectorizer.vocabulary_size(),
            training_accuracy,
            duration_ms: start.elapsed().as_millis() as u64,
            vectorizer_path: self.config.vectorizer_path.clone(),
            ensemble_path: self.config.ensemble_path.clone(),
        };

        Ok(TrainedPipeline {
            vectorizer,
            ensemble,
            report,
        })
    }
}

/// Fit the ensemble on a worker thread, bounding the wait.
///
/// On overrun the fit thread is abandoned, not cancelled; the run fails
/// and the caller walks away from it.
fn fit_with_timeout(
    rows: Arc<Vec<SparseVector>>,
    labels: Arc<Vec<u32>>,
    config: EnsembleConfig,
    timeout: Duration,
) -> Result<VotingEnsemble> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(VotingEnsemble::fit(&rows, &labels, config));
    });

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(LodestarError::other(format!(
            "base-learner fitting exceeded the {}ms timeout",
            timeout.as_millis()
        ))),
    }
}

/// Verify that every destination has the same number of rows.
///
/// The assembly step guarantees balance; a dataset that arrives imbalanced
/// was not produced by it and is unsafe to train on.
fn check_balance(labels: &[u32]) -> Result<()> {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    let min = counts.values().min().copied().unwrap_or(0);
    let max = counts.values().max().copied().unwrap_or(0);
    if min != max {
        return Err(LodestarError::data_integrity(format!(
            "dataset is imbalanced: per-destination counts range from {min} to {max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;
    use crate::learner::{HistParams, ObliviousParams};

    fn fast_config(dir: &TempDir) -> TrainerConfig {
        let mut config = TrainerConfig::new(
            dir.path().join("dataset.csv"),
            dir.path().join("vectorizer.bin"),
            dir.path().join("ensemble.bin"),
        );
        config.tfidf.min_df = 1;
        config.ensemble = EnsembleConfig {
            hist: HistParams {
                n_rounds: 10,
                ..HistParams::default()
            },
            oblivious: ObliviousParams {
                n_rounds: 10,
                depth: 3,
                ..ObliviousParams::default()
            },
        };
        config
    }

    fn write_dataset(config: &TrainerConfig, rows: &[(&str, u32)]) {
        let mut file = std::fs::File::create(&config.dataset_path).unwrap();
        writeln!(file, "question,llm").unwrap();
        for (question, destination) in rows {
            writeln!(file, "{question},{destination}").unwrap();
        }
    }

    fn balanced_rows() -> Vec<(&'static str, u32)> {
        let mut rows = Vec::new();
        for i in 0..10 {
            rows.push((
                ["how do i calm my anxious mind", "why am i always worried"][i % 2],
                1,
            ));
            rows.push((
                [
                    "what career should i choose next",
                    "how do i find meaningful work",
                ][i % 2],
                2,
            ));
        }
        rows
    }

    #[test]
    fn test_full_run_produces_artifacts_and_report() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(&dir);
        write_dataset(&config, &balanced_rows());

        let pipeline = Trainer::new(config.clone()).run().unwrap();
        let report = &pipeline.report;

        assert_eq!(report.examples, 20);
        assert_eq!(report.destinations, 2);
        assert!(report.vocabulary_size > 0);
        assert!(report.training_accuracy > 0.9);
        assert!(config.vectorizer_path.exists());
        assert!(config.ensemble_path.exists());
    }

    #[test]
    fn test_missing_dataset_aborts_in_loaded() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(&dir);

        let err = Trainer::new(config).run().unwrap_err();
        match err {
            LodestarError::TrainingAborted { stage, .. } => {
                assert_eq!(stage, TrainingStage::Loaded);
            }
            other => panic!("expected TrainingAborted, got {other}"),
        }
    }

    #[test]
    fn test_imbalanced_dataset_aborts_without_artifacts() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(&dir);
        let mut rows = balanced_rows();
        rows.push(("one extra question for destination one", 1));
        write_dataset(&config, &rows);

        let err = Trainer::new(config.clone()).run().unwrap_err();
        assert!(matches!(
            err,
            LodestarError::TrainingAborted {
                stage: TrainingStage::Loaded,
                ..
            }
        ));
        assert!(!config.vectorizer_path.exists());
        assert!(!config.ensemble_path.exists());
    }

    #[test]
    fn test_all_rows_empty_after_normalization_aborts() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(&dir);
        write_dataset(&config, &[("?!", 1), ("...", 2)]);

        let err = Trainer::new(config).run().unwrap_err();
        assert!(matches!(
            err,
            LodestarError::TrainingAborted {
                stage: TrainingStage::Normalized,
                ..
            }
        ));
    }

    #[test]
    fn test_training_timeout_aborts_the_run() {
        let dir = TempDir::new().unwrap();
        let mut config = fast_config(&dir);
        // Enough boosting rounds that fitting cannot finish in a
        // millisecond.
        config.ensemble.hist.n_rounds = 50_000;
        config.training_timeout = Some(Duration::from_millis(1));
        write_dataset(&config, &balanced_rows());

        let err = Trainer::new(config.clone()).run().unwrap_err();
        assert!(matches!(
            err,
            LodestarError::TrainingAborted {
                stage: TrainingStage::BaseLearnersFit,
                ..
            }
        ));
        assert!(!config.vectorizer_path.exists());
        assert!(!config.ensemble_path.exists());
    }

    #[test]
    fn test_accuracy_is_reported_against_training_data() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(&dir);
        write_dataset(&config, &balanced_rows());

        let pipeline = Trainer::new(config).run().unwrap();
        // Two cleanly separated topics; the pipeline must fit its own
        // training data essentially perfectly.
        assert!(pipeline.report.training_accuracy >= 0.95);
    }
}
