//! Balanced, shuffled training-set assembly.
//!
//! Merges per-destination labeled CSVs into one training file. Every
//! destination is sampled down to the smallest per-destination count, the
//! combined rows are shuffled, and the result is written with `question`
//! and `llm` columns. Both the sampling and the shuffle run under fixed
//! seeds, so the output is a deterministic function of the inputs.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::dataset::loader::QUESTION_COLUMN;
use crate::dataset::types::Example;
use crate::error::{LodestarError, Result};

/// A per-destination source file for assembly.
#[derive(Debug, Clone)]
pub struct DatasetSource {
    /// The 1-indexed destination id the file's questions belong to.
    pub destination: u32,
    /// Path to a CSV with at least a `question` column.
    pub path: PathBuf,
}

/// Seeds controlling the assembly step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Seed for per-destination downsampling.
    pub sample_seed: u64,
    /// Seed for the final shuffle.
    pub shuffle_seed: u64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            sample_seed: 69,
            shuffle_seed: 96,
        }
    }
}

/// What the assembly step produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblySummary {
    /// Number of destinations that contributed rows.
    pub destinations: usize,
    /// Rows kept per destination (the minimum raw count).
    pub per_destination: usize,
    /// Total rows written.
    pub total: usize,
    /// Sources skipped because they were unreadable or lacked a
    /// `question` column.
    pub skipped_sources: Vec<String>,
}

/// Merge per-destination CSVs into one balanced, shuffled training file.
///
/// Unreadable sources and sources without a `question` column are skipped
/// and reported in the summary rather than aborting the whole run. An
/// assembly where no source contributes rows is a data-integrity error.
pub fn assemble_dataset(
    sources: &[DatasetSource],
    output: &Path,
    config: &AssemblyConfig,
) -> Result<AssemblySummary> {
    let mut groups: Vec<(u32, Vec<String>)> = Vec::new();
    let mut skipped = Vec::new();

    for source in sources {
        match read_questions(&source.path) {
            Ok(questions) if !questions.is_empty() => {
                groups.push((source.destination, questions));
            }
            Ok(_) => skipped.push(format!("{}: no rows", source.path.display())),
            Err(e) => skipped.push(format!("{}: {e}", source.path.display())),
        }
    }

    if groups.is_empty() {
        return Err(LodestarError::data_integrity(
            "no usable sources; nothing to assemble",
        ));
    }

    let examples = balance_and_shuffle(groups, config);
    let per_destination = examples.len() / count_destinations(&examples);

    write_examples(output, &examples)?;

    Ok(AssemblySummary {
        destinations: count_destinations(&examples),
        per_destination,
        total: examples.len(),
        skipped_sources: skipped,
    })
}

/// Balance groups to the minimum per-destination count, concatenate, and
/// shuffle. Exposed for in-memory pipelines and tests.
pub fn balance_and_shuffle(
    mut groups: Vec<(u32, Vec<String>)>,
    config: &AssemblyConfig,
) -> Vec<Example> {
    // Deterministic regardless of the order sources were passed in.
    groups.sort_by_key(|(destination, _)| *destination);

    let min_size = groups
        .iter()
        .map(|(_, questions)| questions.len())
        .min()
        .unwrap_or(0);

    let mut examples = Vec::with_capacity(min_size * groups.len());
    for (destination, questions) in groups {
        // Re-seed per destination, mirroring a fixed random_state applied
        // to each source independently.
        let mut rng = StdRng::seed_from_u64(config.sample_seed);
        let picks = rand::seq::index::sample(&mut rng, questions.len(), min_size);
        for index in picks.iter() {
            examples.push(Example::new(questions[index].clone(), destination));
        }
    }

    let mut rng = StdRng::seed_from_u64(config.shuffle_seed);
    examples.shuffle(&mut rng);
    examples
}

fn read_questions(path: &Path) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let headers = reader.headers()?.clone();
    let question_index = headers
        .iter()
        .position(|h| h == QUESTION_COLUMN)
        .ok_or_else(|| {
            LodestarError::configuration(format!("missing {QUESTION_COLUMN:?} column"))
        })?;

    let mut questions = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(question) = record.get(question_index) {
            if !question.is_empty() {
                questions.push(question.to_string());
            }
        }
    }
    Ok(questions)
}

fn write_examples(path: &Path, examples: &[Example]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(["question", "llm"])?;
    for example in examples {
        writer.write_record([example.question.clone(), example.destination.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

fn count_destinations(examples: &[Example]) -> usize {
    let mut destinations: Vec<u32> = examples.iter().map(|e| e.destination).collect();
    destinations.sort_unstable();
    destinations.dedup();
    destinations.len()
}
