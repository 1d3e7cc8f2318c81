//! End-to-end pipeline scenarios: assemble, train, persist, load, route.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tempfile::TempDir;

use lodestar::dataset::{AssemblyConfig, DatasetSource, assemble_dataset, load_examples};
use lodestar::ensemble::EnsembleConfig;
use lodestar::error::LodestarError;
use lodestar::learner::{HistParams, ObliviousParams};
use lodestar::router::QueryRouter;
use lodestar::trainer::{Trainer, TrainerConfig};

/// Topic vocabulary per destination, used to generate distinctive
/// synthetic questions.
const TOPICS: [(u32, &[&str]); 3] = [
    (
        1,
        &[
            "i feel anxious about my exam results",
            "my anxiety keeps me awake before tests",
            "how do i stop worrying about grades",
            "i am stressed about my upcoming exams",
            "worry about school results consumes me",
        ],
    ),
    (
        2,
        &[
            "should i quit my job for a new career",
            "how do i find meaningful work",
            "my career feels stuck and pointless",
            "what job should i choose next year",
            "i want a new direction in my work",
        ],
    ),
    (
        3,
        &[
            "i cannot sleep at night anymore",
            "how do i fix my broken sleep schedule",
            "my mind races when i try to sleep",
            "what helps with restless nights",
            "i wake up tired every single morning",
        ],
    ),
];

fn write_source_csv(path: &Path, destination: u32, rows: usize) {
    let templates = TOPICS
        .iter()
        .find(|(d, _)| *d == destination)
        .map(|(_, t)| *t)
        .unwrap();

    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(["question", "answer"]).unwrap();
    for i in 0..rows {
        let question = format!("{} variation {i}", templates[i % templates.len()]);
        writer
            .write_record([question.as_str(), "a calm and wise answer"])
            .unwrap();
    }
    writer.flush().unwrap();
}

/// Sources with raw counts {1: 120, 2: 95, 3: 140}.
fn write_sources(dir: &Path) -> Vec<DatasetSource> {
    let counts = [(1u32, 120usize), (2, 95), (3, 140)];
    counts
        .iter()
        .map(|&(destination, rows)| {
            let path = dir.join(format!("Destination_{destination}_QA.csv"));
            write_source_csv(&path, destination, rows);
            DatasetSource { destination, path }
        })
        .collect()
}

fn fast_trainer_config(dataset: &Path, dir: &Path) -> TrainerConfig {
    let mut config = TrainerConfig::new(
        dataset.to_path_buf(),
        dir.join("vectorizer.bin"),
        dir.join("ensemble.bin"),
    );
    config.ensemble = EnsembleConfig {
        hist: HistParams {
            n_rounds: 30,
            ..HistParams::default()
        },
        oblivious: ObliviousParams {
            n_rounds: 30,
            depth: 4,
            ..ObliviousParams::default()
        },
    };
    config
}

#[test]
fn test_assembly_balances_to_minimum_raw_count() {
    let dir = TempDir::new().unwrap();
    let sources = write_sources(dir.path());
    let output = dir.path().join("router_dataset.csv");

    let summary = assemble_dataset(&sources, &output, &AssemblyConfig::default()).unwrap();

    assert_eq!(summary.destinations, 3);
    assert_eq!(summary.per_destination, 95);
    assert_eq!(summary.total, 285);

    let examples = load_examples(&output).unwrap();
    assert_eq!(examples.len(), 285);

    let mut counts: HashMap<u32, usize> = HashMap::new();
    for example in &examples {
        *counts.entry(example.destination).or_insert(0) += 1;
    }
    assert_eq!(counts[&1], 95);
    assert_eq!(counts[&2], 95);
    assert_eq!(counts[&3], 95);
}

#[test]
fn test_assembly_is_byte_identical_across_runs() {
    let dir = TempDir::new().unwrap();
    let sources = write_sources(dir.path());

    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");
    assemble_dataset(&sources, &first, &AssemblyConfig::default()).unwrap();
    assemble_dataset(&sources, &second, &AssemblyConfig::default()).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_trained_router_round_trips_through_artifacts() {
    let dir = TempDir::new().unwrap();
    let sources = write_sources(dir.path());
    let dataset = dir.path().join("router_dataset.csv");
    assemble_dataset(&sources, &dataset, &AssemblyConfig::default()).unwrap();

    let config = fast_trainer_config(&dataset, dir.path());
    let pipeline = Trainer::new(config.clone()).run().unwrap();

    assert_eq!(pipeline.report.examples, 285);
    assert_eq!(pipeline.report.destinations, 3);
    assert!(pipeline.report.vocabulary_size > 0);
    // Three cleanly separated topics: the pipeline must fit its own
    // training data well. This is a fit check, not generalization.
    assert!(
        pipeline.report.training_accuracy > 0.9,
        "training accuracy was {}",
        pipeline.report.training_accuracy
    );

    let in_memory = QueryRouter::new(pipeline.vectorizer, pipeline.ensemble).unwrap();
    let loaded = QueryRouter::load(&config.vectorizer_path, &config.ensemble_path).unwrap();

    let queries = [
        "I'm anxious about my exam results.",
        "should I look for a different career",
        "why can I never fall asleep",
        "what should I do with my life",
    ];
    for query in queries {
        let from_memory = in_memory.route(query).unwrap();
        let from_disk = loaded.route(query).unwrap();
        assert_eq!(from_memory, from_disk, "diverged on {query:?}");
        assert!(loaded.destinations().contains(&from_disk));
    }

    // Repeated calls with the same loaded pair return the same id.
    let first = loaded.route("I'm anxious about my exam results.").unwrap();
    for _ in 0..5 {
        assert_eq!(
            loaded.route("I'm anxious about my exam results.").unwrap(),
            first
        );
    }
}

#[test]
fn test_topical_queries_reach_their_destination() {
    let dir = TempDir::new().unwrap();
    let sources = write_sources(dir.path());
    let dataset = dir.path().join("router_dataset.csv");
    assemble_dataset(&sources, &dataset, &AssemblyConfig::default()).unwrap();

    let config = fast_trainer_config(&dataset, dir.path());
    let pipeline = Trainer::new(config).run().unwrap();
    let router = QueryRouter::new(pipeline.vectorizer, pipeline.ensemble).unwrap();

    // Queries built from each destination's training vocabulary.
    assert_eq!(router.route("i feel anxious about my exam results").unwrap(), 1);
    assert_eq!(router.route("how do i find meaningful work").unwrap(), 2);
    assert_eq!(router.route("i cannot sleep at night anymore").unwrap(), 3);
}

#[test]
fn test_empty_query_is_rejected_not_routed() {
    let dir = TempDir::new().unwrap();
    let sources = write_sources(dir.path());
    let dataset = dir.path().join("router_dataset.csv");
    assemble_dataset(&sources, &dataset, &AssemblyConfig::default()).unwrap();

    let pipeline = Trainer::new(fast_trainer_config(&dataset, dir.path()))
        .run()
        .unwrap();
    let router = QueryRouter::new(pipeline.vectorizer, pipeline.ensemble).unwrap();

    for query in ["", "   ", "\n\t "] {
        match router.route(query) {
            Err(LodestarError::InvalidQuery(_)) => {}
            other => panic!("expected InvalidQuery, got {other:?}"),
        }
    }
}

#[test]
fn test_ensemble_probabilities_sum_to_one() {
    let dir = TempDir::new().unwrap();
    let sources = write_sources(dir.path());
    let dataset = dir.path().join("router_dataset.csv");
    assemble_dataset(&sources, &dataset, &AssemblyConfig::default()).unwrap();

    let pipeline = Trainer::new(fast_trainer_config(&dataset, dir.path()))
        .run()
        .unwrap();
    let router = QueryRouter::new(pipeline.vectorizer, pipeline.ensemble).unwrap();

    for query in [
        "i feel anxious",
        "career advice please",
        "completely unrelated gibberish zzz",
    ] {
        let scored = router.route_with_scores(query).unwrap();
        assert_eq!(scored.len(), 3);
        let total: f64 = scored.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9, "probabilities sum to {total}");
    }
}
