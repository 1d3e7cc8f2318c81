//! Criterion benchmarks for the Lodestar query router.
//!
//! Covers the hot paths:
//! - TF-IDF vectorizer fitting and transformation
//! - Single-query routing through a trained pipeline

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use lodestar::analysis::normalize;
use lodestar::ensemble::{EnsembleConfig, VotingEnsemble};
use lodestar::features::{TfIdfConfig, TfIdfVectorizer};
use lodestar::learner::{HistParams, ObliviousParams};
use lodestar::router::QueryRouter;

/// Generate synthetic questions cycling over a few topical vocabularies.
fn generate_questions(count: usize) -> Vec<(String, u32)> {
    let topics: [&[&str]; 3] = [
        &["anxious", "worry", "stress", "fear", "panic", "nervous"],
        &["career", "job", "work", "salary", "promotion", "office"],
        &["sleep", "rest", "night", "tired", "dream", "morning"],
    ];

    (0..count)
        .map(|i| {
            let topic = i % topics.len();
            let words = topics[topic];
            let question = format!(
                "how do i handle {} and {} in my daily {}",
                words[i % words.len()],
                words[(i / 3) % words.len()],
                words[(i / 7) % words.len()]
            );
            (question, topic as u32 + 1)
        })
        .collect()
}

fn bench_vectorizer(c: &mut Criterion) {
    let corpus: Vec<String> = generate_questions(1000)
        .into_iter()
        .map(|(question, _)| normalize(&question))
        .collect();

    let mut group = c.benchmark_group("vectorizer");
    group.throughput(Throughput::Elements(corpus.len() as u64));

    group.bench_function("fit_1000_docs", |b| {
        b.iter(|| {
            let mut vectorizer = TfIdfVectorizer::new(TfIdfConfig::default());
            vectorizer.fit(black_box(&corpus)).unwrap();
            black_box(vectorizer.vocabulary_size())
        })
    });

    let mut vectorizer = TfIdfVectorizer::new(TfIdfConfig::default());
    vectorizer.fit(&corpus).unwrap();

    group.bench_function("transform_single", |b| {
        b.iter(|| black_box(vectorizer.transform(black_box(&corpus[0]))))
    });

    group.finish();
}

fn bench_route(c: &mut Criterion) {
    let data = generate_questions(300);
    let texts: Vec<String> = data.iter().map(|(q, _)| normalize(q)).collect();
    let labels: Vec<u32> = data.iter().map(|(_, d)| *d).collect();

    let mut vectorizer = TfIdfVectorizer::new(TfIdfConfig::default());
    vectorizer.fit(&texts).unwrap();
    let rows = vectorizer.transform_batch(&texts);

    let config = EnsembleConfig {
        hist: HistParams {
            n_rounds: 20,
            ..HistParams::default()
        },
        oblivious: ObliviousParams {
            n_rounds: 20,
            depth: 4,
            ..ObliviousParams::default()
        },
    };
    let ensemble = VotingEnsemble::fit(&rows, &labels, config).unwrap();
    let router = QueryRouter::new(vectorizer, ensemble).unwrap();

    c.bench_function("route_single_query", |b| {
        b.iter(|| {
            router
                .route(black_box("how do i stop the worry about my job at night"))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_vectorizer, bench_route);
criterion_main!(benches);
