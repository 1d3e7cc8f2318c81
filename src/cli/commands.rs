//! Command implementations for the Lodestar CLI.

use crate::artifact;
use crate::cli::args::*;
use crate::cli::output::*;
use crate::dataset::{AssemblyConfig, DatasetSource, assemble_dataset};
use crate::error::Result;
use crate::router::QueryRouter;
use crate::trainer::{Trainer, TrainerConfig};

/// Execute a CLI command.
pub fn execute_command(args: LodestarArgs) -> Result<()> {
    match &args.command {
        Command::Assemble(assemble_args) => run_assemble(assemble_args.clone(), &args),
        Command::Train(train_args) => run_train(train_args.clone(), &args),
        Command::Route(route_args) => run_route(route_args.clone(), &args),
        Command::Inspect(inspect_args) => run_inspect(inspect_args.clone(), &args),
    }
}

/// Assemble a balanced, shuffled training dataset.
fn run_assemble(args: AssembleArgs, cli_args: &LodestarArgs) -> Result<()> {
    if cli_args.verbosity() > 0 {
        println!(
            "Assembling {} destinations from {}",
            args.destinations,
            args.source_dir.display()
        );
    }

    let sources: Vec<DatasetSource> = (1..=args.destinations)
        .map(|destination| DatasetSource {
            destination,
            path: args
                .source_dir
                .join(format!("{}{destination}_QA.csv", args.prefix)),
        })
        .collect();

    let config = AssemblyConfig {
        sample_seed: args.sample_seed,
        shuffle_seed: args.shuffle_seed,
    };
    let summary = assemble_dataset(&sources, &args.output, &config)?;

    if cli_args.verbosity() > 0 {
        for skipped in &summary.skipped_sources {
            eprintln!("Skipped source: {skipped}");
        }
    }

    output_result(
        &format!("Dataset written to {}", args.output.display()),
        &summary,
        cli_args,
    )?;

    Ok(())
}

/// Train the router and persist the artifact pair.
fn run_train(args: TrainArgs, cli_args: &LodestarArgs) -> Result<()> {
    if cli_args.verbosity() > 0 {
        println!("Training router from {}", args.dataset.display());
    }

    let mut config = TrainerConfig::new(
        args.dataset.clone(),
        args.vectorizer.clone(),
        args.ensemble.clone(),
    );
    config.training_timeout = args.timeout.map(std::time::Duration::from_secs);
    let pipeline = Trainer::new(config).run()?;

    output_result("Training complete", &pipeline.report, cli_args)?;

    if cli_args.verbosity() > 0 {
        // The reported accuracy is measured on the training data itself.
        println!(
            "Note: training_accuracy is a fit check against the training set, \
             not a generalization estimate."
        );
    }

    // Optional post-training smoke check on sample queries.
    if !args.samples.is_empty() {
        let router = QueryRouter::new(pipeline.vectorizer, pipeline.ensemble)?;
        for query in &args.samples {
            match router.route(query) {
                Ok(destination) => println!("{query} -> destination {destination}"),
                Err(e) => eprintln!("{query} -> {e}"),
            }
        }
    }

    Ok(())
}

/// Route one query through a persisted artifact pair.
fn run_route(args: RouteArgs, cli_args: &LodestarArgs) -> Result<()> {
    if cli_args.verbosity() > 1 {
        println!(
            "Loading artifacts: {} / {}",
            args.vectorizer.display(),
            args.ensemble.display()
        );
    }

    let router = QueryRouter::load(&args.vectorizer, &args.ensemble)?;

    let scores = if args.scores {
        Some(router.route_with_scores(&args.query)?)
    } else {
        None
    };
    let destination = match &scores {
        Some(scored) => scored[0].0,
        None => router.route(&args.query)?,
    };

    output_result(
        "Query routed",
        &RouteResult {
            query: args.query.clone(),
            destination,
            scores,
        },
        cli_args,
    )?;

    Ok(())
}

/// Print artifact header metadata.
fn run_inspect(args: InspectArgs, cli_args: &LodestarArgs) -> Result<()> {
    let header = artifact::read_header(&args.artifact)?;

    output_result(
        "Artifact header",
        &InspectResult {
            path: args.artifact.display().to_string(),
            format_version: header.format_version,
            dimension: header.dimension,
            n_classes: header.n_classes,
            created_at: header.created_at,
        },
        cli_args,
    )?;

    Ok(())
}
