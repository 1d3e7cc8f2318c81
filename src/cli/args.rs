//! Command line argument parsing for the Lodestar CLI using clap.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lodestar - a trained query router for specialist response models
#[derive(Parser, Debug, Clone)]
#[command(name = "lodestar")]
#[command(about = "Train and serve a query router over specialist response models")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct LodestarArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl LodestarArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Output formats for command results.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    Human,
    /// JSON
    Json,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Merge per-destination CSVs into a balanced, shuffled dataset
    Assemble(AssembleArgs),

    /// Train the router and persist the artifact pair
    Train(TrainArgs),

    /// Route a query through a persisted artifact pair
    Route(RouteArgs),

    /// Show artifact header metadata
    Inspect(InspectArgs),
}

/// Arguments for dataset assembly
#[derive(Parser, Debug, Clone)]
pub struct AssembleArgs {
    /// Directory holding per-destination source CSVs
    #[arg(value_name = "SOURCE_DIR")]
    pub source_dir: PathBuf,

    /// Number of destinations; sources are named `<prefix><id>_QA.csv`
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub destinations: u32,

    /// Source file name prefix
    #[arg(long, default_value = "Destination_")]
    pub prefix: String,

    /// Output dataset path
    #[arg(short, long, default_value = "router_dataset.csv")]
    pub output: PathBuf,

    /// Seed for per-destination downsampling
    #[arg(long, default_value = "69")]
    pub sample_seed: u64,

    /// Seed for the final shuffle
    #[arg(long, default_value = "96")]
    pub shuffle_seed: u64,
}

/// Arguments for training
#[derive(Parser, Debug, Clone)]
pub struct TrainArgs {
    /// Path to the balanced training dataset (CSV with question/llm columns)
    #[arg(value_name = "DATASET")]
    pub dataset: PathBuf,

    /// Where to write the fitted vectorizer artifact
    #[arg(long, default_value = "vectorizer.bin")]
    pub vectorizer: PathBuf,

    /// Where to write the fitted ensemble artifact
    #[arg(long, default_value = "ensemble.bin")]
    pub ensemble: PathBuf,

    /// Abort training if base-learner fitting takes longer than this many
    /// seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Queries to classify after training, as a smoke check
    #[arg(long = "sample", value_name = "QUERY")]
    pub samples: Vec<String>,
}

/// Arguments for routing a query
#[derive(Parser, Debug, Clone)]
pub struct RouteArgs {
    /// The query to route
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Path to the vectorizer artifact
    #[arg(long, default_value = "vectorizer.bin")]
    pub vectorizer: PathBuf,

    /// Path to the ensemble artifact
    #[arg(long, default_value = "ensemble.bin")]
    pub ensemble: PathBuf,

    /// Include per-destination probabilities
    #[arg(long)]
    pub scores: bool,
}

/// Arguments for inspecting an artifact
#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    /// Path to an artifact file
    #[arg(value_name = "ARTIFACT")]
    pub artifact: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_parse_route_command() {
        let args =
            LodestarArgs::parse_from(["lodestar", "route", "how do I find peace", "--scores"]);
        match args.command {
            Command::Route(route) => {
                assert_eq!(route.query, "how do I find peace");
                assert!(route.scores);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbosity_levels() {
        let args = LodestarArgs::parse_from(["lodestar", "-q", "inspect", "model.bin"]);
        assert_eq!(args.verbosity(), 0);

        let args = LodestarArgs::parse_from(["lodestar", "-vv", "inspect", "model.bin"]);
        assert_eq!(args.verbosity(), 2);
    }
}
