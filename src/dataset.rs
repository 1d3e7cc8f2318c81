//! Training dataset loading and assembly.
//!
//! The trainer consumes a single delimited file with `question` and `llm`
//! columns. That file is produced by the assembly step, which merges
//! per-destination labeled CSVs, balances every destination down to the
//! smallest per-destination count, and shuffles the result under fixed
//! seeds so two runs over identical inputs are byte-identical.

pub mod assembly;
pub mod loader;
pub mod types;

pub use assembly::{AssemblyConfig, AssemblySummary, DatasetSource, assemble_dataset};
pub use loader::load_examples;
pub use types::Example;
