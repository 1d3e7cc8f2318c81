//! Lodestar CLI binary.

use clap::Parser;
use lodestar::cli::{args::*, commands::*};
use std::process;

fn main() {
    // Parse command line arguments using clap
    let args = LodestarArgs::parse();

    // Execute the command
    if let Err(e) = execute_command(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
