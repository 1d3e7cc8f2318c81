//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{LodestarArgs, OutputFormat};
use crate::error::Result;

/// Result structure for a routed query.
#[derive(Debug, Serialize, Deserialize)]
pub struct RouteResult {
    pub query: String,
    pub destination: u32,
    pub scores: Option<Vec<(u32, f64)>>,
}

/// Result structure for artifact inspection.
#[derive(Debug, Serialize, Deserialize)]
pub struct InspectResult {
    pub path: String,
    pub format_version: u32,
    pub dimension: u32,
    pub n_classes: u32,
    pub created_at: i64,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &LodestarArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &LodestarArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
    }

    let value = serde_json::to_value(result)?;
    if let serde_json::Value::Object(fields) = value {
        for (key, field) in fields {
            match field {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => println!("  {key}: {s}"),
                other => println!("  {key}: {other}"),
            }
        }
    }
    Ok(())
}

/// Output as JSON.
fn output_json<T: Serialize>(result: &T, args: &LodestarArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}
