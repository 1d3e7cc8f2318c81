//! CSV loading for the training dataset.

use std::path::Path;

use csv::ReaderBuilder;

use crate::dataset::types::Example;
use crate::error::{LodestarError, Result};

/// Name of the question column.
pub const QUESTION_COLUMN: &str = "question";
/// Name of the destination-id column.
pub const DESTINATION_COLUMN: &str = "llm";

/// Load labeled examples from a delimited file.
///
/// The file must carry at least the `question` and `llm` columns; a missing
/// column is a configuration error. Malformed rows (a destination id that
/// is not a positive integer) and an empty dataset are data-integrity
/// errors: a partially usable dataset is unsafe to train on, so loading
/// aborts instead of skipping rows.
pub fn load_examples(path: &Path) -> Result<Vec<Example>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| {
            LodestarError::configuration(format!("cannot open dataset {}: {e}", path.display()))
        })?;

    let headers = reader.headers()?.clone();
    let question_index = column_index(&headers, QUESTION_COLUMN, path)?;
    let destination_index = column_index(&headers, DESTINATION_COLUMN, path)?;

    let mut examples = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let question = record.get(question_index).unwrap_or("").to_string();
        let raw_destination = record.get(destination_index).unwrap_or("");
        let destination: u32 = raw_destination.parse().map_err(|_| {
            LodestarError::data_integrity(format!(
                "row {}: destination id {raw_destination:?} is not a positive integer",
                row + 2
            ))
        })?;
        if destination == 0 {
            return Err(LodestarError::data_integrity(format!(
                "row {}: destination ids are 1-indexed, got 0",
                row + 2
            )));
        }
        examples.push(Example::new(question, destination));
    }

    if examples.is_empty() {
        return Err(LodestarError::data_integrity(format!(
            "dataset {} contains no rows",
            path.display()
        )));
    }

    Ok(examples)
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        LodestarError::configuration(format!(
            "dataset {} is missing the required {name:?} column",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_dataset() {
        let file = write_csv("question,llm\nhow do I sleep better,2\nwhat is my duty,1\n");
        let examples = load_examples(file.path()).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].question, "how do I sleep better");
        assert_eq!(examples[0].destination, 2);
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let file = write_csv("answer,question,llm\nrest well,how do I sleep,3\n");
        let examples = load_examples(file.path()).unwrap();
        assert_eq!(examples[0].destination, 3);
    }

    #[test]
    fn test_missing_column_is_configuration_error() {
        let file = write_csv("question,label\nhello,1\n");
        let err = load_examples(file.path()).unwrap_err();
        assert!(matches!(err, LodestarError::Configuration(_)), "{err}");
    }

    #[test]
    fn test_empty_dataset_is_data_integrity_error() {
        let file = write_csv("question,llm\n");
        let err = load_examples(file.path()).unwrap_err();
        assert!(matches!(err, LodestarError::DataIntegrity(_)), "{err}");
    }

    #[test]
    fn test_bad_destination_is_data_integrity_error() {
        let file = write_csv("question,llm\nhello,first\n");
        let err = load_examples(file.path()).unwrap_err();
        assert!(matches!(err, LodestarError::DataIntegrity(_)), "{err}");

        let file = write_csv("question,llm\nhello,0\n");
        let err = load_examples(file.path()).unwrap_err();
        assert!(matches!(err, LodestarError::DataIntegrity(_)), "{err}");
    }
}
