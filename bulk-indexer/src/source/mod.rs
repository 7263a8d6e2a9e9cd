//! Document sources for the bulk indexer binary.
//!
//! Documents are either read from a newline-delimited JSON file, one object
//! per line, or generated synthetically for load testing.

use std::path::Path;

use bulk_indexer_shared::{Document, DocumentBatch};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::IndexingError;

/// Read a batch from a newline-delimited JSON file.
///
/// Blank lines are skipped. Every other line must hold a JSON object.
///
/// # Returns
///
/// * `Ok(DocumentBatch)` - Documents in file order
/// * `Err(IndexingError::LoadError)` - If the file cannot be read or a line is not an object
pub async fn load_ndjson(path: impl AsRef<Path>) -> Result<DocumentBatch, IndexingError> {
    let path = path.as_ref();
    let file = File::open(path)
        .await
        .map_err(|e| IndexingError::load(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut lines = BufReader::new(file).lines();
    let mut documents = Vec::new();
    let mut line_number = 0usize;
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| IndexingError::load(format!("Failed to read {}: {}", path.display(), e)))?
    {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        documents.push(parse_line(&line, line_number)?);
    }

    info!(path = %path.display(), documents = documents.len(), "Loaded documents");
    Ok(DocumentBatch::new(documents))
}

fn parse_line(line: &str, line_number: usize) -> Result<Document, IndexingError> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(IndexingError::load(format!(
            "Line {}: expected a JSON object, found {}",
            line_number,
            kind(&other)
        ))),
        Err(e) => Err(IndexingError::load(format!("Line {}: {}", line_number, e))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Generate `count` benchmark documents titled "Test Document 1" onwards.
pub fn generate_documents(count: usize) -> DocumentBatch {
    debug!(count, "Generating synthetic documents");
    (1..=count)
        .map(|n| {
            let mut document = Document::new();
            document.insert("title".to_string(), Value::from(format!("Test Document {}", n)));
            document.insert(
                "content".to_string(),
                Value::from("This is a benchmark document."),
            );
            document.insert("author".to_string(), Value::from("Test Author"));
            document
        })
        .collect()
}
