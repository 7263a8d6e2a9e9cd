//! Bulk request body construction and response parsing.

use serde_json::{json, Value};

/// One queued write awaiting a bulk flush.
#[derive(Debug, Clone)]
pub(crate) struct BulkItem {
    pub id: Option<String>,
    pub document: Value,
}

/// Result of one `_bulk` request, item by item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BulkOutcome {
    pub succeeded: u64,
    pub failed: u64,
    pub first_error: Option<String>,
}

/// Build the NDJSON lines of a bulk request: an `index` action followed by the source.
pub(crate) fn bulk_lines(items: Vec<BulkItem>) -> Vec<Value> {
    let mut lines = Vec::with_capacity(items.len() * 2);
    for item in items {
        let action = match item.id {
            Some(id) => json!({ "index": { "_id": id } }),
            None => json!({ "index": {} }),
        };
        lines.push(action);
        lines.push(item.document);
    }
    lines
}

/// Count item-level successes and failures in a `_bulk` response body.
///
/// When the response does not flag errors every submitted item counts as
/// succeeded.
pub(crate) fn parse_bulk_response(body: &Value, submitted: usize) -> BulkOutcome {
    let has_errors = body
        .get("errors")
        .and_then(|e| e.as_bool())
        .unwrap_or(false);
    if !has_errors {
        return BulkOutcome {
            succeeded: submitted as u64,
            failed: 0,
            first_error: None,
        };
    }

    let mut outcome = BulkOutcome::default();
    let items = body
        .get("items")
        .and_then(|i| i.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for item in items {
        // Each item is keyed by its action name, e.g. {"index": {...}}.
        let result = item.as_object().and_then(|o| o.values().next());
        match result.and_then(|r| r.get("error")) {
            Some(error) => {
                outcome.failed += 1;
                if outcome.first_error.is_none() {
                    outcome.first_error = Some(error.to_string());
                }
            }
            None => outcome.succeeded += 1,
        }
    }

    let reported = outcome.succeeded + outcome.failed;
    if reported < submitted as u64 {
        outcome.failed += submitted as u64 - reported;
    }
    outcome
}
