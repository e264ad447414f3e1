//! crates/manga_progress_core/src/codec.rs
//!
//! JSON encoding of the two persisted records.
//!
//! Decoding is lenient: a record that does not parse is dropped on its own
//! and reported as an [`InvalidEntry`], while the rest of the list survives. A payload that is
//! not a JSON array at all decodes as an empty record.

use serde_json::Value;
use tracing::warn;

use crate::domain::{BookmarkSet, HistoryEntry, HistoryLedger};

/// A single malformed record found while decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entry at index {index}: {reason}")]
pub struct InvalidEntry {
    pub index: usize,
    pub reason: String,
}

/// The outcome of a lenient decode.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub value: T,
    pub rejected: Vec<InvalidEntry>,
}

pub fn encode_bookmarks(bookmarks: &BookmarkSet) -> serde_json::Result<String> {
    serde_json::to_string(bookmarks)
}

pub fn encode_history(history: &HistoryLedger) -> serde_json::Result<String> {
    serde_json::to_string(history.entries())
}

pub fn decode_bookmarks(raw: &str) -> Decoded<BookmarkSet> {
    let mut rejected = Vec::new();
    let mut bookmarks = BookmarkSet::new();

    for (index, item) in array_items(raw, "bookmarks").into_iter().enumerate() {
        match item {
            Value::String(id) if !id.trim().is_empty() => {
                bookmarks.insert(id);
            }
            other => rejected.push(InvalidEntry {
                index,
                reason: format!("expected a non-empty manga id, found {other}"),
            }),
        }
    }

    report("bookmarks", &rejected);
    Decoded {
        value: bookmarks,
        rejected,
    }
}

pub fn decode_history(raw: &str, capacity: usize) -> Decoded<HistoryLedger> {
    let mut rejected = Vec::new();
    let mut entries = Vec::new();

    for (index, item) in array_items(raw, "history").into_iter().enumerate() {
        match serde_json::from_value::<HistoryEntry>(item) {
            Ok(entry) if entry.manga_id.trim().is_empty() => rejected.push(InvalidEntry {
                index,
                reason: "empty mangaId".to_string(),
            }),
            Ok(entry) if entry.chapter_id.trim().is_empty() => rejected.push(InvalidEntry {
                index,
                reason: "empty chapterId".to_string(),
            }),
            Ok(entry) => entries.push(entry),
            Err(e) => rejected.push(InvalidEntry {
                index,
                reason: e.to_string(),
            }),
        }
    }

    report("history", &rejected);
    Decoded {
        value: HistoryLedger::from_entries(entries, capacity),
        rejected,
    }
}

fn array_items(raw: &str, record: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            warn!(record, kind = %json_kind(&other), "stored record is not a list; treating as empty");
            Vec::new()
        }
        Err(e) => {
            warn!(record, error = %e, "stored record is not valid JSON; treating as empty");
            Vec::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn report(record: &str, rejected: &[InvalidEntry]) {
    for entry in rejected {
        warn!(record, index = entry.index, reason = %entry.reason, "discarding malformed entry");
    }
}
