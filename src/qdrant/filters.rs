//! Translation of pipeline filters into Qdrant filter clauses.

use serde_json::{Value, json};

use crate::store::MetadataFilter;

/// Compose a Qdrant `must` filter from exact-match conditions.
///
/// Conditions with blank values are dropped. Returns `None` when nothing remains.
pub fn build_match_filter(filter: &MetadataFilter) -> Option<Value> {
    let must: Vec<Value> = filter
        .conditions()
        .filter_map(|(key, value)| non_empty(value).map(|value| (key, value)))
        .map(|(key, value)| match_clause(key, value))
        .collect();

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

fn match_clause(key: &str, value: &str) -> Value {
    // chunkIndex is stored as an integer payload; match it as one.
    if key == "chunkIndex"
        && let Ok(number) = value.parse::<u64>()
    {
        return json!({ "key": key, "match": { "value": number } });
    }
    json!({ "key": key, "match": { "value": value } })
}

fn non_empty(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
