//! JSON records: structured rows keyed by column name

use std::collections::HashMap;

use flowsense_core::schema::normalize_column_name;
use flowsense_core::RecordBatch;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One structured record
pub type JsonRecord = Map<String, Value>;

/// Parse a JSON array of objects
pub fn parse_records(json: &str) -> Result<Vec<JsonRecord>> {
    match serde_json::from_str::<Value>(json)? {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(Error::Format(format!(
                    "record {i} is not an object: {}",
                    type_name(&other)
                ))),
            })
            .collect(),
        Value::Object(map) => Ok(vec![map]),
        other => Err(Error::Format(format!(
            "expected an array of objects, got {}",
            type_name(&other)
        ))),
    }
}

/// Lay records out as a batch.
///
/// Columns are the union of keys in first-seen order, keyed by normalized
/// name, so `" x "` and `"x"` share one column. When one record holds two
/// keys that normalize alike, the first non-empty value wins. A key a record
/// lacks reads as an empty cell. Strings are taken as-is, numbers and
/// booleans in their JSON spelling, null as empty; nested values keep their
/// JSON text.
pub fn records_to_batch(records: &[JsonRecord]) -> RecordBatch {
    let mut header: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for record in records {
        for key in record.keys() {
            let name = normalize_column_name(key);
            if !positions.contains_key(&name) {
                positions.insert(name.clone(), header.len());
                header.push(name);
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            let mut row = vec![String::new(); header.len()];
            for (key, value) in record {
                if let Some(&i) = positions.get(&normalize_column_name(key)) {
                    if row[i].is_empty() {
                        row[i] = cell_text(value);
                    }
                }
            }
            row
        })
        .collect();

    RecordBatch::new(&header, rows)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
