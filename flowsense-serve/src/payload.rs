//! Inference payloads

use flowsense_core::{Error, RecordBatch, Result};
use flowsense_readers::{parse_records, read_csv_text, records_to_batch, CsvReaderOptions, JsonRecord};
use serde::{Deserialize, Serialize};

/// Rows submitted for prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferencePayload {
    /// CSV text with a header row
    Tabular(String),

    /// Structured records keyed by column name
    Records(Vec<JsonRecord>),
}

impl InferencePayload {
    /// Parse a JSON array of records, or a single record object
    pub fn from_json(json: &str) -> Result<Self> {
        parse_records(json)
            .map(Self::Records)
            .map_err(|e| e.into_core("payload"))
    }

    /// Lay the payload out as a batch with normalized column names.
    ///
    /// A payload without rows is rejected.
    pub fn to_batch(&self, options: &CsvReaderOptions) -> Result<RecordBatch> {
        let batch = match self {
            Self::Tabular(text) => read_csv_text(text, options).map_err(|e| e.into_core("payload"))?,
            Self::Records(records) => records_to_batch(records),
        };
        if batch.is_empty() {
            return Err(Error::InvalidArgument("payload must contain at least one row".into()));
        }
        Ok(batch)
    }
}
