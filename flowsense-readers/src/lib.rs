//! Shard readers and payload parsers for flowsense
//!
//! This crate turns external data into the core crate's record batches: CSV
//! shard directories for the metadata pass and training, CSV text and JSON
//! records for inference, and a CSV writer for prediction output.

#![warn(missing_docs)]

mod error;

pub mod common;

#[cfg(feature = "csv")]
pub mod csv;

#[cfg(feature = "json")]
pub mod json;

pub use common::{CsvReaderOptions, PREDICTION_COLUMN};
pub use error::{Error, Result};

#[cfg(feature = "csv")]
pub use crate::csv::{read_csv_text, CsvShardReader, PredictionWriter, ShardDirectory};

#[cfg(feature = "json")]
pub use crate::json::{parse_records, records_to_batch, JsonRecord};

// Re-export core types
pub use flowsense_core::{ChunkSource, RecordBatch, ShardSet};
