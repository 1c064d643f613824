//! Options shared by the CSV readers and writers

use serde::{Deserialize, Serialize};

/// Options for CSV shard readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvReaderOptions {
    /// Whether the CSV has a header row; without one, columns are named
    /// `column_0`, `column_1`, ...
    pub has_header: bool,

    /// Delimiter character
    pub delimiter: u8,

    /// Quote character
    pub quote: u8,

    /// Buffer size for file reads
    pub buffer_size: usize,
}

impl Default for CsvReaderOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            quote: b'"',
            buffer_size: 64 * 1024, // 64KB
        }
    }
}

/// Name of the column appended by the prediction writer
pub const PREDICTION_COLUMN: &str = "Predicted_Label";
