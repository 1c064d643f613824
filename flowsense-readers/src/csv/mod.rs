//! CSV shards and prediction output
//!
//! Shards are read sequentially in bounded chunks; prediction output copies
//! the input rows and appends one predicted-label column.

mod directory;
mod reader;
mod writer;

pub use directory::ShardDirectory;
pub use reader::{read_csv_text, CsvShardReader};
pub use writer::PredictionWriter;
