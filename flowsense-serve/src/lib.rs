//! Inference for flowsense
//!
//! Serves predictions from a model bundle held behind an atomically
//! swappable handle. Payloads arrive as CSV text or JSON records, pass
//! through the same preprocessing transform used in training, and come back
//! as one outcome per row.

#![warn(missing_docs)]

pub mod handle;
pub mod payload;
pub mod service;
pub mod status;

pub use handle::{BundleHandle, LoadedModel};
pub use payload::InferencePayload;
pub use service::{BatchPrediction, BulkSummary, InferenceService, RowOutcome};
pub use status::ModelStatus;
