//! Core data structures and transforms for streaming network-flow classification
//!
//! This crate holds everything both sides of the model share: the feature
//! schema, chunked shard sources, the metadata pass that fits scaling
//! statistics and vocabularies, the preprocessing transform used identically
//! by training and inference, and the versioned artifact envelope.

#![warn(missing_docs)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod io;
pub mod labels;
pub mod metadata;
pub mod record;
pub mod record_batch;
pub mod schema;
pub mod source;
pub mod stats;
pub mod transform;
pub mod vocab;

// Re-export key types for convenience
pub use config::PipelineConfig;
pub use dataset::{InMemoryShard, InMemoryShardSet};
pub use error::{Error, Result};
pub use labels::LabelVocabulary;
pub use metadata::{collect_metadata, ChunkOutcome, ChunkReport, FittedMetadata, MetadataAccumulator};
pub use record::FlowRecord;
pub use record_batch::RecordBatch;
pub use schema::FeatureSchema;
pub use source::{ChunkSource, ShardSet};
pub use stats::{FeatureScale, ScalingStatistics};
pub use transform::{EncodedFeatureVector, Preprocessor, RecordTransform};
pub use vocab::{CategoricalVocabulary, OneHotEncoder};
