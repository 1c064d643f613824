//! Incremental training for flowsense
//!
//! Balanced class weights, the online one-vs-rest classifier, the trainer that
//! drives it chunk by chunk over a shard set, and the model bundle that
//! persists it alongside the fitted metadata.

#![warn(missing_docs)]

pub mod bundle;
pub mod class_weight;
pub mod classifier;
pub mod config;
pub mod trainer;

pub use bundle::{ArtifactBundle, BundleInfo};
pub use class_weight::balanced_class_weights;
pub use classifier::ClassifierState;
pub use config::TrainerConfig;
pub use trainer::{IncrementalTrainer, TrainingStats};
