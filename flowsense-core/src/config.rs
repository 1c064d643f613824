//! Pipeline configuration

use serde::{Deserialize, Serialize};

/// Default number of rows per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Default magnitude bound applied to numeric features
pub const DEFAULT_CLIP_BOUND: f64 = 1e9;

/// Configuration shared by the metadata pass, training and inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of rows read per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Bound applied to numeric features before and after scaling
    #[serde(default = "default_clip_bound")]
    pub clip_bound: f64,

    /// Accumulate shards in parallel and merge the partial results
    #[serde(default)]
    pub parallel: bool,

    /// Worker threads for parallel accumulation; all cores when unset
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            clip_bound: default_clip_bound(),
            parallel: false,
            worker_threads: None,
        }
    }
}

impl PipelineConfig {
    /// Check that the configuration is usable
    pub fn validate(&self) -> crate::Result<()> {
        if self.chunk_size == 0 {
            return Err(crate::Error::InvalidArgument(
                "chunk_size must be greater than 0".into(),
            ));
        }
        if !(self.clip_bound.is_finite() && self.clip_bound > 0.0) {
            return Err(crate::Error::InvalidArgument(format!(
                "clip_bound must be a positive finite number, got {}",
                self.clip_bound
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(crate::Error::InvalidArgument(
                "worker_threads must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_clip_bound() -> f64 {
    DEFAULT_CLIP_BOUND
}
