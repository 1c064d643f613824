//! Inference over the serving bundle

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use flowsense_core::{ChunkSource, Error, RecordBatch, RecordTransform, Result};
use flowsense_readers::{CsvReaderOptions, PredictionWriter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handle::{BundleHandle, LoadedModel};
use crate::payload::InferencePayload;
use crate::status::ModelStatus;

/// Outcome for one input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    /// Predicted label, drawn from the bundle's label vocabulary
    Predicted {
        /// Decoded label
        label: String,
    },

    /// The row could not be encoded
    Failed {
        /// Why the row failed
        reason: String,
    },
}

impl RowOutcome {
    /// The predicted label, if any
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Predicted { label } => Some(label),
            Self::Failed { .. } => None,
        }
    }
}

/// Predictions for a batch, one outcome per input row in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    /// Bundle that produced the predictions
    pub bundle_id: Uuid,

    /// Per-row outcomes
    pub rows: Vec<RowOutcome>,
}

impl BatchPrediction {
    /// Number of rows with a prediction
    pub fn predicted(&self) -> usize {
        self.rows.iter().filter(|r| r.label().is_some()).count()
    }

    /// Number of rows that failed
    pub fn failed(&self) -> usize {
        self.rows.len() - self.predicted()
    }

    /// Predicted labels in row order; `None` marks a failed row
    pub fn labels(&self) -> Vec<Option<&str>> {
        self.rows.iter().map(RowOutcome::label).collect()
    }
}

/// Totals for one bulk prediction run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkSummary {
    /// Chunks processed
    pub chunks: usize,

    /// Rows written
    pub rows: u64,

    /// Rows written without a prediction
    pub failed: u64,

    /// Wall-clock duration, in seconds
    pub elapsed_secs: f64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    rows_predicted: AtomicU64,
    rows_failed: AtomicU64,
}

/// Serves predictions from the bundle held by a [`BundleHandle`].
///
/// Every request takes one snapshot of the serving model, so a concurrent
/// swap never mixes two bundles within a batch.
#[derive(Debug)]
pub struct InferenceService {
    handle: Arc<BundleHandle>,
    options: CsvReaderOptions,
    counters: Counters,
}

impl InferenceService {
    /// Create a service over `handle`
    pub fn new(handle: Arc<BundleHandle>) -> Self {
        Self {
            handle,
            options: CsvReaderOptions::default(),
            counters: Counters::default(),
        }
    }

    /// Use `options` when parsing tabular payloads
    pub fn with_options(mut self, options: CsvReaderOptions) -> Self {
        self.options = options;
        self
    }

    /// The handle this service reads from
    pub fn handle(&self) -> &Arc<BundleHandle> {
        &self.handle
    }

    /// Predict every row of a payload
    pub fn predict(&self, payload: &InferencePayload) -> Result<BatchPrediction> {
        let batch = payload.to_batch(&self.options)?;
        self.predict_batch(&batch)
    }

    /// Predict every row of a batch.
    ///
    /// A batch missing a feature column fails as a whole; malformed rows are
    /// reported individually.
    pub fn predict_batch(&self, batch: &RecordBatch) -> Result<BatchPrediction> {
        if batch.is_empty() {
            return Err(Error::InvalidArgument("batch must contain at least one row".into()));
        }
        let model = self.handle.current();
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let rows = classify(&model, batch)?;
        let prediction = BatchPrediction {
            bundle_id: model.id(),
            rows,
        };
        self.record(prediction.predicted(), prediction.failed());
        debug!(
            id = %prediction.bundle_id,
            rows = prediction.rows.len(),
            failed = prediction.failed(),
            "Predicted batch"
        );
        Ok(prediction)
    }

    /// Stream `source` through the model chunk by chunk, writing every input
    /// row plus its predicted label. Failed rows get an empty prediction.
    pub fn predict_to_writer<W: Write>(
        &self,
        source: &mut dyn ChunkSource,
        writer: &mut PredictionWriter<W>,
        chunk_size: usize,
    ) -> Result<BulkSummary> {
        let started = Instant::now();
        let model = self.handle.current();
        let shard = source.shard_name().to_string();
        let mut summary = BulkSummary::default();

        while let Some(batch) = source.next_chunk(chunk_size)? {
            let outcomes = classify(&model, &batch)?;
            let labels: Vec<Option<String>> = outcomes
                .iter()
                .map(|outcome| match outcome {
                    RowOutcome::Predicted { label } => Some(label.clone()),
                    RowOutcome::Failed { reason } => {
                        warn!(shard = %shard, "{reason}");
                        None
                    }
                })
                .collect();
            let failed = labels.iter().filter(|l| l.is_none()).count();

            writer.write_chunk(&batch, &labels).map_err(|e| e.into_core(&shard))?;
            self.record(labels.len() - failed, failed);
            summary.chunks += 1;
            summary.rows += labels.len() as u64;
            summary.failed += failed as u64;
        }

        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            shard = %shard,
            id = %model.id(),
            rows = summary.rows,
            failed = summary.failed,
            secs = summary.elapsed_secs,
            "Bulk prediction complete"
        );
        Ok(summary)
    }

    /// Status of the serving bundle and of this service
    pub fn status(&self) -> ModelStatus {
        let mut status = ModelStatus::from_bundle(self.handle.current().bundle());
        status.requests = self.counters.requests.load(Ordering::Relaxed);
        status.rows_predicted = self.counters.rows_predicted.load(Ordering::Relaxed);
        status.rows_failed = self.counters.rows_failed.load(Ordering::Relaxed);
        status
    }

    fn record(&self, predicted: usize, failed: usize) {
        self.counters
            .rows_predicted
            .fetch_add(predicted as u64, Ordering::Relaxed);
        self.counters.rows_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }
}

fn classify(model: &LoadedModel, batch: &RecordBatch) -> Result<Vec<RowOutcome>> {
    let bundle = model.bundle();
    let vectors = model.preprocessor().apply_batch(batch, bundle.schema())?;

    vectors
        .into_iter()
        .map(|vector| {
            let vector = match vector {
                Ok(vector) => vector,
                Err(err @ Error::MalformedInput { .. }) => {
                    return Ok(RowOutcome::Failed {
                        reason: err.to_string(),
                    })
                }
                Err(err) => return Err(err),
            };
            let index = bundle.classifier().predict(vector.as_slice())?;
            let label = bundle
                .labels()
                .label(index)
                .ok_or_else(|| Error::InvalidOperation(format!("class index {index} outside the label vocabulary")))?;
            Ok(RowOutcome::Predicted {
                label: label.to_string(),
            })
        })
        .collect()
}
