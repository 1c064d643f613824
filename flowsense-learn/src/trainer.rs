//! Incremental trainer: drives the classifier over every shard, one update
//! per chunk, with the class list and class weights fixed up front.

use std::collections::BTreeSet;
use std::time::Instant;

use flowsense_core::schema::normalize_label;
use flowsense_core::source::for_each_chunk;
use flowsense_core::{
    Error, FittedMetadata, PipelineConfig, Preprocessor, RecordBatch, RecordTransform, Result, ShardSet,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::class_weight::balanced_class_weights;
use crate::classifier::ClassifierState;
use crate::config::TrainerConfig;

/// Totals for one training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Chunks that produced an update
    pub chunks_trained: u64,

    /// Chunks skipped for lacking a required column
    pub chunks_skipped: u64,

    /// Rows that contributed to an update
    pub rows_trained: u64,

    /// Rows excluded as malformed
    pub rows_malformed: u64,

    /// Trainable rows per class, in class-index order
    pub class_counts: Vec<u64>,

    /// Class weights used for the run
    pub class_weights: Vec<f64>,

    /// Wall-clock duration of the run, in seconds
    pub training_time_secs: f64,
}

/// Trains a classifier over a shard set using fitted metadata.
///
/// A run first counts labels over every shard; any label outside the
/// vocabulary aborts the run before the classifier is touched. Updates are
/// applied to a working copy that is only returned when the run succeeds.
pub struct IncrementalTrainer<'a> {
    metadata: &'a FittedMetadata,
    preprocessor: Preprocessor,
    pipeline: PipelineConfig,
    config: TrainerConfig,
}

impl<'a> IncrementalTrainer<'a> {
    /// Create a trainer
    pub fn new(metadata: &'a FittedMetadata, pipeline: PipelineConfig, config: TrainerConfig) -> Result<Self> {
        pipeline.validate()?;
        config.validate()?;
        metadata.validate()?;
        if metadata.labels.is_empty() {
            return Err(Error::InvalidOperation(
                "Label vocabulary is empty; the metadata pass saw no labelled rows".into(),
            ));
        }
        let preprocessor = metadata.preprocessor(pipeline.clip_bound)?;
        Ok(Self {
            metadata,
            preprocessor,
            pipeline,
            config,
        })
    }

    /// Train a fresh classifier
    pub fn train(&self, shards: &dyn ShardSet) -> Result<(ClassifierState, TrainingStats)> {
        let state = ClassifierState::new(
            self.metadata.labels.labels().to_vec(),
            self.metadata.feature_width(),
            self.config.clone(),
        )?;
        self.run(state, shards)
    }

    /// Continue training an existing classifier over more shards.
    ///
    /// The classifier must have been trained with this metadata. `state` is
    /// left untouched; the updated copy is returned.
    pub fn resume(&self, state: &ClassifierState, shards: &dyn ShardSet) -> Result<(ClassifierState, TrainingStats)> {
        state.validate()?;
        if state.classes() != self.metadata.labels.labels() {
            return Err(Error::SchemaMismatch(
                "Classifier classes differ from the label vocabulary".into(),
            ));
        }
        if state.n_features() != self.metadata.feature_width() {
            return Err(Error::SchemaMismatch(format!(
                "Classifier expects width {}, metadata encodes width {}",
                state.n_features(),
                self.metadata.feature_width()
            )));
        }
        self.run(state.clone(), shards)
    }

    /// Add every label of `batch` outside the vocabulary to `unseen`.
    ///
    /// Runs on any chunk that carries the label column, whether or not the
    /// chunk is trainable. Blank labels are left to the malformed-row check.
    fn collect_unseen(&self, batch: &RecordBatch, label: usize, unseen: &mut BTreeSet<String>) {
        for row in 0..batch.row_count() {
            let normalized = normalize_label(batch.cell(row, label));
            if !normalized.is_empty() && !self.metadata.labels.contains(&normalized) {
                unseen.insert(normalized);
            }
        }
    }

    /// Count trainable rows per class over every shard.
    ///
    /// Fails with every label outside the vocabulary, including labels in
    /// chunks that will be skipped for a missing feature column.
    pub fn label_distribution(&self, shards: &dyn ShardSet) -> Result<Vec<u64>> {
        let schema = &self.metadata.schema;
        let labels = &self.metadata.labels;
        let mut counts = vec![0u64; labels.len()];
        let mut unseen = BTreeSet::new();

        for index in 0..shards.shard_count() {
            let mut source = shards.open(index)?;
            for_each_chunk(source.as_mut(), self.pipeline.chunk_size, |batch| {
                let layout = batch.layout(schema);
                let Some(label) = layout.label else {
                    return Ok(());
                };
                self.collect_unseen(&batch, label, &mut unseen);
                if !layout.missing_features(schema).is_empty() {
                    return Ok(());
                }
                for row in 0..batch.row_count() {
                    if batch.check_labelled_row(row, &layout).is_some() {
                        continue;
                    }
                    if let Some(class) = labels.index_of(batch.cell(row, label)) {
                        counts[class] += 1;
                    }
                }
                Ok(())
            })?;
        }

        if unseen.is_empty() {
            Ok(counts)
        } else {
            Err(Error::UnseenLabel {
                labels: unseen.into_iter().collect(),
            })
        }
    }

    fn run(&self, mut state: ClassifierState, shards: &dyn ShardSet) -> Result<(ClassifierState, TrainingStats)> {
        let started = Instant::now();

        let counts = self.label_distribution(shards)?;
        let weights = balanced_class_weights(&counts);
        state.set_class_weights(weights.clone())?;
        info!(
            classes = counts.len(),
            rows = counts.iter().sum::<u64>(),
            "Label distribution fixed: {:?}",
            self.metadata.labels.labels().iter().zip(&counts).collect::<Vec<_>>()
        );

        let mut stats = TrainingStats {
            class_counts: counts,
            class_weights: weights,
            ..Default::default()
        };

        for index in 0..shards.shard_count() {
            let mut source = shards.open(index)?;
            let shard = source.shard_name().to_string();
            for_each_chunk(source.as_mut(), self.pipeline.chunk_size, |batch| {
                self.train_chunk(&mut state, &batch, &shard, &mut stats)
            })?;
        }

        stats.training_time_secs = started.elapsed().as_secs_f64();
        info!(
            chunks = stats.chunks_trained,
            skipped = stats.chunks_skipped,
            rows = stats.rows_trained,
            malformed = stats.rows_malformed,
            secs = stats.training_time_secs,
            "Training run complete"
        );
        Ok((state, stats))
    }

    fn train_chunk(
        &self,
        state: &mut ClassifierState,
        batch: &RecordBatch,
        shard: &str,
        stats: &mut TrainingStats,
    ) -> Result<()> {
        let schema = &self.metadata.schema;
        let layout = batch.layout(schema);
        let Some(label) = layout.label else {
            warn!(shard, first_row = batch.first_row(), "Skipping chunk: no '{}' column", schema.label_column());
            stats.chunks_skipped += 1;
            return Ok(());
        };

        let mut unseen = BTreeSet::new();
        self.collect_unseen(batch, label, &mut unseen);
        if !unseen.is_empty() {
            return Err(Error::UnseenLabel {
                labels: unseen.into_iter().collect(),
            });
        }

        let missing = layout.missing_features(schema);
        if !missing.is_empty() {
            warn!(shard, first_row = batch.first_row(), "Skipping chunk: {}", Error::missing_columns(missing));
            stats.chunks_skipped += 1;
            return Ok(());
        }

        let records = batch.to_records(schema)?;
        let mut x = Vec::with_capacity(records.len());
        let mut y = Vec::with_capacity(records.len());

        for (row, record) in records.into_iter().enumerate() {
            if let Some(reason) = batch.check_labelled_row(row, &layout) {
                warn!(shard, row = batch.first_row() + row, "Excluding malformed row: {reason}");
                stats.rows_malformed += 1;
                continue;
            }
            let record = record?;
            let raw = record.label().unwrap_or_default();
            let class = self.metadata.labels.index_of(raw).ok_or_else(|| Error::UnseenLabel {
                labels: vec![normalize_label(raw)],
            })?;
            x.push(self.preprocessor.apply(&record)?);
            y.push(class);
        }

        if x.is_empty() {
            return Ok(());
        }

        state.partial_fit(&x, &y)?;
        stats.chunks_trained += 1;
        stats.rows_trained += x.len() as u64;
        debug!(shard, first_row = batch.first_row(), rows = x.len(), "Applied update");
        Ok(())
    }
}
