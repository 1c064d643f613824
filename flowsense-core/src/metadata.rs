//! The metadata pass: streaming accumulation of scaling statistics,
//! categorical vocabularies and the label vocabulary over every shard.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::io::{read_artifact, write_artifact, ArtifactKind};
use crate::labels::{LabelCounter, LabelVocabulary};
use crate::record::{parse_categorical, parse_numeric};
use crate::record_batch::RecordBatch;
use crate::schema::FeatureSchema;
use crate::source::{for_each_chunk, ShardSet};
use crate::stats::{RunningMoments, ScalingStatistics};
use crate::transform::{check_consistency, Preprocessor};
use crate::vocab::{OneHotEncoder, VocabularyBuilder};

/// What happened to one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The chunk's well-formed rows were added to the running totals
    Accumulated {
        /// Rows that contributed
        rows: usize,
    },

    /// The chunk was left out entirely
    Skipped {
        /// Why the chunk was skipped
        reason: String,
    },
}

/// Result of feeding one chunk to the accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    /// Position of the chunk's first row within its shard
    pub first_row: usize,

    /// Outcome for the chunk as a whole
    pub outcome: ChunkOutcome,

    /// Rows excluded as malformed, by position within the shard
    pub malformed_rows: Vec<usize>,

    /// Non-fatal findings, such as absent feature columns
    pub warnings: Vec<String>,
}

impl ChunkReport {
    /// Whether the chunk contributed to the running totals
    pub fn is_accumulated(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Accumulated { .. })
    }
}

/// Running state of the metadata pass.
///
/// Partial accumulators built over disjoint shards can be merged in any
/// order. Finishing consumes the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataAccumulator {
    schema: FeatureSchema,
    moments: Vec<RunningMoments>,
    vocabulary: VocabularyBuilder,
    labels: LabelCounter,
    chunks_accumulated: u64,
    chunks_skipped: u64,
    rows_accumulated: u64,
    rows_malformed: u64,
}

impl MetadataAccumulator {
    /// Create an empty accumulator for `schema`
    pub fn new(schema: &FeatureSchema) -> Self {
        Self {
            schema: schema.clone(),
            moments: vec![RunningMoments::default(); schema.numeric().len()],
            vocabulary: VocabularyBuilder::new(schema.categorical().iter().cloned()),
            labels: LabelCounter::new(),
            chunks_accumulated: 0,
            chunks_skipped: 0,
            rows_accumulated: 0,
            rows_malformed: 0,
        }
    }

    /// Feed one chunk.
    ///
    /// A chunk without the label column is skipped. Absent feature columns
    /// and malformed rows are reported but do not stop accumulation; a row
    /// with a blank label counts as malformed.
    pub fn ingest_chunk(&mut self, batch: &RecordBatch) -> ChunkReport {
        let layout = batch.layout(&self.schema);
        let Some(label_index) = layout.label else {
            self.chunks_skipped += 1;
            return ChunkReport {
                first_row: batch.first_row(),
                outcome: ChunkOutcome::Skipped {
                    reason: format!("no '{}' column", self.schema.label_column()),
                },
                malformed_rows: Vec::new(),
                warnings: Vec::new(),
            };
        };

        let mut warnings: Vec<String> = layout
            .missing_features(&self.schema)
            .into_iter()
            .map(|name| format!("missing column '{name}'"))
            .collect();

        let mut good = Vec::with_capacity(batch.row_count());
        let mut malformed_rows = Vec::new();
        for row in 0..batch.row_count() {
            match batch.check_labelled_row(row, &layout) {
                None => good.push(row),
                Some(reason) => {
                    let position = batch.first_row() + row;
                    warnings.push(format!("row {position}: {reason}"));
                    malformed_rows.push(position);
                }
            }
        }

        for (moments, index) in self.moments.iter_mut().zip(&layout.numeric) {
            if let Some(column) = *index {
                moments.add_chunk(
                    good.iter()
                        .map(|&row| parse_numeric(batch.cell(row, column)).unwrap_or(0.0)),
                );
            }
        }

        for (feature, index) in layout.categorical.iter().enumerate() {
            if let Some(column) = *index {
                for &row in &good {
                    if let Some(value) = parse_categorical(batch.cell(row, column)) {
                        self.vocabulary.observe(feature, &value);
                    }
                }
            }
        }

        for &row in &good {
            self.labels.observe(batch.cell(row, label_index));
        }

        self.chunks_accumulated += 1;
        self.rows_accumulated += good.len() as u64;
        self.rows_malformed += malformed_rows.len() as u64;

        ChunkReport {
            first_row: batch.first_row(),
            outcome: ChunkOutcome::Accumulated { rows: good.len() },
            malformed_rows,
            warnings,
        }
    }

    /// Merge a partial accumulator built over other shards
    pub fn merge(&mut self, other: &MetadataAccumulator) -> Result<()> {
        if self.schema != other.schema {
            return Err(Error::SchemaMismatch(
                "Cannot merge accumulators built for different schemas".into(),
            ));
        }
        for (mine, theirs) in self.moments.iter_mut().zip(&other.moments) {
            mine.merge(theirs);
        }
        self.vocabulary.merge(&other.vocabulary)?;
        self.labels.merge(&other.labels);
        self.chunks_accumulated += other.chunks_accumulated;
        self.chunks_skipped += other.chunks_skipped;
        self.rows_accumulated += other.rows_accumulated;
        self.rows_malformed += other.rows_malformed;
        Ok(())
    }

    /// Rows that contributed so far
    pub fn rows_accumulated(&self) -> u64 {
        self.rows_accumulated
    }

    /// Chunks skipped so far
    pub fn chunks_skipped(&self) -> u64 {
        self.chunks_skipped
    }

    /// Finalize statistics and vocabularies
    pub fn finish(self) -> FittedMetadata {
        let stats = ScalingStatistics::from_moments(self.schema.numeric().iter().zip(&self.moments));
        let encoder = self.vocabulary.finish().fit_encoder();
        FittedMetadata {
            schema: self.schema,
            stats,
            encoder,
            labels: self.labels.finish(),
        }
    }
}

/// Everything the metadata pass produces, persisted between the pass and
/// training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedMetadata {
    /// Schema the metadata was fitted against
    pub schema: FeatureSchema,

    /// Per-feature mean and deviation
    pub stats: ScalingStatistics,

    /// Fitted one-hot encoder
    pub encoder: OneHotEncoder,

    /// Finalized label vocabulary
    pub labels: LabelVocabulary,
}

impl FittedMetadata {
    /// Check that the parts agree with one another
    pub fn validate(&self) -> Result<()> {
        check_consistency(&self.schema, &self.stats, &self.encoder)
    }

    /// Width of every encoded feature vector
    pub fn feature_width(&self) -> usize {
        self.stats.len() + self.encoder.width()
    }

    /// Build the preprocessing transform for these statistics
    pub fn preprocessor(&self, clip_bound: f64) -> Result<Preprocessor> {
        Preprocessor::new(&self.schema, &self.stats, &self.encoder, clip_bound)
    }

    /// Persist atomically to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_artifact(path, ArtifactKind::Metadata, self)
    }

    /// Load from `path`, rejecting inconsistent metadata
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let metadata: Self = read_artifact(path, ArtifactKind::Metadata)?;
        metadata
            .validate()
            .map_err(|e| Error::ArtifactLoad(format!("inconsistent metadata: {e}")))?;
        Ok(metadata)
    }
}

/// Totals for one metadata pass
#[derive(Debug, Clone, Default)]
pub struct CollectionSummary {
    /// Shards read to the end
    pub shards_read: usize,

    /// Shards abandoned after a read failure
    pub shards_failed: usize,

    /// Chunks that contributed
    pub chunks_accumulated: u64,

    /// Chunks skipped for lacking the label column
    pub chunks_skipped: u64,

    /// Rows that contributed
    pub rows_accumulated: u64,

    /// Rows excluded as malformed
    pub rows_malformed: u64,

    /// Wall-clock duration of the pass
    pub elapsed: Duration,
}

/// Accumulate one shard from its first row
pub fn accumulate_shard(
    shards: &dyn ShardSet,
    index: usize,
    schema: &FeatureSchema,
    chunk_size: usize,
) -> Result<MetadataAccumulator> {
    let mut accumulator = MetadataAccumulator::new(schema);
    let mut source = shards.open(index)?;
    let name = source.shard_name().to_string();

    let chunks = for_each_chunk(source.as_mut(), chunk_size, |chunk| {
        let report = accumulator.ingest_chunk(&chunk);
        match &report.outcome {
            ChunkOutcome::Skipped { reason } => {
                warn!(shard = %name, first_row = report.first_row, "Skipping chunk: {reason}");
            }
            ChunkOutcome::Accumulated { rows } => {
                debug!(shard = %name, first_row = report.first_row, rows, "Accumulated chunk");
            }
        }
        for warning in &report.warnings {
            warn!(shard = %name, "{warning}");
        }
        Ok(())
    })?;

    debug!(shard = %name, chunks, "Finished shard");
    Ok(accumulator)
}

/// Run the metadata pass over every shard of `shards`.
///
/// Shards that fail to read are logged and left out; the pass continues.
pub fn collect_metadata(
    shards: &dyn ShardSet,
    schema: &FeatureSchema,
    config: &PipelineConfig,
) -> Result<(FittedMetadata, CollectionSummary)> {
    config.validate()?;
    schema.validate()?;
    let started = Instant::now();

    let partials = if config.parallel {
        accumulate_parallel(shards, schema, config)?
    } else {
        (0..shards.shard_count())
            .map(|index| accumulate_shard(shards, index, schema, config.chunk_size))
            .collect()
    };

    let mut total = MetadataAccumulator::new(schema);
    let mut summary = CollectionSummary::default();
    for (index, partial) in partials.into_iter().enumerate() {
        match partial {
            Ok(partial) => {
                total.merge(&partial)?;
                summary.shards_read += 1;
            }
            Err(err) if err.is_fatal() && !is_read_failure(&err) => return Err(err),
            Err(err) => {
                warn!(shard = %shards.shard_name(index), "Abandoning shard: {err}");
                summary.shards_failed += 1;
            }
        }
    }

    summary.chunks_accumulated = total.chunks_accumulated;
    summary.chunks_skipped = total.chunks_skipped;
    summary.rows_accumulated = total.rows_accumulated;
    summary.rows_malformed = total.rows_malformed;
    summary.elapsed = started.elapsed();

    if total.rows_accumulated == 0 {
        warn!("No labelled rows were accumulated");
    }

    let metadata = total.finish();
    info!(
        shards = summary.shards_read,
        failed = summary.shards_failed,
        rows = summary.rows_accumulated,
        malformed = summary.rows_malformed,
        classes = metadata.labels.len(),
        width = metadata.feature_width(),
        "Metadata collection complete"
    );
    Ok((metadata, summary))
}

fn is_read_failure(err: &Error) -> bool {
    matches!(err, Error::Io(_) | Error::Source { .. })
}

#[cfg(feature = "parallel")]
fn accumulate_parallel(
    shards: &dyn ShardSet,
    schema: &FeatureSchema,
    config: &PipelineConfig,
) -> Result<Vec<Result<MetadataAccumulator>>> {
    use rayon::prelude::*;

    let threads = config.worker_threads.unwrap_or_else(num_cpus::get);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::InvalidOperation(format!("Failed to create thread pool: {e}")))?;

    debug!(threads, shards = shards.shard_count(), "Accumulating shards in parallel");
    Ok(pool.install(|| {
        (0..shards.shard_count())
            .into_par_iter()
            .map(|index| accumulate_shard(shards, index, schema, config.chunk_size))
            .collect()
    }))
}

#[cfg(not(feature = "parallel"))]
fn accumulate_parallel(
    shards: &dyn ShardSet,
    schema: &FeatureSchema,
    config: &PipelineConfig,
) -> Result<Vec<Result<MetadataAccumulator>>> {
    warn!("Built without the `parallel` feature; accumulating sequentially");
    Ok((0..shards.shard_count())
        .map(|index| accumulate_shard(shards, index, schema, config.chunk_size))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{InMemoryShard, InMemoryShardSet};
    use proptest::prelude::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["x"], ["flag"], "Label").unwrap()
    }

    fn batch(header: &[&str], rows: &[&[&str]]) -> RecordBatch {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|s| (*s).to_string()).collect())
            .collect();
        RecordBatch::new(header, rows)
    }

    #[test]
    fn chunk_without_label_is_skipped() {
        let mut acc = MetadataAccumulator::new(&schema());
        let report = acc.ingest_chunk(&batch(&["x", "flag"], &[&["1", "0"]]));
        assert!(matches!(report.outcome, ChunkOutcome::Skipped { .. }));
        assert_eq!(acc.rows_accumulated(), 0);
        assert_eq!(acc.chunks_skipped(), 1);
    }

    #[test]
    fn missing_feature_is_a_warning() {
        let mut acc = MetadataAccumulator::new(&schema());
        let report = acc.ingest_chunk(&batch(&["x", "Label"], &[&["1", "a"], &["3", "b"]]));
        assert!(report.is_accumulated());
        assert_eq!(report.warnings, ["missing column 'flag'"]);

        let metadata = acc.finish();
        assert_eq!(metadata.stats.get("x").unwrap().mean, 2.0);
        assert_eq!(metadata.encoder.categories(0).unwrap().len(), 0);
        assert_eq!(metadata.labels.labels(), ["a", "b"]);
    }

    #[test]
    fn malformed_rows_are_excluded_from_totals() {
        let mut acc = MetadataAccumulator::new(&schema());
        let report = acc.ingest_chunk(
            &batch(&["x", "flag", "Label"], &[&["2", "0", "a"], &["n/a", "1", "b"], &["4", "", "a"]])
                .with_first_row(100),
        );
        assert_eq!(report.outcome, ChunkOutcome::Accumulated { rows: 2 });
        assert_eq!(report.malformed_rows, [101]);

        let metadata = acc.finish();
        let x = metadata.stats.get("x").unwrap();
        assert_eq!((x.mean, x.count), (3.0, 2));
        assert_eq!(metadata.encoder.categories(0).unwrap(), ["0"]);
        assert_eq!(metadata.labels.labels(), ["a"]);
    }

    #[test]
    fn blank_labels_are_malformed_rows() {
        let mut acc = MetadataAccumulator::new(&schema());
        let report = acc.ingest_chunk(&batch(
            &["x", "flag", "Label"],
            &[&["2", "0", "a"], &["90", "5", ""], &["4", "1"]],
        ));
        assert_eq!(report.outcome, ChunkOutcome::Accumulated { rows: 1 });
        assert_eq!(report.malformed_rows, [1, 2]);

        let metadata = acc.finish();
        assert_eq!(metadata.labels.labels(), ["a"]);
        assert_eq!(metadata.stats.get("x").unwrap().mean, 2.0);
        assert_eq!(metadata.encoder.categories(0).unwrap(), ["0"]);
    }

    #[test]
    fn non_finite_numerics_count_as_zero() {
        let mut acc = MetadataAccumulator::new(&schema());
        acc.ingest_chunk(&batch(&["x", "flag", "Label"], &[&["inf", "0", "a"], &["6", "0", "a"]]));
        let x = *acc.finish().stats.get("x").unwrap();
        assert_eq!((x.mean, x.std), (3.0, 3.0));
    }

    #[test]
    fn collection_over_shards() {
        let set = InMemoryShardSet::new(vec![
            InMemoryShard::from_rows("a", &["\u{feff}x", " flag", "Label "], &[&["10", "0", "BENIGN"], &["20", "1", "DDoS"]]),
            InMemoryShard::from_rows("b", &["x", "flag"], &[&["1000", "7"]]),
            InMemoryShard::from_rows("c", &["x", "flag", "Label"], &[&["30", "2", " benign"]]),
        ]);
        let config = PipelineConfig {
            chunk_size: 1,
            ..Default::default()
        };
        let (metadata, summary) = collect_metadata(&set, &schema(), &config).unwrap();

        assert_eq!(summary.shards_read, 3);
        assert_eq!(summary.chunks_skipped, 1);
        assert_eq!(summary.rows_accumulated, 3);
        assert_eq!(metadata.stats.get("x").unwrap().mean, 20.0);
        assert_eq!(metadata.encoder.categories(0).unwrap(), ["0", "1", "2"]);
        assert_eq!(metadata.labels.labels(), ["benign", "ddos"]);
        assert_eq!(metadata.labels.counts(), [2, 1]);
        metadata.validate().unwrap();
    }

    #[test]
    fn metadata_file_round_trip() {
        let mut acc = MetadataAccumulator::new(&schema());
        acc.ingest_chunk(&batch(&["x", "flag", "Label"], &[&["1", "0", "a"], &["5", "1", "b"]]));
        let metadata = acc.finish();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.fsm");
        metadata.save(&path).unwrap();
        assert_eq!(FittedMetadata::load(&path).unwrap(), metadata);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let set = InMemoryShardSet::new(vec![
            InMemoryShard::from_rows("a", &["x", "flag", "Label"], &[&["1", "0", "a"], &["2", "1", "b"]]),
            InMemoryShard::from_rows("b", &["x", "flag", "Label"], &[&["3", "2", "a"]]),
        ]);
        let sequential = collect_metadata(&set, &schema(), &PipelineConfig::default()).unwrap().0;
        let config = PipelineConfig {
            parallel: true,
            worker_threads: Some(2),
            ..Default::default()
        };
        let parallel = collect_metadata(&set, &schema(), &config).unwrap().0;
        assert_eq!(sequential, parallel);
    }

    fn accumulate(rows: &[(i32, u8, u8)]) -> MetadataAccumulator {
        let mut acc = MetadataAccumulator::new(&schema());
        let rows: Vec<Vec<String>> = rows
            .iter()
            .map(|(x, f, l)| vec![x.to_string(), f.to_string(), format!("c{l}")])
            .collect();
        acc.ingest_chunk(&RecordBatch::new(&["x", "flag", "Label"], rows));
        acc
    }

    proptest! {
        #[test]
        fn merge_is_commutative_and_associative(
            a in prop::collection::vec((-1000i32..1000, 0u8..4, 0u8..3), 0..20),
            b in prop::collection::vec((-1000i32..1000, 0u8..4, 0u8..3), 0..20),
            c in prop::collection::vec((-1000i32..1000, 0u8..4, 0u8..3), 0..20),
        ) {
            let (pa, pb, pc) = (accumulate(&a), accumulate(&b), accumulate(&c));

            let mut ab = pa.clone();
            ab.merge(&pb).unwrap();
            let mut ba = pb.clone();
            ba.merge(&pa).unwrap();
            prop_assert_eq!(ab.clone().finish(), ba.finish());

            let mut ab_c = ab;
            ab_c.merge(&pc).unwrap();
            let mut bc = pb;
            bc.merge(&pc).unwrap();
            let mut a_bc = pa;
            a_bc.merge(&bc).unwrap();
            prop_assert_eq!(ab_c.finish(), a_bc.finish());
        }
    }
}
