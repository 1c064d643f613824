//! Operator commands for flowsense
//!
//! Each command maps to one stage of the pipeline: collecting metadata over
//! a shard directory, training (or resuming) a model bundle, bulk prediction
//! over an unlabeled CSV, and reporting on a saved bundle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use flowsense_core::metadata::CollectionSummary;
use flowsense_core::{collect_metadata, FeatureSchema, FittedMetadata, PipelineConfig};
use flowsense_learn::{ArtifactBundle, IncrementalTrainer, TrainerConfig, TrainingStats};
use flowsense_readers::{CsvReaderOptions, CsvShardReader, PredictionWriter, ShardDirectory};
use flowsense_serve::{BulkSummary, BundleHandle, InferenceService, ModelStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Settings read from the optional JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chunking, clipping and parallelism
    pub pipeline: PipelineConfig,

    /// Classifier hyperparameters
    pub trainer: TrainerConfig,

    /// CSV parsing
    pub csv: CsvReaderOptions,

    /// JSON schema file; the CIC-IDS2017 flow schema when absent
    pub schema: Option<PathBuf>,
}

impl AppConfig {
    /// Read a config file, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        config.pipeline.validate()?;
        config.trainer.validate()?;
        Ok(config)
    }

    /// The feature schema to fit against
    pub fn feature_schema(&self) -> Result<FeatureSchema> {
        match &self.schema {
            Some(path) => {
                let text =
                    fs::read_to_string(path).with_context(|| format!("reading schema {}", path.display()))?;
                Ok(FeatureSchema::from_json(&text)?)
            }
            None => Ok(FeatureSchema::cic_ids2017()),
        }
    }

    fn shards(&self, data_dir: &Path) -> Result<ShardDirectory> {
        let shards = ShardDirectory::discover(data_dir, self.csv.clone())
            .with_context(|| format!("listing shards in {}", data_dir.display()))?;
        if shards.is_empty() {
            bail!("no .csv shards in {}", data_dir.display());
        }
        Ok(shards)
    }
}

/// Fit scaling statistics, vocabularies and labels over a shard directory
pub fn collect(config: &AppConfig, data_dir: &Path, out: &Path) -> Result<CollectionSummary> {
    let shards = config.shards(data_dir)?;
    let schema = config.feature_schema()?;
    let (metadata, summary) = collect_metadata(&shards, &schema, &config.pipeline)?;
    if metadata.labels.is_empty() {
        bail!("no labelled rows found under {}", data_dir.display());
    }
    metadata
        .save(out)
        .with_context(|| format!("writing metadata {}", out.display()))?;
    info!(path = %out.display(), classes = metadata.labels.len(), "Saved metadata");
    Ok(summary)
}

/// Train a bundle over a shard directory, optionally continuing from a
/// saved bundle
pub fn train(
    config: &AppConfig,
    data_dir: &Path,
    metadata: &Path,
    out: &Path,
    resume: Option<&Path>,
) -> Result<TrainingStats> {
    let shards = config.shards(data_dir)?;
    let metadata =
        FittedMetadata::load(metadata).with_context(|| format!("loading metadata {}", metadata.display()))?;
    let trainer = IncrementalTrainer::new(&metadata, config.pipeline.clone(), config.trainer.clone())?;

    let (state, stats, parent) = match resume {
        Some(path) => {
            let previous =
                ArtifactBundle::load(path).with_context(|| format!("loading bundle {}", path.display()))?;
            if previous.metadata() != &metadata {
                bail!("bundle {} was trained with different metadata", path.display());
            }
            let (state, stats) = trainer.resume(previous.classifier(), &shards)?;
            (state, stats, Some(previous.info().id))
        }
        None => {
            let (state, stats) = trainer.train(&shards)?;
            (state, stats, None)
        }
    };

    let bundle = ArtifactBundle::from_training(metadata.clone(), state, &stats, parent)?;
    bundle
        .save(out)
        .with_context(|| format!("writing bundle {}", out.display()))?;
    info!(path = %out.display(), id = %bundle.info().id, "Saved bundle");
    Ok(stats)
}

/// Predict every row of `input`, writing the rows plus a predicted label
pub fn predict(config: &AppConfig, bundle: &Path, input: &Path, output: &Path) -> Result<BulkSummary> {
    let handle = BundleHandle::open(bundle, config.pipeline.clip_bound)
        .with_context(|| format!("loading bundle {}", bundle.display()))?;
    let service = InferenceService::new(Arc::new(handle)).with_options(config.csv.clone());

    let mut source = CsvShardReader::open(input, &config.csv).with_context(|| format!("opening {}", input.display()))?;
    let mut writer = PredictionWriter::create(output).with_context(|| format!("creating {}", output.display()))?;
    let summary = service.predict_to_writer(&mut source, &mut writer, config.pipeline.chunk_size)?;

    let mut sink = writer.finish()?;
    std::io::Write::flush(&mut sink)?;
    Ok(summary)
}

/// Describe a saved bundle
pub fn status(bundle: &Path) -> Result<ModelStatus> {
    let bundle = ArtifactBundle::load(bundle).with_context(|| format!("loading bundle {}", bundle.display()))?;
    Ok(ModelStatus::from_bundle(&bundle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SCHEMA: &str = r#"{"numeric": ["Flow Duration"], "categorical": ["SYN Flag Count"], "label": "Label"}"#;

    fn write_day(dir: &Path, name: &str, rows: &[&str]) {
        let mut text = String::from("Flow Duration,SYN Flag Count,Label\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        fs::write(dir.join(name), text).unwrap();
    }

    fn config(dir: &Path) -> AppConfig {
        let schema = dir.join("schema.json");
        fs::write(&schema, SCHEMA).unwrap();
        AppConfig {
            schema: Some(schema),
            ..Default::default()
        }
    }

    #[test]
    fn collect_train_predict_status() {
        let root = tempdir().unwrap();
        let data = root.path().join("data");
        fs::create_dir(&data).unwrap();
        write_day(&data, "monday.csv", &["1000,0,BENIGN", "1200,0,BENIGN", "900,0,BENIGN"]);
        write_day(&data, "tuesday.csv", &["10,1,DDoS", "12,1,DDoS"]);
        let config = config(root.path());

        let metadata = root.path().join("metadata.fsm");
        let summary = collect(&config, &data, &metadata).unwrap();
        assert_eq!(summary.rows_accumulated, 5);

        let bundle = root.path().join("model.fsb");
        let stats = train(&config, &data, &metadata, &bundle, None).unwrap();
        assert_eq!(stats.rows_trained, 5);

        let resumed = root.path().join("model-2.fsb");
        train(&config, &data, &metadata, &resumed, Some(&bundle)).unwrap();
        let first = status(&bundle).unwrap();
        let second = status(&resumed).unwrap();
        assert_eq!(second.parent, Some(first.id));
        assert_eq!(second.training_rows, 10);
        assert_eq!(second.classes, ["benign", "ddos"]);

        let input = root.path().join("unlabeled.csv");
        fs::write(&input, "Flow Duration,SYN Flag Count\n1100,0\nx,1\n").unwrap();
        let output = root.path().join("predicted.csv");
        let bulk = predict(&config, &resumed, &input, &output).unwrap();
        assert_eq!(bulk.rows, 2);
        assert_eq!(bulk.failed, 1);

        let written = fs::read_to_string(&output).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("Flow Duration,SYN Flag Count,Predicted_Label"));
        let first_row = lines.next().unwrap();
        assert!(first_row.ends_with(",benign") || first_row.ends_with(",ddos"));
        assert_eq!(lines.next(), Some("x,1,"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let root = tempdir().unwrap();
        let config = config(root.path());
        let err = collect(&config, root.path(), &root.path().join("m.fsm")).unwrap_err();
        assert!(err.to_string().contains("no .csv shards"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let root = tempdir().unwrap();
        let path = root.path().join("flowsense.json");
        fs::write(&path, r#"{"pipeline": {"chunk_size": 128}}"#).unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.pipeline.chunk_size, 128);
        assert_eq!(config.trainer, TrainerConfig::default());
        assert!(config.csv.has_header);
        assert_eq!(config.feature_schema().unwrap(), FeatureSchema::cic_ids2017());
    }
}
