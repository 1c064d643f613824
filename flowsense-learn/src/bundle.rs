//! Model bundles: the unit of persistence for everything inference needs

use std::path::Path;

use chrono::{DateTime, Utc};
use flowsense_core::io::{read_artifact, write_artifact, ArtifactKind, FORMAT_VERSION};
use flowsense_core::{Error, FeatureSchema, FittedMetadata, LabelVocabulary, Preprocessor, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::classifier::ClassifierState;
use crate::trainer::TrainingStats;

/// Descriptive information carried with a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleInfo {
    /// Unique bundle id
    pub id: Uuid,

    /// When the bundle was assembled
    pub created_at: DateTime<Utc>,

    /// Artifact format version the bundle was written with
    pub format_version: u16,

    /// Rows seen by the classifier over its lifetime
    pub training_rows: u64,

    /// Incremental updates applied over the classifier's lifetime
    pub training_updates: u64,

    /// Bundle this one continued training from, if any
    pub parent: Option<Uuid>,
}

/// Schema, scaling statistics, encoder, label vocabulary and classifier,
/// persisted and loaded as one unit.
///
/// A bundle is immutable and always internally consistent: construction and
/// loading both check that the parts agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    info: BundleInfo,
    metadata: FittedMetadata,
    classifier: ClassifierState,
}

impl ArtifactBundle {
    /// Assemble a bundle from fitted metadata and a trained classifier
    pub fn assemble(
        metadata: FittedMetadata,
        classifier: ClassifierState,
        parent: Option<Uuid>,
    ) -> Result<Self> {
        let info = BundleInfo {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            format_version: FORMAT_VERSION,
            training_rows: classifier.samples_seen(),
            training_updates: classifier.updates(),
            parent,
        };
        let bundle = Self {
            info,
            metadata,
            classifier,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Assemble from a finished training run, logging its totals
    pub fn from_training(
        metadata: FittedMetadata,
        classifier: ClassifierState,
        stats: &TrainingStats,
        parent: Option<Uuid>,
    ) -> Result<Self> {
        let bundle = Self::assemble(metadata, classifier, parent)?;
        info!(
            id = %bundle.info.id,
            rows = stats.rows_trained,
            chunks = stats.chunks_trained,
            "Assembled bundle"
        );
        Ok(bundle)
    }

    /// Check that every part agrees with the others
    pub fn validate(&self) -> Result<()> {
        self.metadata.validate()?;
        self.classifier.validate()?;
        if self.classifier.classes() != self.metadata.labels.labels() {
            return Err(Error::SchemaMismatch(
                "Classifier classes differ from the label vocabulary".into(),
            ));
        }
        if self.classifier.n_features() != self.metadata.feature_width() {
            return Err(Error::SchemaMismatch(format!(
                "Classifier expects width {}, encoder produces width {}",
                self.classifier.n_features(),
                self.metadata.feature_width()
            )));
        }
        Ok(())
    }

    /// Persist atomically to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_artifact(path, ArtifactKind::Bundle, self)
    }

    /// Load from `path`. Anything short of a complete, consistent bundle is
    /// an artifact load error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bundle: Self = read_artifact(path, ArtifactKind::Bundle)?;
        bundle
            .validate()
            .map_err(|e| Error::ArtifactLoad(format!("inconsistent bundle: {e}")))?;
        Ok(bundle)
    }

    /// Descriptive information
    pub fn info(&self) -> &BundleInfo {
        &self.info
    }

    /// Fitted metadata
    pub fn metadata(&self) -> &FittedMetadata {
        &self.metadata
    }

    /// Feature schema
    pub fn schema(&self) -> &FeatureSchema {
        &self.metadata.schema
    }

    /// Label vocabulary
    pub fn labels(&self) -> &LabelVocabulary {
        &self.metadata.labels
    }

    /// Trained classifier
    pub fn classifier(&self) -> &ClassifierState {
        &self.classifier
    }

    /// Width of every encoded feature vector
    pub fn feature_width(&self) -> usize {
        self.metadata.feature_width()
    }

    /// Build the preprocessing transform for this bundle
    pub fn preprocessor(&self, clip_bound: f64) -> Result<Preprocessor> {
        self.metadata.preprocessor(clip_bound)
    }
}
