//! Model status reporting

use std::fmt;

use chrono::{DateTime, Utc};
use flowsense_learn::ArtifactBundle;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Description of a bundle and of the traffic served from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    /// Bundle id
    pub id: Uuid,
    /// When the bundle was assembled
    pub created_at: DateTime<Utc>,
    /// Bundle it continued training from
    pub parent: Option<Uuid>,
    /// Artifact format version
    pub format_version: u16,
    /// Labels the model can return
    pub classes: Vec<String>,
    /// Numeric feature count
    pub numeric_features: usize,
    /// Categorical feature count
    pub categorical_features: usize,
    /// Encoded vector width
    pub feature_width: usize,
    /// Rows seen over the classifier's lifetime
    pub training_rows: u64,
    /// Updates applied over the classifier's lifetime
    pub training_updates: u64,

    /// Requests served since the service started
    pub requests: u64,

    /// Rows predicted since the service started
    pub rows_predicted: u64,

    /// Rows that could not be predicted
    pub rows_failed: u64,
}

impl ModelStatus {
    /// Status of `bundle`, with zeroed traffic counters
    pub fn from_bundle(bundle: &ArtifactBundle) -> Self {
        let info = bundle.info();
        Self {
            id: info.id,
            created_at: info.created_at,
            parent: info.parent,
            format_version: info.format_version,
            classes: bundle.labels().labels().to_vec(),
            numeric_features: bundle.schema().numeric().len(),
            categorical_features: bundle.schema().categorical().len(),
            feature_width: bundle.feature_width(),
            training_rows: info.training_rows,
            training_updates: info.training_updates,
            requests: 0,
            rows_predicted: 0,
            rows_failed: 0,
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bundle:        {}", self.id)?;
        writeln!(f, "created:       {}", self.created_at.to_rfc3339())?;
        if let Some(parent) = self.parent {
            writeln!(f, "parent:        {parent}")?;
        }
        writeln!(f, "format:        v{}", self.format_version)?;
        writeln!(f, "classes ({}):   {}", self.classes.len(), self.classes.join(", "))?;
        writeln!(
            f,
            "features:      {} numeric, {} categorical, width {}",
            self.numeric_features, self.categorical_features, self.feature_width
        )?;
        write!(
            f,
            "training:      {} rows, {} updates",
            self.training_rows, self.training_updates
        )
    }
}
