//! Feature schema shared by every pipeline stage

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default name of the label column
pub const DEFAULT_LABEL_COLUMN: &str = "Label";

const CIC_IDS2017_CATEGORICAL: [&str; 12] = [
    "Fwd PSH Flags", "Bwd PSH Flags", "Fwd URG Flags", "Bwd URG Flags",
    "FIN Flag Count", "SYN Flag Count", "RST Flag Count", "PSH Flag Count",
    "ACK Flag Count", "URG Flag Count", "CWE Flag Count", "ECE Flag Count",
];

const CIC_IDS2017_NUMERIC: [&str; 65] = [
    "Destination Port", "Flow Duration", "Total Fwd Packets", "Total Backward Packets",
    "Total Length of Fwd Packets", "Total Length of Bwd Packets", "Fwd Packet Length Max",
    "Fwd Packet Length Min", "Fwd Packet Length Mean", "Fwd Packet Length Std",
    "Bwd Packet Length Max", "Bwd Packet Length Min", "Bwd Packet Length Mean",
    "Bwd Packet Length Std", "Flow Bytes/s", "Flow Packets/s", "Flow IAT Mean",
    "Flow IAT Std", "Flow IAT Max", "Flow IAT Min", "Fwd IAT Total", "Fwd IAT Mean",
    "Fwd IAT Std", "Fwd IAT Max", "Fwd IAT Min", "Bwd IAT Total", "Bwd IAT Mean",
    "Bwd IAT Std", "Bwd IAT Max", "Bwd IAT Min", "Fwd Header Length", "Bwd Header Length",
    "Fwd Packets/s", "Bwd Packets/s", "Min Packet Length", "Max Packet Length",
    "Packet Length Mean", "Packet Length Std", "Packet Length Variance", "Down/Up Ratio",
    "Average Packet Size", "Avg Fwd Segment Size", "Avg Bwd Segment Size",
    "Fwd Avg Bytes/Bulk", "Fwd Avg Packets/Bulk", "Fwd Avg Bulk Rate",
    "Bwd Avg Bytes/Bulk", "Bwd Avg Packets/Bulk", "Bwd Avg Bulk Rate",
    "Subflow Fwd Packets", "Subflow Fwd Bytes", "Subflow Bwd Packets",
    "Subflow Bwd Bytes", "Init_Win_bytes_forward", "Init_Win_bytes_backward",
    "act_data_pkt_fwd", "min_seg_size_forward", "Active Mean", "Active Std",
    "Active Max", "Active Min", "Idle Mean", "Idle Std", "Idle Max", "Idle Min",
];

/// Normalize a column name read from a shard header.
///
/// Strips a leading byte-order mark and surrounding whitespace.
pub fn normalize_column_name(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_string()
}

/// Normalize a raw label string (trim, lowercase)
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Ordered numeric and categorical feature names plus the label column.
///
/// The same schema instance must be used by the metadata pass, training and
/// inference; the encoded vector layout is derived from its field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Numeric feature names in encoding order
    numeric: Vec<String>,

    /// Categorical feature names in encoding order
    categorical: Vec<String>,

    /// Name of the label column
    label: String,
}

impl FeatureSchema {
    /// Create a new schema, rejecting empty or duplicate names
    pub fn new<N, C>(numeric: N, categorical: C, label: &str) -> Result<Self>
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let schema = Self {
            numeric: numeric.into_iter().map(|n| normalize_column_name(n.as_ref())).collect(),
            categorical: categorical.into_iter().map(|n| normalize_column_name(n.as_ref())).collect(),
            label: normalize_column_name(label),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// The CIC-IDS2017 network-flow schema
    pub fn cic_ids2017() -> Self {
        Self {
            numeric: CIC_IDS2017_NUMERIC.iter().map(|s| (*s).to_string()).collect(),
            categorical: CIC_IDS2017_CATEGORICAL.iter().map(|s| (*s).to_string()).collect(),
            label: DEFAULT_LABEL_COLUMN.to_string(),
        }
    }

    /// Parse a schema from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidArgument(format!("Invalid schema JSON: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Serialize this schema to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidOperation(format!("Failed to serialize schema: {e}")))
    }

    /// Check that every name is non-empty and unique, and that the label is
    /// not also a feature
    pub fn validate(&self) -> Result<()> {
        if self.label.is_empty() {
            return Err(Error::InvalidArgument("Label column name is empty".into()));
        }
        if self.numeric.is_empty() && self.categorical.is_empty() {
            return Err(Error::InvalidArgument("Schema has no feature columns".into()));
        }

        let mut seen = HashSet::with_capacity(self.numeric.len() + self.categorical.len() + 1);
        seen.insert(self.label.as_str());
        for name in self.numeric.iter().chain(&self.categorical) {
            if name.is_empty() {
                return Err(Error::InvalidArgument("Feature column name is empty".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidArgument(format!("Duplicate column name: {name}")));
            }
        }
        Ok(())
    }

    /// Numeric feature names
    pub fn numeric(&self) -> &[String] {
        &self.numeric
    }

    /// Categorical feature names
    pub fn categorical(&self) -> &[String] {
        &self.categorical
    }

    /// Label column name
    pub fn label_column(&self) -> &str {
        &self.label
    }

    /// All feature columns, numeric first
    pub fn feature_columns(&self) -> impl Iterator<Item = &str> {
        self.numeric.iter().chain(&self.categorical).map(String::as_str)
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FeatureSchema: {} numeric, {} categorical, label '{}'",
            self.numeric.len(),
            self.categorical.len(),
            self.label
        )
    }
}
