//! Record batches: bounded chunks of raw rows read from a shard

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::record::{parse_categorical, parse_numeric, FlowRecord};
use crate::schema::{normalize_column_name, normalize_label, FeatureSchema};

/// A chunk of raw string rows sharing one normalized header
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// Normalized column names
    columns: Arc<Vec<String>>,

    /// Column indices by name for faster lookup
    column_indices: Arc<HashMap<String, usize>>,

    /// Raw rows; a row may be shorter than the header
    rows: Vec<Vec<String>>,

    /// Position of the first row within its shard
    first_row: usize,
}

/// Positions of the schema's columns within a particular batch header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Index of each numeric feature, in schema order
    pub numeric: Vec<Option<usize>>,

    /// Index of each categorical feature, in schema order
    pub categorical: Vec<Option<usize>>,

    /// Index of the label column
    pub label: Option<usize>,
}

impl ColumnLayout {
    /// Feature columns of `schema` that the header lacks
    pub fn missing_features(&self, schema: &FeatureSchema) -> Vec<String> {
        let numeric = schema.numeric().iter().zip(&self.numeric);
        let categorical = schema.categorical().iter().zip(&self.categorical);
        numeric
            .chain(categorical)
            .filter(|(_, index)| index.is_none())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Fail with a schema error unless every feature column is present
    pub fn require_features(&self, schema: &FeatureSchema) -> Result<()> {
        let missing = self.missing_features(schema);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::missing_columns(missing))
        }
    }
}

impl RecordBatch {
    /// Create a batch, normalizing the header names
    pub fn new<H: AsRef<str>>(header: &[H], rows: Vec<Vec<String>>) -> Self {
        let columns: Vec<String> = header.iter().map(|h| normalize_column_name(h.as_ref())).collect();
        Self::with_shared_header(Arc::new(columns), rows)
    }

    /// Create a batch over an already normalized header.
    ///
    /// Readers use this to share one header allocation across all chunks of a
    /// shard.
    pub fn with_shared_header(columns: Arc<Vec<String>>, rows: Vec<Vec<String>>) -> Self {
        let mut indices = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            // First occurrence wins for duplicated header names
            indices.entry(name.clone()).or_insert(i);
        }
        Self {
            columns,
            column_indices: Arc::new(indices),
            rows,
            first_row: 0,
        }
    }

    /// Set the position of the first row within its shard
    #[must_use]
    pub fn with_first_row(mut self, first_row: usize) -> Self {
        self.first_row = first_row;
        self
    }

    /// Normalized column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Index of a column by normalized name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_indices.get(name).copied()
    }

    /// Number of rows in this batch
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if this batch is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first row within its shard
    pub fn first_row(&self) -> usize {
        self.first_row
    }

    /// Raw rows
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// A cell value; cells past the end of a short row read as empty
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map_or("", String::as_str)
    }

    /// Locate the schema's columns in this batch's header
    pub fn layout(&self, schema: &FeatureSchema) -> ColumnLayout {
        ColumnLayout {
            numeric: schema.numeric().iter().map(|n| self.column_index(n)).collect(),
            categorical: schema.categorical().iter().map(|n| self.column_index(n)).collect(),
            label: self.column_index(schema.label_column()),
        }
    }

    /// Check a row's framing and the numeric cells the layout refers to.
    ///
    /// Returns the reason the row is malformed, if it is.
    pub fn check_row(&self, row: usize, layout: &ColumnLayout) -> Option<String> {
        let fields = self.rows.get(row)?;
        if fields.len() > self.columns.len() {
            return Some(format!(
                "row has {} fields but the header has {}",
                fields.len(),
                self.columns.len()
            ));
        }
        for index in layout.numeric.iter().flatten() {
            let cell = self.cell(row, *index);
            if parse_numeric(cell).is_none() {
                return Some(format!(
                    "value '{}' in column '{}' is not numeric",
                    cell, self.columns[*index]
                ));
            }
        }
        None
    }

    /// Like [`RecordBatch::check_row`], but a row whose label cell is blank
    /// is also malformed. Used where rows must carry a class.
    pub fn check_labelled_row(&self, row: usize, layout: &ColumnLayout) -> Option<String> {
        self.check_row(row, layout).or_else(|| {
            let label = layout.label?;
            normalize_label(self.cell(row, label))
                .is_empty()
                .then(|| format!("empty value in label column '{}'", self.columns[label]))
        })
    }

    /// Convert every row into a typed record.
    ///
    /// Fails as a whole with a schema error when a feature column is absent;
    /// otherwise yields one entry per row, in row order, with malformed rows
    /// reported individually.
    pub fn to_records(&self, schema: &FeatureSchema) -> Result<Vec<Result<FlowRecord>>> {
        let layout = self.layout(schema);
        layout.require_features(schema)?;

        let records = (0..self.rows.len())
            .map(|row| {
                if let Some(reason) = self.check_row(row, &layout) {
                    return Err(Error::MalformedInput {
                        row: self.first_row + row,
                        reason,
                    });
                }
                Ok(self.record_at(row, &layout))
            })
            .collect();
        Ok(records)
    }

    fn record_at(&self, row: usize, layout: &ColumnLayout) -> FlowRecord {
        let numeric = layout
            .numeric
            .iter()
            .map(|index| index.and_then(|i| parse_numeric(self.cell(row, i))).unwrap_or(f64::NAN))
            .collect();
        let categorical = layout
            .categorical
            .iter()
            .map(|index| index.and_then(|i| parse_categorical(self.cell(row, i))))
            .collect();
        let label = layout.label.map(|i| self.cell(row, i).to_string());
        FlowRecord::new(numeric, categorical, label)
    }
}

impl fmt::Display for RecordBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordBatch: {} rows, {} columns, starting at row {}",
            self.rows.len(),
            self.columns.len(),
            self.first_row
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter().map(|r| r.iter().map(|s| (*s).to_string()).collect()).collect()
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["x"], ["flag"], "Label").unwrap()
    }

    #[test]
    fn header_is_trimmed() {
        let batch = RecordBatch::new(&["\u{feff} x", " flag ", "Label "], Vec::new());
        assert_eq!(batch.columns(), ["x", "flag", "Label"]);
        assert_eq!(batch.column_index("Label"), Some(2));
    }

    #[test]
    fn records_follow_schema_order() {
        let batch = RecordBatch::new(&["Label", "flag", "x"], rows(&[&["BENIGN", "1", "2.5"]]));
        let records = batch.to_records(&schema()).unwrap();
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.numeric(), [2.5]);
        assert_eq!(record.categorical(), [Some("1".to_string())]);
        assert_eq!(record.label(), Some("BENIGN"));
    }

    #[test]
    fn missing_feature_is_schema_error() {
        let batch = RecordBatch::new(&["x", "Label"], rows(&[&["1", "a"]]));
        match batch.to_records(&schema()) {
            Err(Error::Schema { missing }) => assert_eq!(missing, ["flag"]),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_rows_are_reported_individually() {
        let batch = RecordBatch::new(&["x", "flag"], rows(&[&["1", "0"], &["oops", "0"], &["3", "1", "extra"]]))
            .with_first_row(10);
        let records = batch.to_records(&schema()).unwrap();
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(Error::MalformedInput { row: 11, .. })));
        assert!(matches!(records[2], Err(Error::MalformedInput { row: 12, .. })));
    }

    #[test]
    fn blank_label_is_malformed_only_where_labels_are_required() {
        let batch = RecordBatch::new(&["x", "flag", "Label"], rows(&[&["1", "0", "  "], &["2", "1"], &["3", "1", "a"]]));
        let layout = batch.layout(&schema());
        assert!(batch.check_row(0, &layout).is_none());
        assert!(batch.check_labelled_row(0, &layout).is_some());
        assert!(batch.check_labelled_row(1, &layout).is_some());
        assert!(batch.check_labelled_row(2, &layout).is_none());
    }

    #[test]
    fn short_rows_read_as_empty() {
        let batch = RecordBatch::new(&["x", "flag"], rows(&[&["4"]]));
        let records = batch.to_records(&schema()).unwrap();
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.categorical(), [None]);
        assert_eq!(record.label(), None);
    }
}
