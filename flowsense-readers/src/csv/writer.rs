//! CSV writer for prediction output

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::WriterBuilder;
use flowsense_core::RecordBatch;

use crate::common::PREDICTION_COLUMN;
use crate::error::{Error, Result};

/// Writes input rows followed by one predicted-label column.
///
/// The header is taken from the first chunk written; later chunks must carry
/// the same header.
pub struct PredictionWriter<W: Write> {
    /// Inner CSV writer
    writer: csv::Writer<W>,

    /// Header written with the first chunk
    header: Option<Vec<String>>,

    /// Rows written so far
    rows_written: usize,
}

impl<W: Write> PredictionWriter<W> {
    /// Create a writer over any sink
    pub fn new(sink: W) -> Self {
        Self {
            writer: WriterBuilder::new().flexible(false).from_writer(sink),
            header: None,
            rows_written: 0,
        }
    }

    /// Write a chunk and one prediction per row; `None` writes an empty cell
    pub fn write_chunk(&mut self, batch: &RecordBatch, predictions: &[Option<String>]) -> Result<()> {
        if predictions.len() != batch.row_count() {
            return Err(Error::InvalidArgument(format!(
                "{} predictions for {} rows",
                predictions.len(),
                batch.row_count()
            )));
        }

        match &self.header {
            Some(header) if header.as_slice() != batch.columns() => {
                return Err(Error::Format("chunk header differs from the first chunk".into()));
            }
            Some(_) => {}
            None => {
                let header = batch.columns().to_vec();
                self.writer
                    .write_record(header.iter().map(String::as_str).chain([PREDICTION_COLUMN]))?;
                self.header = Some(header);
            }
        }

        let width = batch.columns().len();
        for (row, prediction) in predictions.iter().enumerate() {
            let cells = (0..width).map(|column| batch.cell(row, column));
            self.writer
                .write_record(cells.chain([prediction.as_deref().unwrap_or("")]))?;
        }
        self.rows_written += predictions.len();
        Ok(())
    }

    /// Rows written so far
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flush and return the sink
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

impl PredictionWriter<BufWriter<File>> {
    /// Create a prediction file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(rows: &[&[&str]]) -> RecordBatch {
        RecordBatch::new(
            &["x", "Label"],
            rows.iter().map(|r| r.iter().map(|s| (*s).to_string()).collect()).collect(),
        )
    }

    #[test]
    fn appends_prediction_column() {
        let mut writer = PredictionWriter::new(Vec::new());
        writer
            .write_chunk(&batch(&[&["1", "a"], &["2"]]), &[Some("benign".into()), None])
            .unwrap();
        writer.write_chunk(&batch(&[&["3", "b"]]), &[Some("ddos".into())]).unwrap();
        assert_eq!(writer.rows_written(), 3);

        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(out, "x,Label,Predicted_Label\n1,a,benign\n2,,\n3,b,ddos\n");
    }

    #[test]
    fn prediction_count_must_match() {
        let mut writer = PredictionWriter::new(Vec::new());
        assert!(writer.write_chunk(&batch(&[&["1", "a"]]), &[]).is_err());
    }
}
