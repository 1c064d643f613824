//! CSV shard reader

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};
use flowsense_core::error::Result as CoreResult;
use flowsense_core::schema::normalize_column_name;
use flowsense_core::{ChunkSource, RecordBatch};

use crate::common::CsvReaderOptions;
use crate::error::{Error, Result};

/// Reads one CSV shard as a sequence of bounded chunks.
///
/// Header names are normalized (BOM stripped, trimmed) once and shared by
/// every chunk. Rows may have fewer or more fields than the header; the
/// batch decides what that means for each row.
pub struct CsvShardReader<R: Read> {
    /// Name of the shard, for logs and errors
    name: String,

    /// Inner CSV reader
    reader: csv::Reader<R>,

    /// Normalized header, shared with every chunk
    header: Arc<Vec<String>>,

    /// Reused record buffer
    record: StringRecord,

    /// Rows read so far
    position: usize,

    /// Whether the reader is exhausted
    exhausted: bool,
}

impl<R: Read> CsvShardReader<R> {
    /// Create a reader over any byte source
    pub fn new(name: &str, reader: R, options: &CsvReaderOptions) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(options.delimiter)
            .quote(options.quote)
            .has_headers(options.has_header)
            .flexible(true)
            .from_reader(reader);

        let mut header: Vec<String> = if options.has_header {
            reader.headers()?.iter().map(normalize_column_name).collect()
        } else {
            Vec::new()
        };

        let mut record = StringRecord::new();
        if !options.has_header {
            // Without a header, the first row's width names the columns
            if reader.read_record(&mut record)? {
                header = (0..record.len()).map(|i| format!("column_{i}")).collect();
            }
        }

        Ok(Self {
            name: name.to_string(),
            reader,
            header: Arc::new(header),
            record,
            position: 0,
            exhausted: false,
        })
    }

    /// Read up to `max_rows` rows
    pub fn read_chunk(&mut self, max_rows: usize) -> Result<Option<RecordBatch>> {
        if max_rows == 0 {
            return Err(Error::InvalidArgument("max_rows must be greater than 0".into()));
        }
        if self.exhausted {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(max_rows.min(8192));

        // A header-less reader already holds its first row
        if !self.record.is_empty() && self.position == 0 {
            rows.push(self.record.iter().map(str::to_string).collect());
            self.record.clear();
        }

        while rows.len() < max_rows {
            if self.reader.read_record(&mut self.record)? {
                rows.push(self.record.iter().map(str::to_string).collect());
            } else {
                self.exhausted = true;
                break;
            }
        }
        self.record.clear();

        if rows.is_empty() {
            return Ok(None);
        }

        let first_row = self.position;
        self.position += rows.len();
        Ok(Some(
            RecordBatch::with_shared_header(Arc::clone(&self.header), rows).with_first_row(first_row),
        ))
    }

    /// Read every remaining row into one batch
    pub fn read_all(&mut self) -> Result<RecordBatch> {
        let mut rows = Vec::new();
        let first_row = self.position;
        while let Some(chunk) = self.read_chunk(8192)? {
            rows.extend(chunk.rows().iter().cloned());
        }
        Ok(RecordBatch::with_shared_header(Arc::clone(&self.header), rows).with_first_row(first_row))
    }
}

impl CsvShardReader<BufReader<File>> {
    /// Open a CSV file
    pub fn open<P: AsRef<Path>>(path: P, options: &CsvReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self::new(&name, BufReader::with_capacity(options.buffer_size, file), options)
    }
}

impl<R: Read + Send> ChunkSource for CsvShardReader<R> {
    fn shard_name(&self) -> &str {
        &self.name
    }

    fn next_chunk(&mut self, max_rows: usize) -> CoreResult<Option<RecordBatch>> {
        self.read_chunk(max_rows).map_err(|e| e.into_core(&self.name))
    }
}

/// Parse CSV text held in memory into a single batch
pub fn read_csv_text(text: &str, options: &CsvReaderOptions) -> Result<RecordBatch> {
    CsvShardReader::new("payload", text.as_bytes(), options)?.read_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsense_core::source::for_each_chunk;
    use flowsense_core::Error as CoreError;

    #[test]
    fn header_is_normalized() {
        let text = "\u{feff} Flow Duration , Label\n1,BENIGN\n";
        let batch = read_csv_text(text, &CsvReaderOptions::default()).unwrap();
        assert_eq!(batch.columns(), ["Flow Duration", "Label"]);
        assert_eq!(batch.cell(0, 1), "BENIGN");
    }

    #[test]
    fn chunks_are_bounded_and_positioned() {
        let text = "x,Label\n1,a\n2,b\n3,c\n4,d\n5,e\n";
        let mut reader = CsvShardReader::new("t", text.as_bytes(), &CsvReaderOptions::default()).unwrap();
        let mut seen = Vec::new();
        for_each_chunk(&mut reader, 2, |chunk| {
            seen.push((chunk.first_row(), chunk.row_count()));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, [(0, 2), (2, 2), (4, 1)]);
    }

    #[test]
    fn ragged_rows_are_kept() {
        let text = "x,y,Label\n1,2\n1,2,a,extra\n";
        let batch = read_csv_text(text, &CsvReaderOptions::default()).unwrap();
        assert_eq!(batch.rows()[0].len(), 2);
        assert_eq!(batch.rows()[1].len(), 4);
        assert_eq!(batch.cell(0, 2), "");
    }

    #[test]
    fn headerless_input_gets_positional_names() {
        let options = CsvReaderOptions {
            has_header: false,
            ..Default::default()
        };
        let batch = read_csv_text("1,a\n2,b\n", &options).unwrap();
        assert_eq!(batch.columns(), ["column_0", "column_1"]);
        assert_eq!(batch.row_count(), 2);
        assert_eq!(batch.cell(1, 1), "b");
    }

    #[test]
    fn invalid_utf8_is_a_source_error() {
        let bytes: &[u8] = b"x,Label\n1,\xff\xfe\n";
        let mut reader = CsvShardReader::new("bad.csv", bytes, &CsvReaderOptions::default()).unwrap();
        match reader.next_chunk(10) {
            Err(CoreError::Source { shard, .. }) => assert_eq!(shard, "bad.csv"),
            other => panic!("expected a source error, got {other:?}"),
        }
    }

    #[test]
    fn semicolon_delimited() {
        let options = CsvReaderOptions {
            delimiter: b';',
            ..Default::default()
        };
        let batch = read_csv_text("x;Label\n1;a\n", &options).unwrap();
        assert_eq!(batch.cell(0, 0), "1");
    }
}
