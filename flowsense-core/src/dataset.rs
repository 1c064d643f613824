//! In-memory shards

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::record_batch::RecordBatch;
use crate::schema::normalize_column_name;
use crate::source::{ChunkSource, ShardSet};

/// A shard held entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryShard {
    /// Name of the shard
    name: String,

    /// Normalized header
    header: Arc<Vec<String>>,

    /// All rows of the shard
    rows: Arc<Vec<Vec<String>>>,
}

impl InMemoryShard {
    /// Create a new in-memory shard
    pub fn new<H: AsRef<str>>(name: &str, header: &[H], rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.to_string(),
            header: Arc::new(header.iter().map(|h| normalize_column_name(h.as_ref())).collect()),
            rows: Arc::new(rows),
        }
    }

    /// Create a shard from string slices
    pub fn from_rows(name: &str, header: &[&str], rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|s| (*s).to_string()).collect())
            .collect();
        Self::new(name, header, rows)
    }

    /// Create a scanner positioned at the first row
    pub fn scan(&self) -> InMemoryShardScanner {
        InMemoryShardScanner {
            shard: self.clone(),
            position: 0,
        }
    }
}

/// A scanner for in-memory shards
pub struct InMemoryShardScanner {
    /// The shard being scanned
    shard: InMemoryShard,

    /// The next row to read
    position: usize,
}

impl ChunkSource for InMemoryShardScanner {
    fn shard_name(&self) -> &str {
        &self.shard.name
    }

    fn next_chunk(&mut self, max_rows: usize) -> Result<Option<RecordBatch>> {
        if max_rows == 0 {
            return Err(Error::InvalidArgument("max_rows must be greater than 0".into()));
        }
        if self.position >= self.shard.rows.len() {
            return Ok(None);
        }

        let end = (self.position + max_rows).min(self.shard.rows.len());
        let rows = self.shard.rows[self.position..end].to_vec();
        let batch = RecordBatch::with_shared_header(Arc::clone(&self.shard.header), rows)
            .with_first_row(self.position);
        self.position = end;

        Ok(Some(batch))
    }
}

/// A shard set backed by in-memory shards
#[derive(Debug, Clone, Default)]
pub struct InMemoryShardSet {
    shards: Vec<InMemoryShard>,
}

impl InMemoryShardSet {
    /// Create a new shard set
    pub fn new(shards: Vec<InMemoryShard>) -> Self {
        Self { shards }
    }
}

impl ShardSet for InMemoryShardSet {
    fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn open(&self, index: usize) -> Result<Box<dyn ChunkSource>> {
        let shard = self.shards.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!("Shard index {index} out of range"))
        })?;
        Ok(Box::new(shard.scan()))
    }

    fn shard_name(&self, index: usize) -> String {
        self.shards
            .get(index)
            .map_or_else(|| format!("shard-{index}"), |s| s.name.clone())
    }
}
