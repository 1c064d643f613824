//! Shard and chunk sources

use crate::error::Result;
use crate::record_batch::RecordBatch;

/// A sequential reader over one shard, yielding bounded chunks
pub trait ChunkSource: Send {
    /// Name of the shard, used in logs and reports
    fn shard_name(&self) -> &str;

    /// Retrieve the next chunk of at most `max_rows` rows.
    /// Returns None when exhausted
    fn next_chunk(&mut self, max_rows: usize) -> Result<Option<RecordBatch>>;
}

/// A set of shards that can each be opened any number of times.
///
/// The metadata pass and the trainer both walk the same set, so opening a
/// shard must always start from its first row.
pub trait ShardSet: Send + Sync {
    /// Number of shards in the set
    fn shard_count(&self) -> usize;

    /// Open shard `index` from the beginning
    fn open(&self, index: usize) -> Result<Box<dyn ChunkSource>>;

    /// Name of shard `index`
    fn shard_name(&self, index: usize) -> String {
        format!("shard-{index}")
    }
}

/// Drain a source, handing every chunk to `f`
pub fn for_each_chunk<F>(source: &mut dyn ChunkSource, max_rows: usize, mut f: F) -> Result<usize>
where
    F: FnMut(RecordBatch) -> Result<()>,
{
    let mut chunks = 0;
    while let Some(chunk) = source.next_chunk(max_rows)? {
        chunks += 1;
        f(chunk)?;
    }
    Ok(chunks)
}
