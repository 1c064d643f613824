//! Shard discovery: a directory of CSV files

use std::fs;
use std::path::{Path, PathBuf};

use flowsense_core::error::{Error as CoreError, Result as CoreResult};
use flowsense_core::{ChunkSource, ShardSet};
use tracing::debug;

use crate::common::CsvReaderOptions;
use crate::error::Result;

use super::reader::CsvShardReader;

/// An ordered set of CSV shards.
///
/// Opening a shard always starts a fresh reader from its first row, so the
/// metadata pass and the trainer can both walk the same set.
#[derive(Debug, Clone)]
pub struct ShardDirectory {
    /// File paths to read, in order
    paths: Vec<PathBuf>,

    /// Reader options
    options: CsvReaderOptions,
}

impl ShardDirectory {
    /// Discover every `*.csv` file directly inside `dir`, in sorted order
    pub fn discover<P: AsRef<Path>>(dir: P, options: CsvReaderOptions) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            })
            .collect();
        paths.sort();
        debug!(dir = %dir.display(), shards = paths.len(), "Discovered shards");
        Ok(Self { paths, options })
    }

    /// Use an explicit list of files, in the given order
    pub fn from_paths<P: AsRef<Path>>(paths: Vec<P>, options: CsvReaderOptions) -> Self {
        Self {
            paths: paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            options,
        }
    }

    /// Check if there are no shards
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl ShardSet for ShardDirectory {
    fn shard_count(&self) -> usize {
        self.paths.len()
    }

    fn open(&self, index: usize) -> CoreResult<Box<dyn ChunkSource>> {
        let path = self
            .paths
            .get(index)
            .ok_or_else(|| CoreError::InvalidArgument(format!("Shard index {index} out of range")))?;
        let reader = CsvShardReader::open(path, &self.options)
            .map_err(|e| e.into_core(&self.shard_name(index)))?;
        Ok(Box::new(reader))
    }

    fn shard_name(&self, index: usize) -> String {
        self.paths.get(index).map_or_else(
            || format!("shard-{index}"),
            |p| p.file_name().map_or_else(|| p.display().to_string(), |n| n.to_string_lossy().into_owned()),
        )
    }
}
