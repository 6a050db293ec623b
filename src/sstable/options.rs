//! Writer and reader configuration.

use std::{fmt, sync::Arc};

use super::{CompressionType, FilterPolicy, SSTableError, TableFormat};
use crate::cache::CacheOpts;
use crate::key::{BytewiseComparator, Comparator};

/// Default target size of a data block.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default number of entries between restart points in data blocks.
pub const DEFAULT_BLOCK_RESTART_INTERVAL: usize = 16;

/// Default index block size threshold before partitioning.
pub const DEFAULT_INDEX_BLOCK_SIZE: usize = DEFAULT_BLOCK_SIZE;

// ------------------------------------------------------------------------------------------------
// WriterOptions
// ------------------------------------------------------------------------------------------------

/// Configuration of a [`Writer`](super::Writer).
#[derive(Clone)]
pub struct WriterOptions {
    /// On-disk format.
    pub table_format: TableFormat,

    /// A data block is flushed once its encoded size reaches this many bytes.
    pub block_size: usize,

    /// Entries between restart points in data blocks.
    pub block_restart_interval: usize,

    /// An index block that would grow past this size is finished as a
    /// partition of a two-level index. Ignored by formats without two-level
    /// index support.
    pub index_block_size: usize,

    /// Compression applied to data and index blocks.
    pub compression: CompressionType,

    /// Filter built over point user keys.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// User key order.
    pub comparator: Arc<dyn Comparator>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            table_format: TableFormat::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            index_block_size: DEFAULT_INDEX_BLOCK_SIZE,
            compression: CompressionType::default(),
            filter_policy: None,
            comparator: Arc::new(BytewiseComparator),
        }
    }
}

impl WriterOptions {
    /// Reject sizes and intervals of zero.
    pub fn validate(&self) -> Result<(), SSTableError> {
        if self.block_size == 0 {
            return Err(SSTableError::InvalidOptions("block_size must be > 0".into()));
        }
        if self.block_restart_interval == 0 {
            return Err(SSTableError::InvalidOptions(
                "block_restart_interval must be > 0".into(),
            ));
        }
        if self.index_block_size == 0 {
            return Err(SSTableError::InvalidOptions(
                "index_block_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for WriterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterOptions")
            .field("table_format", &self.table_format)
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("index_block_size", &self.index_block_size)
            .field("compression", &self.compression)
            .field(
                "filter_policy",
                &self.filter_policy.as_ref().map(|p| p.name().to_string()),
            )
            .field("comparator", &self.comparator.name())
            .finish()
    }
}

// ------------------------------------------------------------------------------------------------
// ReaderOptions
// ------------------------------------------------------------------------------------------------

/// Configuration of a [`Reader`](super::Reader).
#[derive(Clone)]
pub struct ReaderOptions {
    /// Must have the same name as the comparator the table was written with.
    pub comparator: Arc<dyn Comparator>,

    /// Used when the table carries a filter block of the same name.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// Shared block cache and the identity of this file within it.
    pub cache: Option<CacheOpts>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator),
            filter_policy: None,
            cache: None,
        }
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("comparator", &self.comparator.name())
            .field(
                "filter_policy",
                &self.filter_policy.as_ref().map(|p| p.name().to_string()),
            )
            .field("cache", &self.cache)
            .finish()
    }
}
