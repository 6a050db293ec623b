//! Sorted String Table (SSTable) Module
//!
//! This module implements **immutable**, **block-structured** sorted table
//! files: the writer streams sorted internal keys into prefix-compressed
//! blocks in a single pass, and the reader serves bounded bidirectional
//! iteration, point lookups, and range-deletion tombstones from them.
//!
//! # On-disk layout
//!
//! ```text
//! [DATA_BLOCK][TRAILER]
//! [DATA_BLOCK][TRAILER]
//! ...
//! [FILTER_BLOCK][TRAILER]                    (optional)
//! [INDEX_BLOCK][TRAILER]...                  (one, or the partitions of a two-level index)
//! [TOP_INDEX_BLOCK][TRAILER]                 (two-level index only)
//! [RANGE_DEL_BLOCK][TRAILER]                 (optional)
//! [PROPERTIES_BLOCK][TRAILER]
//! [METAINDEX_BLOCK][TRAILER]
//! [FOOTER]
//!
//! TRAILER = [COMPRESSION_U8][CHECKSUM_U32_LE]
//! ```
//!
//! - **Data blocks** — [`block`] entries mapping encoded internal keys to values.
//! - **Filter block** — opaque bytes from a [`FilterPolicy`] over point user keys.
//! - **Index block** — separator key → data [`BlockHandle`]. Each separator
//!   is `>=` every key of its block and `<` every key of the next.
//! - **Top index block** — separator key → index-partition handle.
//! - **Range-deletion block** — tombstones, in the encoding chosen by the
//!   [`TableFormat`].
//! - **Properties block** — [`Properties`], encoded with [`crate::encoding`].
//! - **Metaindex block** — block name → handle for filter, range-del, and
//!   properties blocks.
//! - **Footer** — see [`format`]; handles of the meta-index and the (top)
//!   index plus the magic number.
//!
//! The checksum covers the block bytes and the compression byte. Its
//! algorithm depends on the [`TableFormat`].
//!
//! # Sub-modules
//!
//! - [`writer`] — [`Writer`] builds a table from sorted input.
//! - [`reader`] — [`Reader`] opens a table and answers queries.
//! - [`iterator`] — [`TableIter`] and [`RangeDelIter`].
//! - [`block`] — the block codec shared by every block type.
//!
//! # Concurrency model
//!
//! - A [`Writer`] is a single-threaded state machine over one file.
//! - A [`Reader`] is `Send + Sync`; each iterator owns its position and may
//!   run on its own thread.
//! - The only shared mutable state is the [`BlockCache`](crate::cache::BlockCache).

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod block;
pub mod filter;
pub mod format;
pub mod iterator;
pub mod layout;
pub mod options;
pub mod properties;
pub mod reader;
pub mod writer;

mod encoding_impls;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Re-exports — public API surface
// ------------------------------------------------------------------------------------------------

pub use block::{Block, BlockBuilder, BlockIter};
pub use filter::{BloomFilterPolicy, FilterPolicy, FilterWriter};
pub use format::{ChecksumType, CompressionType, Footer, RangeDelEncoding, TableFormat};
pub use iterator::{Entries, RangeDelIter, TableIter};
pub use layout::Layout;
pub use options::{ReaderOptions, WriterOptions};
pub use properties::Properties;
pub use reader::Reader;
pub use writer::{Writer, WriterMetadata};

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{fmt, io};

use crate::encoding::EncodingError;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Meta-index name of the properties block.
pub const PROPERTIES_BLOCK_NAME: &str = "properties";

/// Meta-index name prefix of the filter block.
pub const FILTER_BLOCK_PREFIX: &str = "filter.";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by table writers, readers, and iterators.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A structure read from the file failed to decode.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A key was not strictly greater than the previous one.
    #[error("keys must be added in strictly increasing order: {key} after {previous}")]
    KeysOutOfOrder {
        /// The previously added key.
        previous: String,
        /// The rejected key.
        key: String,
    },

    /// A range tombstone overlaps the previous one without sharing its span.
    #[error("range tombstone {0} is not fragmented")]
    UnfragmentedTombstone(String),

    /// The writer was already closed.
    #[error("writer is closed")]
    WriterClosed,

    /// An earlier error left the writer unusable.
    #[error("writer failed earlier and cannot be used")]
    WriterFailed,

    /// Metadata was requested before a successful close.
    #[error("metadata is only available after a successful close")]
    MetadataUnavailable,

    /// Options failed validation or do not match the table.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The file does not end with a known magic number.
    #[error("not a table: bad magic number")]
    NotATable,

    /// The footer could not be parsed.
    #[error("corrupt footer: {0}")]
    CorruptFooter(String),

    /// The meta-index block could not be parsed.
    #[error("corrupt meta-index: {0}")]
    CorruptMetaIndex(String),

    /// A block is truncated or internally inconsistent.
    #[error("corrupt block: {0}")]
    CorruptBlock(String),

    /// A block trailer checksum did not match its contents.
    #[error(
        "checksum mismatch in block at offset {offset}: \
         stored {stored:#010x}, computed {computed:#010x}"
    )]
    ChecksumMismatch {
        /// Offset of the block.
        offset: u64,
        /// Checksum stored in the trailer.
        stored: u32,
        /// Checksum computed over the block.
        computed: u32,
    },

    /// The key cannot be stored: its sequence number exceeds
    /// [`SEQ_NUM_MAX`](crate::key::SEQ_NUM_MAX) or its kind is the seek sentinel.
    #[error("invalid key {0}")]
    InvalidKey(String),

    /// The footer names a version or checksum this crate cannot read.
    #[error("unsupported table format: {0}")]
    UnsupportedFormat(String),

    /// The filter policy failed to build a filter.
    #[error("filter error: {0}")]
    Filter(String),
}

impl SSTableError {
    /// Whether the error reports damaged or foreign file contents.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SSTableError::Encoding(_)
                | SSTableError::NotATable
                | SSTableError::CorruptFooter(_)
                | SSTableError::CorruptMetaIndex(_)
                | SSTableError::CorruptBlock(_)
                | SSTableError::ChecksumMismatch { .. }
                | SSTableError::UnsupportedFormat(_)
        )
    }

    /// Whether the error reports a caller contract violation.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            SSTableError::KeysOutOfOrder { .. }
                | SSTableError::UnfragmentedTombstone(_)
                | SSTableError::WriterClosed
                | SSTableError::WriterFailed
                | SSTableError::MetadataUnavailable
                | SSTableError::InvalidOptions(_)
                | SSTableError::InvalidKey(_)
        )
    }
}

// ------------------------------------------------------------------------------------------------
// BlockHandle
// ------------------------------------------------------------------------------------------------

/// Location of a block: `length` excludes the 5-byte trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHandle {
    /// Offset of the first byte of the block.
    pub offset: u64,
    /// Length of the block contents.
    pub length: u64,
}

impl BlockHandle {
    /// Create a handle.
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Offset just past the block's trailer.
    pub fn end_with_trailer(&self) -> u64 {
        self.offset
            .saturating_add(self.length)
            .saturating_add(format::BLOCK_TRAILER_LEN as u64)
    }
}

impl fmt::Display for BlockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.offset, self.length)
    }
}
