//! # aeternus-sstable
//!
//! Immutable, block-structured **sorted string tables** for LSM-tree
//! storage engines: a streaming writer, a reader with bounded bidirectional
//! iteration and point lookups, range-deletion tombstones, bloom filters,
//! and a shared block cache.
//!
//! ## Quick Start
//!
//! ```rust
//! use aeternus_sstable::sstable::{Reader, ReaderOptions, Writer, WriterOptions};
//! use aeternus_sstable::vfs::{FileSystem, MemFs};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = MemFs::new();
//!
//! // Write: keys in increasing order, then close.
//! let mut writer = Writer::new(fs.create("000001.sst")?, WriterOptions::default())?;
//! writer.set(b"apple", b"red")?;
//! writer.set(b"banana", b"yellow")?;
//! writer.delete_range(b"c", b"d")?;
//! writer.close()?;
//!
//! // Read
//! let reader = Reader::open(fs.open("000001.sst")?, ReaderOptions::default())?;
//! let (_, value) = reader.get(b"apple")?.expect("apple is present");
//! assert_eq!(value, b"red");
//!
//! // Scan
//! let mut iter = reader.iter(None, None);
//! let keys: Vec<_> = iter
//!     .entries()
//!     .map(|entry| entry.map(|(key, _)| key.user_key))
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(keys, [b"apple".to_vec(), b"banana".to_vec()]);
//!
//! // Tombstones
//! let tombstones = reader.range_del_iter()?.expect("one tombstone");
//! assert_eq!(tombstones.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`sstable`] — table format, [`Writer`], [`Reader`], iterators.
//! - [`key`] — internal keys and comparators.
//! - [`rangedel`] — range tombstones and the fragmenter.
//! - [`cache`] — the shared [`BlockCache`].
//! - [`vfs`] — file abstractions with in-memory and OS implementations.
//! - [`encoding`] — the binary codec used by on-disk structures.
//!
//! ## Features
//!
//! - **Two formats** — LevelDB-compatible tables and the v2 format with
//!   fragmented range tombstones and partitioned indexes.
//! - **Snappy compression** — per block, kept only when it pays off.
//! - **Checksums** — every block is verified before use.
//! - **Bloom filters** — fast negative point lookups.

pub mod cache;
pub mod encoding;
pub mod key;
pub mod rangedel;
pub mod sstable;
pub mod vfs;

pub use cache::{BlockCache, CacheOpts};
pub use key::{BytewiseComparator, Comparator, InternalKey, InternalKeyKind};
pub use rangedel::{Fragment, Fragmenter, Tombstone};
pub use sstable::{
    BloomFilterPolicy, CompressionType, Reader, ReaderOptions, SSTableError, TableFormat,
    TableIter, Writer, WriterMetadata, WriterOptions,
};
pub use vfs::{FileSystem, MemFs, OsFs};
