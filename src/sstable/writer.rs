//! Table writer — streams sorted entries into a complete table file.
//!
//! The [`Writer`] accepts internal keys in strictly increasing order and
//! writes every block exactly once, in file order:
//!
//! 1. Data blocks, flushed whenever the current block reaches
//!    `block_size`.
//! 2. The filter block, if a filter policy is configured.
//! 3. The index: one block, or the partitions of a two-level index
//!    followed by the top-level index.
//! 4. The range-deletion block, if any tombstones were added.
//! 5. The properties block.
//! 6. The meta-index block.
//! 7. The footer, then the file is synced.
//!
//! # Index separators
//!
//! When a data block is flushed its index entry is deferred until the next
//! key arrives, so that the separator can be shortened to a key between the
//! block's last key and the next block's first key. The final block uses the
//! shortest successor of its last key.
//!
//! # Range tombstones
//!
//! Keys of kind [`InternalKeyKind::RangeDelete`] carry the exclusive end key
//! as their value and go to the range-deletion block, never to data blocks.
//! With the v2 encoding tombstones must already be fragmented (see
//! [`Fragmenter`](crate::rangedel::Fragmenter)): each one either repeats the
//! previous span with a smaller sequence number or starts at or after the
//! previous end. Anything else fails with
//! [`SSTableError::UnfragmentedTombstone`]. The v1 encoding stores
//! tombstones as given and only checks that starts do not decrease.
//!
//! # Cache coherence
//!
//! When bound to a [`BlockCache`](crate::cache::BlockCache), the writer
//! deletes the cache entry at every offset before writing a block there, so
//! a reused file number never serves a block from an earlier build.
//!
//! # Failure
//!
//! Any error other than [`SSTableError::WriterClosed`] and
//! [`SSTableError::WriterFailed`] leaves the writer failed; every later call
//! returns [`SSTableError::WriterFailed`] and the file must be discarded.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    io::Write,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{debug, info, trace};

use super::{
    BlockBuilder, BlockHandle, CompressionType, FILTER_BLOCK_PREFIX, FilterWriter, Footer,
    PROPERTIES_BLOCK_NAME, Properties, RangeDelEncoding, SSTableError, WriterOptions,
    encoding_impls::encode_fragment_value, format::BLOCK_TRAILER_LEN,
};
use crate::cache::CacheOpts;
use crate::encoding::encode_to_vec;
use crate::key::{Comparator, InternalKey, InternalKeyComparator, InternalKeyKind, SEQ_NUM_MAX};
use crate::rangedel::{Fragment, Tombstone};
use crate::vfs::WritableFile;

const TRAILER: u64 = BLOCK_TRAILER_LEN as u64;

// ------------------------------------------------------------------------------------------------
// WriterMetadata
// ------------------------------------------------------------------------------------------------

/// Key and sequence-number bounds of a finished table, gathered while
/// writing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterMetadata {
    /// Smallest point key.
    pub smallest_point: Option<InternalKey>,
    /// Largest point key.
    pub largest_point: Option<InternalKey>,
    /// Smallest range tombstone start.
    pub smallest_range: Option<InternalKey>,
    /// Range-delete sentinel at the largest tombstone end.
    pub largest_range: Option<InternalKey>,
    /// Smallest sequence number over points and tombstones; zero if empty.
    pub smallest_seq_num: u64,
    /// Largest sequence number over points and tombstones; zero if empty.
    pub largest_seq_num: u64,
    /// File size in bytes.
    pub size: u64,
}

impl WriterMetadata {
    /// Whether any point key was written.
    pub fn has_point_keys(&self) -> bool {
        self.smallest_point.is_some()
    }

    /// Whether any range tombstone was written.
    pub fn has_range_keys(&self) -> bool {
        self.smallest_range.is_some()
    }
}

// ------------------------------------------------------------------------------------------------
// Range-deletion block builder
// ------------------------------------------------------------------------------------------------

struct RangeDelBuilder {
    encoding: RangeDelEncoding,
    block: BlockBuilder,
    last: Option<Tombstone>,
    fragment: Option<Fragment>,
}

impl RangeDelBuilder {
    fn new(encoding: RangeDelEncoding) -> Self {
        Self {
            encoding,
            block: BlockBuilder::new(1),
            last: None,
            fragment: None,
        }
    }

    fn add(&mut self, cmp: &dyn Comparator, tombstone: Tombstone) -> Result<(), SSTableError> {
        match self.encoding {
            RangeDelEncoding::V1 => {
                if let Some(last) = &self.last {
                    if cmp.compare(&tombstone.start, &last.start) == Ordering::Less {
                        return Err(SSTableError::KeysOutOfOrder {
                            previous: last.start_key().to_string(),
                            key: tombstone.start_key().to_string(),
                        });
                    }
                }
                self.block
                    .add(&tombstone.start_key().encode(), &tombstone.end);
            }
            RangeDelEncoding::V2 => {
                let same_span = self.fragment.as_ref().is_some_and(|f| {
                    cmp.compare(&f.start, &tombstone.start) == Ordering::Equal
                        && cmp.compare(&f.end, &tombstone.end) == Ordering::Equal
                });
                if let Some(last) = &self.last {
                    let fragmented = if same_span {
                        tombstone.seq_num < last.seq_num
                    } else {
                        cmp.compare(&tombstone.start, &last.end) != Ordering::Less
                    };
                    if !fragmented {
                        return Err(SSTableError::UnfragmentedTombstone(format!(
                            "{tombstone} after {last}"
                        )));
                    }
                }
                match self.fragment.as_mut() {
                    Some(fragment) if same_span => fragment.seq_nums.push(tombstone.seq_num),
                    _ => {
                        self.flush_fragment()?;
                        self.fragment = Some(Fragment {
                            start: tombstone.start.clone(),
                            end: tombstone.end.clone(),
                            seq_nums: vec![tombstone.seq_num],
                        });
                    }
                }
            }
        }
        self.last = Some(tombstone);
        Ok(())
    }

    fn flush_fragment(&mut self) -> Result<(), SSTableError> {
        if let Some(fragment) = self.fragment.take() {
            let mut value = Vec::new();
            encode_fragment_value(&fragment, &mut value)?;
            self.block.add(&fragment.start, &value);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<Vec<u8>>, SSTableError> {
        self.flush_fragment()?;
        if self.block.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.block.finish()))
    }
}

// ------------------------------------------------------------------------------------------------
// Writer
// ------------------------------------------------------------------------------------------------

enum WriterState {
    Open,
    Closed(WriterMetadata),
    Failed,
}

/// Builds one table file in a single streaming pass.
///
/// # Example
///
/// ```rust,ignore
/// let mut w = Writer::new(fs.create("000001.sst")?, WriterOptions::default())?;
/// w.set(b"a", b"1")?;
/// w.delete_range(b"b", b"d")?;
/// w.close()?;
/// let meta = w.metadata()?;
/// ```
pub struct Writer {
    file: Box<dyn WritableFile>,
    opts: WriterOptions,
    cache: Option<CacheOpts>,
    icmp: InternalKeyComparator,
    state: WriterState,
    offset: u64,

    data_block: BlockBuilder,
    pending_handle: Option<BlockHandle>,
    last_point: Option<Vec<u8>>,

    index_block: BlockBuilder,
    /// Finished index partitions awaiting close: `(separator, block bytes)`.
    index_partitions: Vec<(Vec<u8>, Vec<u8>)>,

    filter: Option<Box<dyn FilterWriter>>,
    range_dels: RangeDelBuilder,

    props: Properties,
    meta: WriterMetadata,
    seq_bounds: Option<(u64, u64)>,
}

impl Writer {
    /// Create a writer over a freshly created file.
    pub fn new(file: Box<dyn WritableFile>, opts: WriterOptions) -> Result<Self, SSTableError> {
        opts.validate()?;
        let icmp = InternalKeyComparator::new(Arc::clone(&opts.comparator));
        let filter = opts.filter_policy.as_ref().map(|p| p.new_writer());
        let range_dels = RangeDelBuilder::new(opts.table_format.range_del_encoding());
        Ok(Self {
            file,
            data_block: BlockBuilder::new(opts.block_restart_interval),
            index_block: BlockBuilder::new(1),
            opts,
            cache: None,
            icmp,
            state: WriterState::Open,
            offset: 0,
            pending_handle: None,
            last_point: None,
            index_partitions: Vec::new(),
            filter,
            range_dels,
            props: Properties::default(),
            meta: WriterMetadata::default(),
            seq_bounds: None,
        })
    }

    /// Create a writer that keeps `cache` coherent for the file identity in
    /// `cache_opts`.
    pub fn with_cache(
        file: Box<dyn WritableFile>,
        opts: WriterOptions,
        cache_opts: CacheOpts,
    ) -> Result<Self, SSTableError> {
        let mut writer = Self::new(file, opts)?;
        writer.cache = Some(cache_opts);
        Ok(writer)
    }

    /// Add an entry. Point keys must be strictly increasing; a key of kind
    /// [`InternalKeyKind::RangeDelete`] is a tombstone whose `value` is the
    /// exclusive end key.
    pub fn add(&mut self, key: &InternalKey, value: &[u8]) -> Result<(), SSTableError> {
        self.check_open()?;
        let result = check_key(key).and_then(|()| {
            if key.kind == InternalKeyKind::RangeDelete {
                self.add_tombstone_inner(key, value)
            } else {
                self.add_point(key, value)
            }
        });
        self.fail_on_error(result)
    }

    /// Add `user_key → value` at sequence number zero.
    pub fn set(&mut self, user_key: &[u8], value: &[u8]) -> Result<(), SSTableError> {
        self.add(&InternalKey::new(user_key, 0, InternalKeyKind::Set), value)
    }

    /// Add a point deletion of `user_key` at sequence number zero.
    pub fn delete(&mut self, user_key: &[u8]) -> Result<(), SSTableError> {
        self.add(&InternalKey::new(user_key, 0, InternalKeyKind::Delete), &[])
    }

    /// Add the tombstone `[start, end)` at sequence number zero.
    pub fn delete_range(&mut self, start: &[u8], end: &[u8]) -> Result<(), SSTableError> {
        self.add(
            &InternalKey::new(start, 0, InternalKeyKind::RangeDelete),
            end,
        )
    }

    /// Add a tombstone.
    pub fn add_tombstone(&mut self, tombstone: &Tombstone) -> Result<(), SSTableError> {
        self.add(&tombstone.start_key(), &tombstone.end)
    }

    /// Bytes written so far plus the buffered blocks.
    pub fn estimated_size(&self) -> u64 {
        let partitions: usize = self.index_partitions.iter().map(|(_, b)| b.len()).sum();
        self.offset
            + (self.data_block.estimated_size()
                + self.index_block.estimated_size()
                + partitions) as u64
    }

    /// Write the remaining blocks and the footer, then sync the file.
    pub fn close(&mut self) -> Result<(), SSTableError> {
        self.check_open()?;
        let result = self.close_inner();
        self.fail_on_error(result)
    }

    /// Bounds of the finished table. Only available after [`close`](Self::close)
    /// succeeded.
    pub fn metadata(&self) -> Result<&WriterMetadata, SSTableError> {
        match &self.state {
            WriterState::Closed(meta) => Ok(meta),
            _ => Err(SSTableError::MetadataUnavailable),
        }
    }

    // --------------------------------------------------------------------------------------------
    // State
    // --------------------------------------------------------------------------------------------

    fn check_open(&self) -> Result<(), SSTableError> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Closed(_) => Err(SSTableError::WriterClosed),
            WriterState::Failed => Err(SSTableError::WriterFailed),
        }
    }

    fn fail_on_error<T>(&mut self, result: Result<T, SSTableError>) -> Result<T, SSTableError> {
        if let Err(e) = &result {
            debug!(error = %e, "writer failed");
            self.state = WriterState::Failed;
        }
        result
    }

    fn track_seq_num(&mut self, seq_num: u64) {
        self.seq_bounds = Some(match self.seq_bounds {
            Some((lo, hi)) => (lo.min(seq_num), hi.max(seq_num)),
            None => (seq_num, seq_num),
        });
    }

    // --------------------------------------------------------------------------------------------
    // Point entries
    // --------------------------------------------------------------------------------------------

    fn add_point(&mut self, key: &InternalKey, value: &[u8]) -> Result<(), SSTableError> {
        let encoded = key.encode();
        if let Some(last) = &self.last_point {
            if self.icmp.compare(last, &encoded) != Ordering::Less {
                return Err(SSTableError::KeysOutOfOrder {
                    previous: InternalKey::decode(last)
                        .map(|k| k.to_string())
                        .unwrap_or_default(),
                    key: key.to_string(),
                });
            }
        }

        if let Some(handle) = self.pending_handle.take() {
            let separator = match &self.last_point {
                Some(last) => self.icmp.separator(last, &encoded),
                None => encoded.clone(),
            };
            self.add_index_entry(separator, handle)?;
        }

        if let Some(filter) = self.filter.as_mut() {
            filter.add(&key.user_key);
        }
        self.data_block.add(&encoded, value);
        trace!(%key, value_len = value.len(), "point added");

        self.props.num_entries += 1;
        if key.kind == InternalKeyKind::Delete {
            self.props.num_deletions += 1;
        }
        self.props.raw_key_size += encoded.len() as u64;
        self.props.raw_value_size += value.len() as u64;
        if self.meta.smallest_point.is_none() {
            self.meta.smallest_point = Some(key.clone());
        }
        self.meta.largest_point = Some(key.clone());
        self.track_seq_num(key.seq_num);
        self.last_point = Some(encoded);

        if self.data_block.estimated_size() >= self.opts.block_size {
            self.flush_data_block()?;
        }
        Ok(())
    }

    fn flush_data_block(&mut self) -> Result<(), SSTableError> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        let entries = self.data_block.entry_count();
        let raw = self.data_block.finish();
        let handle = self.write_block(&raw, self.opts.compression)?;
        self.props.num_data_blocks += 1;
        self.props.data_size += handle.length + TRAILER;
        self.pending_handle = Some(handle);
        debug!(offset = handle.offset, length = handle.length, entries, "data block flushed");
        Ok(())
    }

    fn add_index_entry(
        &mut self,
        separator: Vec<u8>,
        handle: BlockHandle,
    ) -> Result<(), SSTableError> {
        let value = encode_to_vec(&handle)?;
        if self.opts.table_format.supports_two_level_index()
            && !self.index_block.is_empty()
            && self.index_block.estimated_size() + separator.len() + value.len()
                > self.opts.index_block_size
        {
            self.finish_index_partition();
        }
        self.index_block.add(&separator, &value);
        Ok(())
    }

    fn finish_index_partition(&mut self) {
        if self.index_block.is_empty() {
            return;
        }
        let separator = self.index_block.last_key().to_vec();
        let raw = self.index_block.finish();
        trace!(
            partition = self.index_partitions.len(),
            len = raw.len(),
            "index partition finished"
        );
        self.index_partitions.push((separator, raw));
    }

    // --------------------------------------------------------------------------------------------
    // Range tombstones
    // --------------------------------------------------------------------------------------------

    fn add_tombstone_inner(&mut self, start: &InternalKey, end: &[u8]) -> Result<(), SSTableError> {
        let tombstone = Tombstone::new(start.user_key.clone(), end.to_vec(), start.seq_num);
        let ucmp = Arc::clone(&self.opts.comparator);
        if tombstone.is_empty(ucmp.as_ref()) {
            trace!(%tombstone, "skipping empty range tombstone");
            return Ok(());
        }

        let start_key = tombstone.start_key();
        let seq_num = tombstone.seq_num;
        let end_key = tombstone.end_key();
        self.range_dels.add(ucmp.as_ref(), tombstone)?;
        trace!(start = %start_key, end = %end_key, "range tombstone added");

        self.props.num_range_deletions += 1;
        self.track_seq_num(seq_num);
        let smaller = match &self.meta.smallest_range {
            Some(cur) => self.icmp.compare_keys(&start_key, cur) == Ordering::Less,
            None => true,
        };
        if smaller {
            self.meta.smallest_range = Some(start_key);
        }
        let larger = match &self.meta.largest_range {
            Some(cur) => ucmp.compare(&end_key.user_key, &cur.user_key) == Ordering::Greater,
            None => true,
        };
        if larger {
            self.meta.largest_range = Some(end_key);
        }
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Close
    // --------------------------------------------------------------------------------------------

    fn close_inner(&mut self) -> Result<(), SSTableError> {
        self.flush_data_block()?;
        if let Some(handle) = self.pending_handle.take() {
            let successor = match &self.last_point {
                Some(last) => self.icmp.successor(last),
                None => Vec::new(),
            };
            self.add_index_entry(successor, handle)?;
        }

        let mut meta_entries: BTreeMap<String, BlockHandle> = BTreeMap::new();

        if let Some(mut filter) = self.filter.take() {
            let bytes = filter.finish()?;
            let handle = self.write_block(&bytes, CompressionType::None)?;
            let name = self
                .opts
                .filter_policy
                .as_ref()
                .map(|p| p.name().to_string())
                .unwrap_or_default();
            meta_entries.insert(format!("{FILTER_BLOCK_PREFIX}{name}"), handle);
            self.props.filter_size = handle.length + TRAILER;
            self.props.filter_policy_name = Some(name);
        }

        let index_handle = self.write_index()?;

        if let Some(raw) = self.range_dels.finish()? {
            let handle = self.write_block(&raw, CompressionType::None)?;
            meta_entries.insert(self.range_dels.encoding.block_name().to_string(), handle);
        }

        let (smallest_seq, largest_seq) = self.seq_bounds.unwrap_or((0, 0));
        self.props.format_version = self.opts.table_format.version();
        self.props.comparator_name = self.opts.comparator.name().to_string();
        self.props.compression_name = self.opts.compression.name().to_string();
        self.props.smallest_point_key =
            self.meta.smallest_point.as_ref().map(|k| k.user_key.clone());
        self.props.largest_point_key = self.meta.largest_point.as_ref().map(|k| k.user_key.clone());
        self.props.smallest_seq_num = smallest_seq;
        self.props.largest_seq_num = largest_seq;
        self.props.creation_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let props = encode_to_vec(&self.props)?;
        let props_handle = self.write_block(&props, CompressionType::None)?;
        meta_entries.insert(PROPERTIES_BLOCK_NAME.to_string(), props_handle);

        let mut meta_block = BlockBuilder::new(1);
        for (name, handle) in &meta_entries {
            meta_block.add(name.as_bytes(), &encode_to_vec(handle)?);
        }
        let meta_index_handle = self.write_block(&meta_block.finish(), CompressionType::None)?;

        let footer = Footer::new(self.opts.table_format, meta_index_handle, index_handle).encode()?;
        self.invalidate_cache(self.offset);
        self.file.write_all(&footer)?;
        self.offset += footer.len() as u64;
        self.file.sync()?;

        let mut meta = std::mem::take(&mut self.meta);
        meta.smallest_seq_num = smallest_seq;
        meta.largest_seq_num = largest_seq;
        meta.size = self.offset;
        info!(
            size = meta.size,
            entries = self.props.num_entries,
            range_deletions = self.props.num_range_deletions,
            data_blocks = self.props.num_data_blocks,
            index_partitions = self.props.index_partitions,
            format = %self.opts.table_format,
            "table written"
        );
        self.state = WriterState::Closed(meta);
        Ok(())
    }

    /// Write the single index block, or every partition plus the top-level
    /// index. Returns the handle the footer points at.
    fn write_index(&mut self) -> Result<BlockHandle, SSTableError> {
        let compression = self.opts.compression;
        if self.index_partitions.is_empty() {
            let raw = self.index_block.finish();
            let handle = self.write_block(&raw, compression)?;
            self.props.index_size = handle.length + TRAILER;
            return Ok(handle);
        }

        self.finish_index_partition();
        let partitions = std::mem::take(&mut self.index_partitions);
        let mut top = BlockBuilder::new(1);
        for (separator, raw) in &partitions {
            let handle = self.write_block(raw, compression)?;
            self.props.index_size += handle.length + TRAILER;
            top.add(separator, &encode_to_vec(&handle)?);
        }
        self.props.index_partitions = partitions.len() as u64;

        let handle = self.write_block(&top.finish(), compression)?;
        self.props.top_level_index_size = handle.length + TRAILER;
        debug!(partitions = partitions.len(), "two-level index written");
        Ok(handle)
    }

    // --------------------------------------------------------------------------------------------
    // Block output
    // --------------------------------------------------------------------------------------------

    /// Compress, checksum, and append one block plus its trailer.
    fn write_block(
        &mut self,
        raw: &[u8],
        compression: CompressionType,
    ) -> Result<BlockHandle, SSTableError> {
        let compressed = compress(raw, compression);
        let (data, kind) = match &compressed {
            Some(c) => (c.as_slice(), CompressionType::Snappy),
            None => (raw, CompressionType::None),
        };
        let checksum = self
            .opts
            .table_format
            .checksum_type()
            .compute(data, kind as u8);
        let mut trailer = [0u8; BLOCK_TRAILER_LEN];
        trailer[0] = kind as u8;
        trailer[1..].copy_from_slice(&checksum.to_le_bytes());

        let handle = BlockHandle::new(self.offset, data.len() as u64);
        self.invalidate_cache(handle.offset);
        self.file.write_all(data)?;
        self.file.write_all(&trailer)?;
        self.offset += handle.length + TRAILER;
        Ok(handle)
    }

    fn invalidate_cache(&self, offset: u64) {
        if let Some(c) = &self.cache {
            c.cache.delete(c.cache_id, c.file_num, offset);
        }
    }
}

/// Reject keys whose trailer cannot hold them, and the seek sentinel kind.
fn check_key(key: &InternalKey) -> Result<(), SSTableError> {
    if key.seq_num > SEQ_NUM_MAX {
        return Err(SSTableError::InvalidKey(format!(
            "{}: sequence number {} above {SEQ_NUM_MAX}",
            String::from_utf8_lossy(&key.user_key),
            key.seq_num
        )));
    }
    if key.kind == InternalKeyKind::Max {
        return Err(SSTableError::InvalidKey(format!("{key}: seek sentinel kind")));
    }
    Ok(())
}

/// Snappy-compress `raw`, keeping the result only if it saves at least an
/// eighth of the size.
fn compress(raw: &[u8], compression: CompressionType) -> Option<Vec<u8>> {
    match compression {
        CompressionType::None => None,
        CompressionType::Snappy => match snap::raw::Encoder::new().compress_vec(raw) {
            Ok(c) if c.len() < raw.len() - raw.len() / 8 => Some(c),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "snappy compression failed, storing block uncompressed");
                None
            }
        },
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            WriterState::Open => "open",
            WriterState::Closed(_) => "closed",
            WriterState::Failed => "failed",
        };
        f.debug_struct("Writer")
            .field("state", &state)
            .field("offset", &self.offset)
            .field("opts", &self.opts)
            .finish()
    }
}
