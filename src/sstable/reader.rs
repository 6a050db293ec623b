//! Table reader — opens a finished table and answers queries.
//!
//! Opening reads, in order:
//!
//! 1. The last 8 bytes: the magic number selects the [`TableFormat`]. An
//!    unknown magic is [`SSTableError::NotATable`].
//! 2. The footer, giving the meta-index and (top-level) index handles.
//! 3. The meta-index, mapping block names to handles.
//! 4. The properties block, which must be present.
//! 5. The index block, kept in memory for the reader's lifetime.
//! 6. The filter block, when the configured policy has the same name as
//!    the one the table was written with.
//!
//! Every other block is read on demand through [`TableInner::read_block`]:
//! bounds-checked against the footer, checksum-verified, decompressed, and
//! then shared through the block cache if one is configured.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, btree_map::Entry},
    sync::Arc,
};

use tracing::{debug, info, trace, warn};

use super::{
    Block, BlockHandle, ChecksumType, CompressionType, FILTER_BLOCK_PREFIX, Footer, Layout,
    PROPERTIES_BLOCK_NAME, Properties, RangeDelEncoding, RangeDelIter, ReaderOptions,
    SSTableError, TableFormat, TableIter,
    encoding_impls::decode_fragment_value,
    format::{BLOCK_TRAILER_LEN, MAGIC_LEN},
    iterator::decode_handle,
};
use crate::cache::CacheOpts;
use crate::encoding::decode_from_slice;
use crate::key::{BytewiseComparator, Comparator, InternalKey, InternalKeyComparator};
use crate::rangedel::Tombstone;
use crate::vfs::ReadableFile;

// ------------------------------------------------------------------------------------------------
// Block source
// ------------------------------------------------------------------------------------------------

/// Verified, decompressed block reads from one file.
pub(crate) struct BlockSource {
    file: Arc<dyn ReadableFile>,
    checksum: ChecksumType,
    /// Offset where the footer starts; no block may extend past it.
    data_end: u64,
    cache: Option<CacheOpts>,
}

impl BlockSource {
    /// Contents of the block at `handle`, without its trailer.
    pub(crate) fn read(&self, handle: BlockHandle) -> Result<Arc<[u8]>, SSTableError> {
        if let Some(c) = &self.cache {
            if let Some(bytes) = c.cache.get(c.cache_id, c.file_num, handle.offset) {
                trace!(offset = handle.offset, "block cache hit");
                return Ok(bytes);
            }
        }

        if handle.end_with_trailer() > self.data_end {
            return Err(SSTableError::CorruptBlock(format!(
                "block {handle} extends past the end of the data region at {}",
                self.data_end
            )));
        }
        let length = handle.length as usize;
        let mut buf = vec![0u8; length + BLOCK_TRAILER_LEN];
        self.file.read_at(handle.offset, &mut buf)?;

        let (data, trailer) = buf.split_at(length);
        let kind = trailer[0];
        let stored = u32::from_le_bytes([trailer[1], trailer[2], trailer[3], trailer[4]]);
        let computed = self.checksum.compute(data, kind);
        if stored != computed {
            warn!(offset = handle.offset, stored, computed, "block checksum mismatch");
            return Err(SSTableError::ChecksumMismatch {
                offset: handle.offset,
                stored,
                computed,
            });
        }

        let bytes: Arc<[u8]> = match CompressionType::try_from(kind)? {
            CompressionType::None => Arc::from(data),
            CompressionType::Snappy => snap::raw::Decoder::new()
                .decompress_vec(data)
                .map_err(|e| {
                    SSTableError::CorruptBlock(format!(
                        "snappy block at offset {}: {e}",
                        handle.offset
                    ))
                })?
                .into(),
        };

        if let Some(c) = &self.cache {
            c.cache
                .set(c.cache_id, c.file_num, handle.offset, Arc::clone(&bytes));
        }
        Ok(bytes)
    }
}

// ------------------------------------------------------------------------------------------------
// Shared reader state
// ------------------------------------------------------------------------------------------------

/// State shared by a [`Reader`] and every iterator it creates.
pub(crate) struct TableInner {
    pub(crate) blocks: BlockSource,
    pub(crate) opts: ReaderOptions,
    pub(crate) icmp: Arc<dyn Comparator>,
    pub(crate) footer: Footer,
    pub(crate) size: u64,
    pub(crate) meta_index: BTreeMap<String, BlockHandle>,
    pub(crate) properties_handle: BlockHandle,
    pub(crate) properties: Properties,
    /// The index block, or the top-level index of a two-level index.
    pub(crate) index: Block,
    pub(crate) filter: Option<Arc<[u8]>>,
}

impl TableInner {
    pub(crate) fn read_block(&self, handle: BlockHandle) -> Result<Block, SSTableError> {
        Block::new(self.blocks.read(handle)?)
    }
}

// ------------------------------------------------------------------------------------------------
// Reader
// ------------------------------------------------------------------------------------------------

/// Read-only handle to one table file.
///
/// Cheap to clone; clones share the index, filter, and file.
#[derive(Clone)]
pub struct Reader {
    inner: Arc<TableInner>,
}

impl Reader {
    /// Open a table, validating its footer, meta-index, and properties.
    ///
    /// # Errors
    ///
    /// - [`SSTableError::NotATable`] if the magic number is unknown.
    /// - [`SSTableError::CorruptFooter`] / [`SSTableError::CorruptMetaIndex`]
    ///   / other corruption errors for damaged structures.
    /// - [`SSTableError::InvalidOptions`] if the comparator differs from the
    ///   one the table was written with.
    pub fn open(file: Arc<dyn ReadableFile>, opts: ReaderOptions) -> Result<Self, SSTableError> {
        let size = file.size();
        if size < MAGIC_LEN as u64 {
            return Err(SSTableError::NotATable);
        }
        let mut magic = [0u8; MAGIC_LEN];
        file.read_at(size - MAGIC_LEN as u64, &mut magic)?;
        let format = TableFormat::from_magic(&magic).ok_or(SSTableError::NotATable)?;

        let footer_len = format.footer_len() as u64;
        if size < footer_len {
            return Err(SSTableError::CorruptFooter(format!(
                "file of {size} bytes is shorter than the {format} footer"
            )));
        }
        let data_end = size - footer_len;
        let mut footer_buf = vec![0u8; format.footer_len()];
        file.read_at(data_end, &mut footer_buf)?;
        let footer = Footer::decode(format, &footer_buf)?;
        for (name, handle) in [("meta-index", footer.meta_index), ("index", footer.index)] {
            if handle.end_with_trailer() > data_end {
                return Err(SSTableError::CorruptFooter(format!(
                    "{name} block {handle} extends past the footer at {data_end}"
                )));
            }
        }

        let blocks = BlockSource {
            file,
            checksum: footer.checksum,
            data_end,
            cache: opts.cache.clone(),
        };

        let meta_index = read_meta_index(&blocks, footer.meta_index, data_end)?;
        let properties_handle = *meta_index.get(PROPERTIES_BLOCK_NAME).ok_or_else(|| {
            SSTableError::CorruptMetaIndex("no properties block".to_string())
        })?;
        let (properties, _) = decode_from_slice::<Properties>(&blocks.read(properties_handle)?)?;
        if properties.comparator_name != opts.comparator.name() {
            return Err(SSTableError::InvalidOptions(format!(
                "table was written with comparator {:?}, reader uses {:?}",
                properties.comparator_name,
                opts.comparator.name()
            )));
        }

        let index = Block::new(blocks.read(footer.index)?)?;

        let filter = match &opts.filter_policy {
            Some(policy) => {
                let name = format!("{FILTER_BLOCK_PREFIX}{}", policy.name());
                match meta_index.get(&name) {
                    Some(handle) => Some(blocks.read(*handle)?),
                    None => {
                        debug!(filter = %name, "table has no matching filter block");
                        None
                    }
                }
            }
            None => None,
        };

        info!(
            size,
            %format,
            entries = properties.num_entries,
            data_blocks = properties.num_data_blocks,
            two_level_index = properties.is_two_level_index(),
            filter = filter.is_some(),
            "table opened"
        );

        let icmp: Arc<dyn Comparator> =
            Arc::new(InternalKeyComparator::new(Arc::clone(&opts.comparator)));
        Ok(Self {
            inner: Arc::new(TableInner {
                blocks,
                opts,
                icmp,
                footer,
                size,
                meta_index,
                properties_handle,
                properties,
                index,
                filter,
            }),
        })
    }

    /// Iterator over point entries with user keys in `[lower, upper)`.
    pub fn iter(&self, lower: Option<&[u8]>, upper: Option<&[u8]>) -> TableIter {
        TableIter::new(Arc::clone(&self.inner), lower, upper)
    }

    /// Newest point entry for `user_key`, deletions included.
    pub fn get(&self, user_key: &[u8]) -> Result<Option<(InternalKey, Vec<u8>)>, SSTableError> {
        if !self.may_contain(user_key) {
            trace!(key = %String::from_utf8_lossy(user_key), "filter excluded key");
            return Ok(None);
        }
        let mut iter = self.iter(None, None);
        if !iter.seek_ge(user_key)? {
            return Ok(None);
        }
        match iter.key() {
            Some(key)
                if self.inner.opts.comparator.compare(&key.user_key, user_key)
                    == Ordering::Equal =>
            {
                Ok(Some((key.clone(), iter.value().to_vec())))
            }
            _ => Ok(None),
        }
    }

    /// Whether the filter admits `user_key`. Always `true` without a
    /// usable filter.
    pub fn may_contain(&self, user_key: &[u8]) -> bool {
        match (&self.inner.filter, &self.inner.opts.filter_policy) {
            (Some(filter), Some(policy)) => policy.may_contain(filter, user_key),
            _ => true,
        }
    }

    /// Iterator over the table's range tombstones, or `None` if it has none.
    pub fn range_del_iter(&self) -> Result<Option<RangeDelIter>, SSTableError> {
        let encoding = self.inner.footer.format.range_del_encoding();
        let Some(handle) = self.inner.meta_index.get(encoding.block_name()) else {
            return Ok(None);
        };
        let block = self.inner.read_block(*handle)?;
        let ucmp = Arc::clone(&self.inner.opts.comparator);
        let block_cmp = match encoding {
            RangeDelEncoding::V1 => Arc::clone(&self.inner.icmp),
            RangeDelEncoding::V2 => Arc::clone(&ucmp),
        };

        let mut tombstones = Vec::new();
        let mut iter = block.iter(block_cmp);
        let mut more = iter.first()?;
        while more {
            match encoding {
                RangeDelEncoding::V1 => {
                    let start = InternalKey::decode(iter.key()).map_err(|e| {
                        SSTableError::CorruptBlock(format!("range-del key: {e}"))
                    })?;
                    tombstones.push(Tombstone::new(
                        start.user_key,
                        iter.value().to_vec(),
                        start.seq_num,
                    ));
                }
                RangeDelEncoding::V2 => {
                    let (end, seq_nums) = decode_fragment_value(iter.value())?;
                    for seq_num in seq_nums {
                        tombstones.push(Tombstone::new(iter.key().to_vec(), end.clone(), seq_num));
                    }
                }
            }
            more = iter.next()?;
        }
        debug!(tombstones = tombstones.len(), "range-del block loaded");
        Ok(Some(RangeDelIter::new(tombstones, ucmp)))
    }

    /// Positions of every block, found by walking the index blocks.
    pub fn layout(&self) -> Result<Layout, SSTableError> {
        let inner = &self.inner;
        let two_level = inner.properties.is_two_level_index();
        let mut data = Vec::new();
        let mut index = Vec::new();

        let mut top = inner.index.iter(Arc::new(BytewiseComparator));
        let mut more = top.first()?;
        while more {
            let handle = decode_handle(top.value())?;
            if two_level {
                index.push(handle);
                let partition = inner.read_block(handle)?;
                let mut iter = partition.iter(Arc::new(BytewiseComparator));
                let mut more_data = iter.first()?;
                while more_data {
                    data.push(decode_handle(iter.value())?);
                    more_data = iter.next()?;
                }
            } else {
                data.push(handle);
            }
            more = top.next()?;
        }

        let top_index = if two_level {
            Some(inner.footer.index)
        } else {
            index.push(inner.footer.index);
            None
        };
        let filter = inner
            .meta_index
            .iter()
            .find(|(name, _)| name.starts_with(FILTER_BLOCK_PREFIX))
            .map(|(name, handle)| (name.clone(), *handle));
        let footer_len = inner.footer.format.footer_len() as u64;

        Ok(Layout {
            format: inner.footer.format,
            data,
            index,
            top_index,
            filter,
            range_del: inner
                .meta_index
                .get(inner.footer.format.range_del_encoding().block_name())
                .copied(),
            properties: inner.properties_handle,
            meta_index: inner.footer.meta_index,
            footer: BlockHandle::new(inner.size - footer_len, footer_len),
        })
    }

    /// Table statistics.
    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    /// On-disk format.
    pub fn format(&self) -> TableFormat {
        self.inner.footer.format
    }

    /// File number from the cache options, if any.
    pub fn file_num(&self) -> Option<u64> {
        self.inner.opts.cache.as_ref().map(|c| c.file_num)
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// Block names and handles from the meta-index.
    pub fn meta_index(&self) -> &BTreeMap<String, BlockHandle> {
        &self.inner.meta_index
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("format", &self.inner.footer.format)
            .field("size", &self.inner.size)
            .field("opts", &self.inner.opts)
            .finish()
    }
}

/// Parse the meta-index block into a name → handle map.
fn read_meta_index(
    blocks: &BlockSource,
    handle: BlockHandle,
    data_end: u64,
) -> Result<BTreeMap<String, BlockHandle>, SSTableError> {
    let corrupt = |e: SSTableError| match e {
        SSTableError::CorruptBlock(msg) => SSTableError::CorruptMetaIndex(msg),
        other => other,
    };
    let block = Block::new(blocks.read(handle)?).map_err(corrupt)?;

    let mut entries = BTreeMap::new();
    let mut iter = block.iter(Arc::new(BytewiseComparator));
    let mut more = iter.first().map_err(corrupt)?;
    while more {
        let name = String::from_utf8(iter.key().to_vec())
            .map_err(|e| SSTableError::CorruptMetaIndex(format!("block name: {e}")))?;
        let block_handle = decode_handle(iter.value()).map_err(corrupt)?;
        if block_handle.end_with_trailer() > data_end {
            return Err(SSTableError::CorruptMetaIndex(format!(
                "{name} block {block_handle} extends past the footer at {data_end}"
            )));
        }
        match entries.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(block_handle);
            }
            Entry::Occupied(slot) => {
                return Err(SSTableError::CorruptMetaIndex(format!(
                    "duplicate block name {}",
                    slot.key()
                )));
            }
        }
        more = iter.next().map_err(corrupt)?;
    }
    Ok(entries)
}
