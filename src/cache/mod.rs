//! Shared block cache.
//!
//! A [`BlockCache`] maps `(cache id, file number, block offset)` to the
//! verified, decompressed bytes of a block. One cache is typically shared by
//! every reader and writer in a process; the cache id partitions it between
//! independent users (for example, two stores that both number their files
//! from 1).
//!
//! # Coherence
//!
//! Table writers call [`BlockCache::delete`] for every offset they write,
//! before writing it. File numbers may be reused by successive builds into
//! the same slot, so a block cached from an earlier build must never be
//! served once the file has been rewritten.
//!
//! # Eviction
//!
//! Capacity is measured in bytes of cached payload. Inserting past capacity
//! evicts least-recently-used entries. A block larger than the whole
//! capacity is not cached.


use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::{debug, trace};

// ------------------------------------------------------------------------------------------------
// Keys and options
// ------------------------------------------------------------------------------------------------

/// Address of one cached block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Partition of the cache owned by one user.
    pub cache_id: u64,
    /// File the block belongs to.
    pub file_num: u64,
    /// Offset of the block inside the file.
    pub offset: u64,
}

/// Binds a table reader or writer to a cache identity.
#[derive(Clone)]
pub struct CacheOpts {
    /// The shared cache.
    pub cache: Arc<BlockCache>,
    /// Partition within the cache, from [`BlockCache::new_id`].
    pub cache_id: u64,
    /// Number of the file being read or written.
    pub file_num: u64,
}

impl CacheOpts {
    pub(crate) fn key(&self, offset: u64) -> CacheKey {
        CacheKey {
            cache_id: self.cache_id,
            file_num: self.file_num,
            offset,
        }
    }
}

impl fmt::Debug for CacheOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOpts")
            .field("cache_id", &self.cache_id)
            .field("file_num", &self.file_num)
            .finish()
    }
}

// ------------------------------------------------------------------------------------------------
// BlockCache
// ------------------------------------------------------------------------------------------------

struct Slot {
    bytes: Arc<[u8]>,
    tick: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Slot>,
    /// Recency order: smallest tick is the least recently used.
    lru: BTreeMap<u64, CacheKey>,
    next_tick: u64,
    size: usize,
}

impl Inner {
    fn touch(&mut self, key: CacheKey) -> Option<Arc<[u8]>> {
        let tick = self.next_tick;
        let slot = self.entries.get_mut(&key)?;
        self.lru.remove(&slot.tick);
        slot.tick = tick;
        self.lru.insert(tick, key);
        self.next_tick += 1;
        Some(Arc::clone(&slot.bytes))
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.lru.remove(&slot.tick);
                self.size -= slot.bytes.len();
                true
            }
            None => false,
        }
    }
}

/// Thread-safe, capacity-bounded LRU cache of block bytes.
pub struct BlockCache {
    capacity: usize,
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlockCache {
    /// Create a cache holding at most `capacity` bytes of block payload.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Allocate a fresh cache id.
    pub fn new_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up a block, marking it most recently used.
    pub fn get(&self, cache_id: u64, file_num: u64, offset: u64) -> Option<Arc<[u8]>> {
        let key = CacheKey {
            cache_id,
            file_num,
            offset,
        };
        let found = self.lock().touch(key);
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Insert or replace a block.
    pub fn set(&self, cache_id: u64, file_num: u64, offset: u64, bytes: Arc<[u8]>) {
        let key = CacheKey {
            cache_id,
            file_num,
            offset,
        };
        let mut inner = self.lock();
        inner.remove(&key);
        if bytes.len() > self.capacity {
            trace!(len = bytes.len(), "block larger than cache capacity, not cached");
            return;
        }

        while inner.size + bytes.len() > self.capacity {
            let Some((_, victim)) = inner.lru.pop_first() else {
                break;
            };
            if let Some(slot) = inner.entries.remove(&victim) {
                inner.size -= slot.bytes.len();
            }
        }

        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.size += bytes.len();
        inner.lru.insert(tick, key);
        inner.entries.insert(key, Slot { bytes, tick });
    }

    /// Drop a single block, if cached.
    pub fn delete(&self, cache_id: u64, file_num: u64, offset: u64) {
        let key = CacheKey {
            cache_id,
            file_num,
            offset,
        };
        if self.lock().remove(&key) {
            trace!(cache_id, file_num, offset, "cache entry invalidated");
        }
    }

    /// Drop every block of one file.
    pub fn evict_file(&self, cache_id: u64, file_num: u64) {
        let mut inner = self.lock();
        let victims: Vec<CacheKey> = inner
            .entries
            .keys()
            .filter(|k| k.cache_id == cache_id && k.file_num == file_num)
            .copied()
            .collect();
        for key in &victims {
            inner.remove(key);
        }
        debug!(cache_id, file_num, evicted = victims.len(), "file evicted from cache");
    }

    /// Bytes of payload currently cached.
    pub fn size(&self) -> usize {
        self.lock().size
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Successful lookups so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Failed lookups so far.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Lock the cache state, recovering it from a poisoned mutex.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCache")
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
