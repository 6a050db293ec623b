//! Filter policies for point-lookup pruning.
//!
//! A filter block is an opaque byte string built from the user keys of
//! every point entry in a table. Readers ask the policy whether a key *may*
//! be present; `false` is definitive, `true` may be a false positive.
//!
//! The filter block is stored uncompressed under the meta-index name
//! `filter.<policy name>`. A reader only uses it when its configured policy
//! has the same name.

use bloomfilter::Bloom;
use tracing::warn;

use super::SSTableError;

/// Builds and queries filter blocks.
pub trait FilterPolicy: Send + Sync {
    /// Stable name, recorded in the meta-index and properties.
    fn name(&self) -> &str;

    /// Start a new filter.
    fn new_writer(&self) -> Box<dyn FilterWriter>;

    /// Whether `key` may be in the set the filter was built from.
    fn may_contain(&self, filter: &[u8], key: &[u8]) -> bool;
}

/// Incremental filter construction.
pub trait FilterWriter: Send {
    /// Add a user key. Consecutive duplicates may be passed.
    fn add(&mut self, key: &[u8]);

    /// Produce the filter block.
    fn finish(&mut self) -> Result<Vec<u8>, SSTableError>;
}

// ------------------------------------------------------------------------------------------------
// Bloom filter policy
// ------------------------------------------------------------------------------------------------

/// Default false-positive rate of [`BloomFilterPolicy`].
pub const DEFAULT_BLOOM_FP_RATE: f64 = 0.01;

/// Bloom filter sized from the number of distinct keys added.
#[derive(Debug, Clone, Copy)]
pub struct BloomFilterPolicy {
    fp_rate: f64,
}

impl BloomFilterPolicy {
    /// Policy targeting the given false-positive rate.
    pub fn new(fp_rate: f64) -> Self {
        Self { fp_rate }
    }
}

impl Default for BloomFilterPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BLOOM_FP_RATE)
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &str {
        "bloom"
    }

    fn new_writer(&self) -> Box<dyn FilterWriter> {
        Box::new(BloomFilterWriter {
            fp_rate: self.fp_rate,
            keys: Vec::new(),
        })
    }

    fn may_contain(&self, filter: &[u8], key: &[u8]) -> bool {
        match Bloom::<[u8]>::from_slice(filter) {
            Ok(bloom) => bloom.check(key),
            Err(e) => {
                warn!(error = %e, "unreadable bloom filter, assuming key present");
                true
            }
        }
    }
}

/// Buffers keys until `finish`, when the item count is known.
struct BloomFilterWriter {
    fp_rate: f64,
    keys: Vec<Vec<u8>>,
}

impl FilterWriter for BloomFilterWriter {
    fn add(&mut self, key: &[u8]) {
        if self.keys.last().is_some_and(|last| last.as_slice() == key) {
            return;
        }
        self.keys.push(key.to_vec());
    }

    fn finish(&mut self) -> Result<Vec<u8>, SSTableError> {
        let keys = std::mem::take(&mut self.keys);
        let mut bloom = Bloom::<[u8]>::new_for_fp_rate(keys.len().max(1), self.fp_rate)
            .map_err(|e| SSTableError::Filter(e.to_string()))?;
        for key in &keys {
            bloom.set(key.as_slice());
        }
        Ok(bloom.as_slice().to_vec())
    }
}
