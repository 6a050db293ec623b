//! Prefix-compressed blocks with restart points.
//!
//! # On-disk layout
//!
//! ```text
//! [ENTRY]*
//! [RESTART_OFFSET_U32_LE]*
//! [NUM_RESTARTS_U32_LE]
//!
//! ENTRY = [SHARED varint][UNSHARED varint][VALUE_LEN varint]
//!         [KEY_DELTA (UNSHARED bytes)][VALUE (VALUE_LEN bytes)]
//! ```
//!
//! Each key is stored as the number of bytes it shares with the previous
//! key plus the differing suffix. Every `restart_interval`-th entry is a
//! **restart point**: it stores its key in full (`SHARED = 0`) and its offset
//! is listed in the restart array. Seeks binary-search the restart points and
//! then scan at most one interval, so a lookup costs `O(log R + k)`.
//!
//! A block never carries its own checksum; the block trailer written by the
//! table writer covers it.

use std::{cmp::Ordering, sync::Arc};

use super::SSTableError;
use crate::encoding;
use crate::key::Comparator;

const U32_LEN: usize = 4;

// ------------------------------------------------------------------------------------------------
// BlockBuilder
// ------------------------------------------------------------------------------------------------

/// Accumulates sorted entries into an encoded block.
///
/// The builder does not check key order; callers add keys in the order the
/// block will be searched with.
#[derive(Debug)]
pub struct BlockBuilder {
    restart_interval: usize,
    buf: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    entries: usize,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    /// Create a builder. An interval of zero is treated as one.
    pub fn new(restart_interval: usize) -> Self {
        Self {
            restart_interval: restart_interval.max(1),
            buf: Vec::new(),
            restarts: vec![0],
            counter: 0,
            entries: 0,
            last_key: Vec::new(),
        }
    }

    /// Append an entry.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        let shared = if self.counter < self.restart_interval {
            self.last_key
                .iter()
                .zip(key.iter())
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            self.restarts.push(self.buf.len() as u32);
            self.counter = 0;
            0
        };
        let unshared = key.len() - shared;

        encoding::encode_uvarint(shared as u64, &mut self.buf);
        encoding::encode_uvarint(unshared as u64, &mut self.buf);
        encoding::encode_uvarint(value.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(&key[shared..]);
        self.buf.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        self.counter += 1;
        self.entries += 1;
    }

    /// Size of the block if it were finished now.
    pub fn estimated_size(&self) -> usize {
        self.buf.len() + self.restarts.len() * U32_LEN + U32_LEN
    }

    /// Number of entries added since the last reset.
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Whether no entries have been added.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// The most recently added key.
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Append the restart array and return the encoded block, leaving the
    /// builder empty and ready for reuse.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut out = std::mem::take(&mut self.buf);
        for restart in &self.restarts {
            out.extend_from_slice(&restart.to_le_bytes());
        }
        out.extend_from_slice(&(self.restarts.len() as u32).to_le_bytes());
        self.reset();
        out
    }

    /// Discard all entries.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.entries = 0;
        self.last_key.clear();
    }
}

// ------------------------------------------------------------------------------------------------
// Block
// ------------------------------------------------------------------------------------------------

/// A decoded block with a validated restart array.
///
/// Cloning is cheap: the bytes are shared.
#[derive(Debug, Clone)]
pub struct Block {
    data: Arc<[u8]>,
    restarts_offset: usize,
    num_restarts: usize,
}

impl Block {
    /// Validate the restart array of `data`.
    ///
    /// # Errors
    ///
    /// [`SSTableError::CorruptBlock`] if the block is too short to hold the
    /// restart count, the array does not fit, or the offsets are not
    /// strictly increasing inside the entry region starting at zero.
    pub fn new(data: Arc<[u8]>) -> Result<Self, SSTableError> {
        if data.len() < U32_LEN {
            return Err(corrupt(format!("block of {} bytes has no restart count", data.len())));
        }
        let num_restarts = read_u32(&data, data.len() - U32_LEN) as usize;
        if num_restarts == 0 {
            return Err(corrupt("block has zero restart points".into()));
        }
        let restarts_offset = num_restarts
            .checked_mul(U32_LEN)
            .and_then(|len| data.len().checked_sub(len + U32_LEN))
            .ok_or_else(|| {
                corrupt(format!(
                    "{num_restarts} restart points do not fit in {} bytes",
                    data.len()
                ))
            })?;

        let block = Self {
            data,
            restarts_offset,
            num_restarts,
        };
        let mut prev: Option<usize> = None;
        for i in 0..num_restarts {
            let point = block.restart_point(i);
            let in_order = match prev {
                None => point == 0,
                Some(p) => point > p,
            };
            let in_bounds = point < restarts_offset || (restarts_offset == 0 && num_restarts == 1);
            if !in_order || !in_bounds {
                return Err(corrupt(format!("restart point {i} at offset {point} is invalid")));
            }
            prev = Some(point);
        }
        Ok(block)
    }

    /// Encoded length, restart array included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block holds no entries.
    pub fn is_empty(&self) -> bool {
        self.restarts_offset == 0
    }

    /// Number of restart points.
    pub fn num_restarts(&self) -> usize {
        self.num_restarts
    }

    /// Iterator ordering keys with `cmp`.
    pub fn iter(&self, cmp: Arc<dyn Comparator>) -> BlockIter {
        BlockIter {
            block: self.clone(),
            cmp,
            current: self.restarts_offset,
            next: self.restarts_offset,
            restart_index: 0,
            key: Vec::new(),
            value: (0, 0),
            valid: false,
        }
    }

    fn restart_point(&self, index: usize) -> usize {
        read_u32(&self.data, self.restarts_offset + index * U32_LEN) as usize
    }

    /// Decode the three varint lengths of the entry at `offset`.
    fn entry_header(&self, offset: usize) -> Result<(usize, usize, usize, usize), SSTableError> {
        let region = &self.data[offset..self.restarts_offset];
        let mut pos = 0;
        let mut fields = [0usize; 3];
        for field in &mut fields {
            let (v, n) = encoding::decode_uvarint(&region[pos..])
                .map_err(|e| corrupt(format!("entry at offset {offset}: {e}")))?;
            *field = usize::try_from(v)
                .map_err(|_| corrupt(format!("entry at offset {offset}: length {v} too large")))?;
            pos += n;
        }
        Ok((fields[0], fields[1], fields[2], pos))
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; U32_LEN];
    bytes.copy_from_slice(&data[offset..offset + U32_LEN]);
    u32::from_le_bytes(bytes)
}

fn corrupt(msg: String) -> SSTableError {
    SSTableError::CorruptBlock(msg)
}

// ------------------------------------------------------------------------------------------------
// BlockIter
// ------------------------------------------------------------------------------------------------

/// Bidirectional cursor over one block.
///
/// A freshly created iterator is unpositioned. Every positioning call returns
/// `Ok(true)` when it lands on an entry and `Ok(false)` when it runs off
/// either end. A decode failure returns [`SSTableError::CorruptBlock`] and
/// leaves the iterator unpositioned.
pub struct BlockIter {
    block: Block,
    cmp: Arc<dyn Comparator>,
    /// Offset of the current entry; `restarts_offset` when unpositioned.
    current: usize,
    /// Offset just past the current entry.
    next: usize,
    /// Restart interval containing `current`.
    restart_index: usize,
    key: Vec<u8>,
    value: (usize, usize),
    valid: bool,
}

impl BlockIter {
    /// Whether the iterator is positioned on an entry.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Key of the current entry. Empty when unpositioned.
    pub fn key(&self) -> &[u8] {
        if self.valid { &self.key } else { &[] }
    }

    /// Value of the current entry. Empty when unpositioned.
    pub fn value(&self) -> &[u8] {
        if self.valid {
            &self.block.data[self.value.0..self.value.1]
        } else {
            &[]
        }
    }

    /// Position on the first entry.
    pub fn first(&mut self) -> Result<bool, SSTableError> {
        self.seek_to_restart(0);
        self.parse_next()
    }

    /// Position on the last entry.
    pub fn last(&mut self) -> Result<bool, SSTableError> {
        self.seek_to_restart(self.block.num_restarts - 1);
        loop {
            if !self.parse_next()? {
                return Ok(false);
            }
            if self.next >= self.block.restarts_offset {
                return Ok(true);
            }
        }
    }

    /// Advance to the following entry.
    pub fn next(&mut self) -> Result<bool, SSTableError> {
        if !self.valid {
            return Ok(false);
        }
        self.parse_next()
    }

    /// Step back to the preceding entry.
    pub fn prev(&mut self) -> Result<bool, SSTableError> {
        if !self.valid {
            return Ok(false);
        }
        let original = self.current;
        while self.block.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                self.invalidate();
                return Ok(false);
            }
            self.restart_index -= 1;
        }
        self.seek_to_restart(self.restart_index);
        loop {
            if !self.parse_next()? {
                return Ok(false);
            }
            if self.next >= original {
                return Ok(true);
            }
        }
    }

    /// Position on the first entry with key `>= target`.
    pub fn seek_ge(&mut self, target: &[u8]) -> Result<bool, SSTableError> {
        let mut left = 0;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right).div_ceil(2);
            let ord = {
                let key = self.restart_key(mid)?;
                self.cmp.compare(key, target)
            };
            if ord == Ordering::Less {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        self.seek_to_restart(left);
        loop {
            if !self.parse_next()? {
                return Ok(false);
            }
            if self.cmp.compare(&self.key, target) != Ordering::Less {
                return Ok(true);
            }
        }
    }

    /// Position on the last entry with key `< target`.
    pub fn seek_lt(&mut self, target: &[u8]) -> Result<bool, SSTableError> {
        if self.seek_ge(target)? {
            self.prev()
        } else {
            self.last()
        }
    }

    fn invalidate(&mut self) {
        self.valid = false;
        self.current = self.block.restarts_offset;
        self.next = self.block.restarts_offset;
        self.key.clear();
    }

    fn seek_to_restart(&mut self, index: usize) {
        self.key.clear();
        self.valid = false;
        self.restart_index = index;
        self.next = self.block.restart_point(index);
    }

    /// Full key stored at a restart point.
    fn restart_key(&self, index: usize) -> Result<&[u8], SSTableError> {
        let offset = self.block.restart_point(index);
        let (shared, unshared, _, header) = self.block.entry_header(offset)?;
        if shared != 0 {
            return Err(corrupt(format!("restart entry at offset {offset} shares {shared} bytes")));
        }
        let start = offset + header;
        start
            .checked_add(unshared)
            .filter(|&end| end <= self.block.restarts_offset)
            .map(|end| &self.block.data[start..end])
            .ok_or_else(|| corrupt(format!("restart key at offset {offset} overruns block")))
    }

    fn parse_next(&mut self) -> Result<bool, SSTableError> {
        self.current = self.next;
        if self.current >= self.block.restarts_offset {
            self.invalidate();
            return Ok(false);
        }
        let result = self.decode_current();
        if result.is_err() {
            self.invalidate();
        }
        result
    }

    fn decode_current(&mut self) -> Result<bool, SSTableError> {
        let offset = self.current;
        let (shared, unshared, value_len, header) = self.block.entry_header(offset)?;
        if shared > self.key.len() {
            return Err(corrupt(format!(
                "entry at offset {offset} shares {shared} bytes with a {}-byte key",
                self.key.len()
            )));
        }
        let key_start = offset + header;
        let (key_end, value_end) = key_start
            .checked_add(unshared)
            .and_then(|key_end| key_end.checked_add(value_len).map(|v| (key_end, v)))
            .filter(|&(_, value_end)| value_end <= self.block.restarts_offset)
            .ok_or_else(|| corrupt(format!("entry at offset {offset} overruns block")))?;

        self.key.truncate(shared);
        self.key.extend_from_slice(&self.block.data[key_start..key_end]);
        self.value = (key_end, value_end);
        self.next = value_end;
        while self.restart_index + 1 < self.block.num_restarts
            && self.block.restart_point(self.restart_index + 1) <= offset
        {
            self.restart_index += 1;
        }
        self.valid = true;
        Ok(true)
    }
}
