//! Internal keys and key comparators.
//!
//! Every record stored in a table is addressed by an [`InternalKey`]: the
//! user key plus an 8-byte trailer packing a 56-bit sequence number and an
//! 8-bit [`InternalKeyKind`].
//!
//! # On-disk layout
//!
//! ```text
//! [USER_KEY_BYTES][TRAILER_U64_LE]
//!
//! TRAILER = (seq_num << 8) | kind
//! ```
//!
//! # Ordering
//!
//! Internal keys sort by user key ascending (per the user [`Comparator`]),
//! then by trailer **descending**, so that for one user key the newest
//! version comes first and, within one sequence number, the higher kind
//! comes first. [`InternalKeyComparator`] implements this order directly on
//! encoded keys so that blocks can binary-search without decoding.
//!
//! # Text form
//!
//! `Display` renders `user#seq,KIND`. [`InternalKey::parse`] accepts the
//! `user.KIND.seq` form used by fixtures, e.g. `"a.SET.1"`.

#[cfg(test)]
mod tests;

use std::{cmp::Ordering, fmt, sync::Arc};

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Size of the encoded trailer appended to every user key.
pub const TRAILER_LEN: usize = 8;

/// Largest sequence number that fits in the 56-bit trailer field.
pub const SEQ_NUM_MAX: u64 = (1 << 56) - 1;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors produced while decoding or parsing an internal key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    /// The encoded key is shorter than the trailer.
    #[error("internal key too short: {0} bytes")]
    TooShort(usize),

    /// The trailer carries a kind byte that is not known.
    #[error("unknown key kind {0}")]
    UnknownKind(u8),

    /// The text form could not be parsed.
    #[error("malformed key {0:?}")]
    Malformed(String),
}

// ------------------------------------------------------------------------------------------------
// InternalKeyKind
// ------------------------------------------------------------------------------------------------

/// Operation recorded by an internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum InternalKeyKind {
    /// Point deletion.
    Delete = 0,
    /// Point write.
    Set = 1,
    /// Merge operand.
    Merge = 2,
    /// Start of a range tombstone; the value holds the exclusive end key.
    RangeDelete = 15,
    /// Seek sentinel; sorts before every other kind at the same sequence number.
    Max = 255,
}

impl InternalKeyKind {
    /// Short upper-case name used by the text form.
    pub fn name(self) -> &'static str {
        match self {
            InternalKeyKind::Delete => "DEL",
            InternalKeyKind::Set => "SET",
            InternalKeyKind::Merge => "MERGE",
            InternalKeyKind::RangeDelete => "RANGEDEL",
            InternalKeyKind::Max => "MAX",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "DEL" => Some(InternalKeyKind::Delete),
            "SET" => Some(InternalKeyKind::Set),
            "MERGE" => Some(InternalKeyKind::Merge),
            "RANGEDEL" => Some(InternalKeyKind::RangeDelete),
            "MAX" => Some(InternalKeyKind::Max),
            _ => None,
        }
    }
}

impl TryFrom<u8> for InternalKeyKind {
    type Error = KeyParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(InternalKeyKind::Delete),
            1 => Ok(InternalKeyKind::Set),
            2 => Ok(InternalKeyKind::Merge),
            15 => Ok(InternalKeyKind::RangeDelete),
            255 => Ok(InternalKeyKind::Max),
            other => Err(KeyParseError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for InternalKeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ------------------------------------------------------------------------------------------------
// InternalKey
// ------------------------------------------------------------------------------------------------

/// A user key tagged with a sequence number and an operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    /// The user-visible key bytes.
    pub user_key: Vec<u8>,

    /// Sequence number, at most [`SEQ_NUM_MAX`].
    pub seq_num: u64,

    /// Operation kind.
    pub kind: InternalKeyKind,
}

impl InternalKey {
    /// Create a key. Sequence numbers above [`SEQ_NUM_MAX`] are clamped.
    pub fn new(user_key: impl Into<Vec<u8>>, seq_num: u64, kind: InternalKeyKind) -> Self {
        Self {
            user_key: user_key.into(),
            seq_num: seq_num.min(SEQ_NUM_MAX),
            kind,
        }
    }

    /// The key that sorts before every real key with the same user key.
    pub fn seek_key(user_key: impl Into<Vec<u8>>) -> Self {
        Self::new(user_key, SEQ_NUM_MAX, InternalKeyKind::Max)
    }

    /// Exclusive upper bound of a range tombstone ending at `end`.
    pub fn range_delete_sentinel(end: impl Into<Vec<u8>>) -> Self {
        Self::new(end, SEQ_NUM_MAX, InternalKeyKind::RangeDelete)
    }

    /// Packed `(seq_num << 8) | kind` trailer.
    pub fn trailer(&self) -> u64 {
        (self.seq_num << 8) | u64::from(self.kind as u8)
    }

    /// Length of the encoded form.
    pub fn encoded_len(&self) -> usize {
        self.user_key.len() + TRAILER_LEN
    }

    /// Append the encoded form to `buf`.
    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.user_key);
        buf.extend_from_slice(&self.trailer().to_le_bytes());
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut buf);
        buf
    }

    /// Decode an encoded internal key.
    pub fn decode(encoded: &[u8]) -> Result<Self, KeyParseError> {
        let (user_key, trailer) = split_encoded(encoded)?;
        let kind = InternalKeyKind::try_from((trailer & 0xff) as u8)?;
        Ok(Self {
            user_key: user_key.to_vec(),
            seq_num: trailer >> 8,
            kind,
        })
    }

    /// Parse the `user.KIND.seq` text form, e.g. `"a.SET.1"`.
    ///
    /// The user key may itself contain dots; the last two components are
    /// always the kind and the sequence number.
    pub fn parse(text: &str) -> Result<Self, KeyParseError> {
        let malformed = || KeyParseError::Malformed(text.to_string());
        let mut parts = text.rsplitn(3, '.');
        let seq = parts.next().ok_or_else(malformed)?;
        let kind = parts.next().ok_or_else(malformed)?;
        let user = parts.next().ok_or_else(malformed)?;
        let seq_num = seq.parse::<u64>().map_err(|_| malformed())?;
        let kind = InternalKeyKind::from_name(kind).ok_or_else(malformed)?;
        if seq_num > SEQ_NUM_MAX {
            return Err(malformed());
        }
        Ok(Self::new(user.as_bytes(), seq_num, kind))
    }
}

impl fmt::Display for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{},{}",
            String::from_utf8_lossy(&self.user_key),
            self.seq_num,
            self.kind
        )
    }
}

/// Split an encoded internal key into user key and trailer.
pub(crate) fn split_encoded(encoded: &[u8]) -> Result<(&[u8], u64), KeyParseError> {
    if encoded.len() < TRAILER_LEN {
        return Err(KeyParseError::TooShort(encoded.len()));
    }
    let split = encoded.len() - TRAILER_LEN;
    let mut trailer = [0u8; TRAILER_LEN];
    trailer.copy_from_slice(&encoded[split..]);
    Ok((&encoded[..split], u64::from_le_bytes(trailer)))
}

// ------------------------------------------------------------------------------------------------
// Comparator
// ------------------------------------------------------------------------------------------------

/// Total order over byte keys, plus key shortening used by index blocks.
///
/// A comparator is fixed for the lifetime of a table; its [`name`](Self::name)
/// is recorded in the properties block.
pub trait Comparator: Send + Sync {
    /// Three-way comparison.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Stable identifier written to the properties block.
    fn name(&self) -> &str;

    /// A short key `s` with `start <= s < limit`. Returns `start` when no
    /// shorter key exists. Requires `start < limit`.
    fn separator(&self, start: &[u8], limit: &[u8]) -> Vec<u8>;

    /// A short key `s >= key`.
    fn successor(&self, key: &[u8]) -> Vec<u8>;
}

/// Lexicographic byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &str {
        "leveldb.BytewiseComparator"
    }

    fn separator(&self, start: &[u8], limit: &[u8]) -> Vec<u8> {
        let shared = start
            .iter()
            .zip(limit.iter())
            .take_while(|(a, b)| a == b)
            .count();
        if shared >= start.len().min(limit.len()) {
            // One key is a prefix of the other.
            return start.to_vec();
        }
        let diff = start[shared];
        if diff < 0xff && diff + 1 < limit[shared] {
            let mut sep = start[..=shared].to_vec();
            sep[shared] += 1;
            return sep;
        }
        start.to_vec()
    }

    fn successor(&self, key: &[u8]) -> Vec<u8> {
        match key.iter().position(|&b| b != 0xff) {
            Some(i) => {
                let mut succ = key[..=i].to_vec();
                succ[i] += 1;
                succ
            }
            None => key.to_vec(),
        }
    }
}

/// Orders encoded internal keys: user key ascending, trailer descending.
#[derive(Clone)]
pub struct InternalKeyComparator {
    user: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    /// Wrap a user comparator.
    pub fn new(user: Arc<dyn Comparator>) -> Self {
        Self { user }
    }

    /// The wrapped user comparator.
    pub fn user_comparator(&self) -> &Arc<dyn Comparator> {
        &self.user
    }

    /// Compare two decoded internal keys.
    pub fn compare_keys(&self, a: &InternalKey, b: &InternalKey) -> Ordering {
        self.user
            .compare(&a.user_key, &b.user_key)
            .then_with(|| b.trailer().cmp(&a.trailer()))
    }
}

impl fmt::Debug for InternalKeyComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalKeyComparator")
            .field("user", &self.user.name())
            .finish()
    }
}

impl Comparator for InternalKeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match (split_encoded(a), split_encoded(b)) {
            (Ok((ua, ta)), Ok((ub, tb))) => self.user.compare(ua, ub).then_with(|| tb.cmp(&ta)),
            // Malformed keys are rejected when a block is decoded; fall back
            // to a total order so searches stay well-defined.
            _ => a.cmp(b),
        }
    }

    fn name(&self) -> &str {
        self.user.name()
    }

    fn separator(&self, start: &[u8], limit: &[u8]) -> Vec<u8> {
        let (Ok((us, _)), Ok((ul, _))) = (split_encoded(start), split_encoded(limit)) else {
            return start.to_vec();
        };
        let sep = self.user.separator(us, ul);
        if sep.len() < us.len() && self.user.compare(us, &sep) == Ordering::Less {
            // The shortened user key is strictly greater than the start's, so
            // the smallest trailer for it still sorts after `start`.
            return InternalKey::seek_key(sep).encode();
        }
        start.to_vec()
    }

    fn successor(&self, key: &[u8]) -> Vec<u8> {
        let Ok((uk, _)) = split_encoded(key) else {
            return key.to_vec();
        };
        let succ = self.user.successor(uk);
        if succ.len() < uk.len() && self.user.compare(uk, &succ) == Ordering::Less {
            return InternalKey::seek_key(succ).encode();
        }
        key.to_vec()
    }
}
