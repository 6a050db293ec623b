//! Range tombstones and the fragmenter.
//!
//! A range tombstone `[start, end)#seq` deletes every key in `start..end`
//! written before `seq`. Tombstones added by callers may overlap; tables
//! store them **fragmented**: split at every boundary so that fragments are
//! disjoint and each one carries exactly the set of sequence numbers that
//! covered it.
//!
//! ```text
//! input:   [a ........ c)#5
//!                [b ........ d)#7
//!
//! output:  [a, b)#5
//!          [b, c)#7,5
//!          [c, d)#7
//! ```
//!
//! [`Fragmenter`] performs this split with a single sweep. Input must be
//! ordered by start key; a start key smaller than an earlier one is reported
//! as [`FragmenterError::OutOfOrder`].

mod fragmenter;


pub use fragmenter::{Fragmenter, FragmenterError};

use std::{cmp::Ordering, fmt};

use crate::key::{Comparator, InternalKey, InternalKeyKind};

// ------------------------------------------------------------------------------------------------
// Tombstone
// ------------------------------------------------------------------------------------------------

/// A single range deletion `[start, end)` at one sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tombstone {
    /// Inclusive start user key.
    pub start: Vec<u8>,
    /// Exclusive end user key.
    pub end: Vec<u8>,
    /// Sequence number of the deletion.
    pub seq_num: u64,
}

impl Tombstone {
    /// Create a tombstone.
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>, seq_num: u64) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            seq_num,
        }
    }

    /// Start as an internal key of kind [`InternalKeyKind::RangeDelete`].
    pub fn start_key(&self) -> InternalKey {
        InternalKey::new(self.start.clone(), self.seq_num, InternalKeyKind::RangeDelete)
    }

    /// Exclusive upper bound as an internal key.
    pub fn end_key(&self) -> InternalKey {
        InternalKey::range_delete_sentinel(self.end.clone())
    }

    /// Whether the tombstone covers no keys.
    pub fn is_empty(&self, cmp: &dyn Comparator) -> bool {
        cmp.compare(&self.start, &self.end) != Ordering::Less
    }

    /// Whether `user_key` lies in `[start, end)`.
    pub fn contains(&self, cmp: &dyn Comparator, user_key: &[u8]) -> bool {
        cmp.compare(&self.start, user_key) != Ordering::Greater
            && cmp.compare(user_key, &self.end) == Ordering::Less
    }
}

impl fmt::Display for Tombstone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}#{}",
            String::from_utf8_lossy(&self.start),
            String::from_utf8_lossy(&self.end),
            self.seq_num
        )
    }
}

// ------------------------------------------------------------------------------------------------
// Fragment
// ------------------------------------------------------------------------------------------------

/// A disjoint sub-range together with every sequence number covering it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fragment {
    /// Inclusive start user key.
    pub start: Vec<u8>,
    /// Exclusive end user key.
    pub end: Vec<u8>,
    /// Covering sequence numbers, strictly descending.
    pub seq_nums: Vec<u64>,
}

impl Fragment {
    /// One tombstone per sequence number, newest first.
    pub fn tombstones(&self) -> impl Iterator<Item = Tombstone> + '_ {
        self.seq_nums
            .iter()
            .map(|&seq_num| Tombstone::new(self.start.clone(), self.end.clone(), seq_num))
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}#",
            String::from_utf8_lossy(&self.start),
            String::from_utf8_lossy(&self.end)
        )?;
        for (i, seq) in self.seq_nums.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{seq}")?;
        }
        Ok(())
    }
}
