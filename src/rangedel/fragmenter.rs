//! Sweep-line fragmentation of overlapping range tombstones.

use std::{cmp::Ordering, sync::Arc};

use thiserror::Error;
use tracing::trace;

use super::Fragment;
use crate::key::{Comparator, InternalKey};

/// Errors reported by [`Fragmenter`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FragmenterError {
    /// A tombstone started before a previously added one.
    #[error("range tombstone {start} added after {previous}: starts must not decrease")]
    OutOfOrder {
        /// Start key of the rejected tombstone.
        start: String,
        /// Start key of the earlier tombstone.
        previous: String,
    },

    /// `add` or `finish` called after `finish`.
    #[error("fragmenter already finished")]
    Finished,
}

struct Pending {
    end: Vec<u8>,
    seq_num: u64,
}

/// Splits start-ordered, possibly overlapping tombstones into disjoint
/// fragments.
///
/// All pending tombstones share one start key. When a tombstone with a
/// larger start arrives, everything before that start is final: it is
/// emitted, pending tombstones ending at or before it are dropped, and the
/// remainder is truncated to begin at the new start.
pub struct Fragmenter {
    cmp: Arc<dyn Comparator>,
    pending_start: Vec<u8>,
    pending: Vec<Pending>,
    last_start: Option<Vec<u8>>,
    output: Vec<Fragment>,
    finished: bool,
}

impl Fragmenter {
    /// Create a fragmenter ordering user keys with `cmp`.
    pub fn new(cmp: Arc<dyn Comparator>) -> Self {
        Self {
            cmp,
            pending_start: Vec::new(),
            pending: Vec::new(),
            last_start: None,
            output: Vec::new(),
            finished: false,
        }
    }

    /// Add the tombstone `[start.user_key, end)` at `start.seq_num`.
    ///
    /// The kind of `start` is ignored; output fragments are always range
    /// deletions. Empty tombstones are accepted and contribute nothing.
    pub fn add(&mut self, start: InternalKey, end: &[u8]) -> Result<(), FragmenterError> {
        if self.finished {
            return Err(FragmenterError::Finished);
        }
        if let Some(prev) = &self.last_start {
            if self.cmp.compare(&start.user_key, prev) == Ordering::Less {
                return Err(FragmenterError::OutOfOrder {
                    start: String::from_utf8_lossy(&start.user_key).into_owned(),
                    previous: String::from_utf8_lossy(prev).into_owned(),
                });
            }
        }
        self.last_start = Some(start.user_key.clone());

        if self.cmp.compare(&start.user_key, end) != Ordering::Less {
            trace!(%start, "skipping empty range tombstone");
            return Ok(());
        }

        if !self.pending.is_empty()
            && self.cmp.compare(&start.user_key, &self.pending_start) == Ordering::Greater
        {
            self.flush_to(Some(&start.user_key));
        }
        if self.pending.is_empty() {
            self.pending_start = start.user_key;
        }
        self.pending.push(Pending {
            end: end.to_vec(),
            seq_num: start.seq_num,
        });
        Ok(())
    }

    /// Flush pending tombstones and return every fragment in start order.
    pub fn finish(&mut self) -> Result<Vec<Fragment>, FragmenterError> {
        if self.finished {
            return Err(FragmenterError::Finished);
        }
        self.flush_to(None);
        self.finished = true;
        Ok(std::mem::take(&mut self.output))
    }

    /// Emit fragments covering `[pending_start, limit)`, or everything when
    /// `limit` is `None`, then keep only what extends past `limit`.
    fn flush_to(&mut self, limit: Option<&[u8]>) {
        if self.pending.is_empty() {
            return;
        }
        let cmp = Arc::clone(&self.cmp);

        let mut ends: Vec<&[u8]> = self.pending.iter().map(|p| p.end.as_slice()).collect();
        ends.sort_by(|a, b| cmp.compare(a, b));
        ends.dedup_by(|a, b| cmp.compare(a, b) == Ordering::Equal);

        let mut cur = self.pending_start.clone();
        for end in ends {
            let (stop, truncated) = match limit {
                Some(l) if cmp.compare(l, end) == Ordering::Less => (l, true),
                _ => (end, false),
            };
            if cmp.compare(&cur, stop) == Ordering::Less {
                let mut seq_nums: Vec<u64> = self
                    .pending
                    .iter()
                    .filter(|p| cmp.compare(&p.end, &cur) == Ordering::Greater)
                    .map(|p| p.seq_num)
                    .collect();
                seq_nums.sort_unstable_by(|a, b| b.cmp(a));
                seq_nums.dedup();
                self.output.push(Fragment {
                    start: cur,
                    end: stop.to_vec(),
                    seq_nums,
                });
                cur = stop.to_vec();
            }
            if truncated {
                break;
            }
        }

        match limit {
            Some(l) => {
                self.pending
                    .retain(|p| cmp.compare(&p.end, l) == Ordering::Greater);
                self.pending_start = l.to_vec();
            }
            None => self.pending.clear(),
        }
    }
}
