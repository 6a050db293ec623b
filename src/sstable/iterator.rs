//! Table iterators — two-level cursors over index and data blocks.
//!
//! Every cursor follows one positioning protocol: `first`, `last`, `next`,
//! `prev`, `seek_ge`, and `seek_lt` return `Ok(true)` when they land on an
//! entry and `Ok(false)` when they run off an end.
//!
//! # Cursor stack
//!
//! ```text
//! TableIter            user-key bounds, decoded InternalKey
//!   └── LevelIter      data blocks addressed by an index cursor
//!         └── index    BlockIter (single level)
//!                      or LevelIter over index partitions (two level)
//! ```
//!
//! An index entry's key is a separator `>=` every key in its block and `<`
//! every key in the next block, so `seek_ge(t)` in the index finds the only
//! block that can hold the first key `>= t`. The same entry also bounds
//! `seek_lt(t)`: the last key `< t` is in that block or, failing that, at the
//! end of the one before.
//!
//! Blocks are loaded lazily through the reader and its block cache. Empty
//! blocks are stepped over.
//!
//! # Range tombstones
//!
//! [`RangeDelIter`] walks the tombstones of a table, decoded up front, in
//! `(start ASC, seq_num DESC)` order with the same protocol.

use std::{cmp::Ordering, sync::Arc};

use super::{BlockHandle, BlockIter, SSTableError, reader::TableInner};
use crate::encoding::decode_from_slice;
use crate::key::{Comparator, InternalKey};
use crate::rangedel::Tombstone;

// ------------------------------------------------------------------------------------------------
// Cursor
// ------------------------------------------------------------------------------------------------

/// Positioning protocol shared by block and level cursors.
pub(crate) trait Cursor: Send {
    fn valid(&self) -> bool;
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
    fn first(&mut self) -> Result<bool, SSTableError>;
    fn last(&mut self) -> Result<bool, SSTableError>;
    fn next(&mut self) -> Result<bool, SSTableError>;
    fn prev(&mut self) -> Result<bool, SSTableError>;
    fn seek_ge(&mut self, target: &[u8]) -> Result<bool, SSTableError>;
    fn seek_lt(&mut self, target: &[u8]) -> Result<bool, SSTableError>;
}

impl Cursor for BlockIter {
    fn valid(&self) -> bool {
        BlockIter::valid(self)
    }
    fn key(&self) -> &[u8] {
        BlockIter::key(self)
    }
    fn value(&self) -> &[u8] {
        BlockIter::value(self)
    }
    fn first(&mut self) -> Result<bool, SSTableError> {
        BlockIter::first(self)
    }
    fn last(&mut self) -> Result<bool, SSTableError> {
        BlockIter::last(self)
    }
    fn next(&mut self) -> Result<bool, SSTableError> {
        BlockIter::next(self)
    }
    fn prev(&mut self) -> Result<bool, SSTableError> {
        BlockIter::prev(self)
    }
    fn seek_ge(&mut self, target: &[u8]) -> Result<bool, SSTableError> {
        BlockIter::seek_ge(self, target)
    }
    fn seek_lt(&mut self, target: &[u8]) -> Result<bool, SSTableError> {
        BlockIter::seek_lt(self, target)
    }
}

// ------------------------------------------------------------------------------------------------
// LevelIter
// ------------------------------------------------------------------------------------------------

/// Walks the blocks addressed by the handles an outer cursor yields.
pub(crate) struct LevelIter {
    table: Arc<TableInner>,
    outer: Box<dyn Cursor>,
    inner: Option<BlockIter>,
}

impl LevelIter {
    pub(crate) fn new(table: Arc<TableInner>, outer: Box<dyn Cursor>) -> Self {
        Self {
            table,
            outer,
            inner: None,
        }
    }

    /// Load the block the outer cursor points at, unpositioned.
    fn load_inner(&mut self) -> Result<(), SSTableError> {
        self.inner = None;
        if !self.outer.valid() {
            return Ok(());
        }
        let handle = decode_handle(self.outer.value())?;
        let block = self.table.read_block(handle)?;
        self.inner = Some(block.iter(Arc::clone(&self.table.icmp)));
        Ok(())
    }

    fn inner_valid(&self) -> bool {
        self.inner.as_ref().is_some_and(BlockIter::valid)
    }

    /// Move forward over exhausted and empty blocks.
    fn skip_forward(&mut self) -> Result<bool, SSTableError> {
        while !self.inner_valid() {
            if !self.outer.valid() || !self.outer.next()? {
                self.inner = None;
                return Ok(false);
            }
            self.load_inner()?;
            if let Some(inner) = self.inner.as_mut() {
                inner.first()?;
            }
        }
        Ok(true)
    }

    /// Move backward over exhausted and empty blocks.
    fn skip_backward(&mut self) -> Result<bool, SSTableError> {
        while !self.inner_valid() {
            if !self.outer.valid() || !self.outer.prev()? {
                self.inner = None;
                return Ok(false);
            }
            self.load_inner()?;
            if let Some(inner) = self.inner.as_mut() {
                inner.last()?;
            }
        }
        Ok(true)
    }
}

impl Cursor for LevelIter {
    fn valid(&self) -> bool {
        self.inner_valid()
    }

    fn key(&self) -> &[u8] {
        self.inner.as_ref().map(|i| i.key()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.inner.as_ref().map(|i| i.value()).unwrap_or(&[])
    }

    fn first(&mut self) -> Result<bool, SSTableError> {
        if !self.outer.first()? {
            self.inner = None;
            return Ok(false);
        }
        self.load_inner()?;
        if let Some(inner) = self.inner.as_mut() {
            inner.first()?;
        }
        self.skip_forward()
    }

    fn last(&mut self) -> Result<bool, SSTableError> {
        if !self.outer.last()? {
            self.inner = None;
            return Ok(false);
        }
        self.load_inner()?;
        if let Some(inner) = self.inner.as_mut() {
            inner.last()?;
        }
        self.skip_backward()
    }

    fn next(&mut self) -> Result<bool, SSTableError> {
        match self.inner.as_mut() {
            Some(inner) if inner.valid() => {
                inner.next()?;
            }
            _ => return Ok(false),
        }
        self.skip_forward()
    }

    fn prev(&mut self) -> Result<bool, SSTableError> {
        match self.inner.as_mut() {
            Some(inner) if inner.valid() => {
                inner.prev()?;
            }
            _ => return Ok(false),
        }
        self.skip_backward()
    }

    fn seek_ge(&mut self, target: &[u8]) -> Result<bool, SSTableError> {
        if !self.outer.seek_ge(target)? {
            self.inner = None;
            return Ok(false);
        }
        self.load_inner()?;
        if let Some(inner) = self.inner.as_mut() {
            inner.seek_ge(target)?;
        }
        self.skip_forward()
    }

    fn seek_lt(&mut self, target: &[u8]) -> Result<bool, SSTableError> {
        // Every block before the one `seek_ge` finds holds only smaller keys.
        if !self.outer.seek_ge(target)? && !self.outer.last()? {
            self.inner = None;
            return Ok(false);
        }
        self.load_inner()?;
        if let Some(inner) = self.inner.as_mut() {
            inner.seek_lt(target)?;
        }
        self.skip_backward()
    }
}

pub(crate) fn decode_handle(value: &[u8]) -> Result<BlockHandle, SSTableError> {
    let (handle, n) = decode_from_slice::<BlockHandle>(value)
        .map_err(|e| SSTableError::CorruptBlock(format!("index entry handle: {e}")))?;
    if n != value.len() {
        return Err(SSTableError::CorruptBlock(format!(
            "index entry handle has {} trailing bytes",
            value.len() - n
        )));
    }
    Ok(handle)
}

// ------------------------------------------------------------------------------------------------
// TableIter
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Unpositioned,
    At,
    BeforeFirst,
    AfterLast,
}

/// Bidirectional iterator over the point entries of one table, restricted
/// to user keys in `[lower, upper)`.
///
/// `next` on an unpositioned iterator behaves like `first`, and `prev` like
/// `last`. After running off one end the iterator can step back in from
/// that end. Errors leave it unpositioned.
pub struct TableIter {
    cursor: Box<dyn Cursor>,
    ucmp: Arc<dyn Comparator>,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
    position: Position,
    key: Option<InternalKey>,
}

impl TableIter {
    pub(crate) fn new(
        table: Arc<TableInner>,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Self {
        let ucmp = Arc::clone(&table.opts.comparator);
        let top = table.index.iter(Arc::clone(&table.icmp));
        let index: Box<dyn Cursor> = if table.properties.is_two_level_index() {
            Box::new(LevelIter::new(Arc::clone(&table), Box::new(top)))
        } else {
            Box::new(top)
        };
        Self {
            cursor: Box::new(LevelIter::new(table, index)),
            ucmp,
            lower: lower.map(<[u8]>::to_vec),
            upper: upper.map(<[u8]>::to_vec),
            position: Position::Unpositioned,
            key: None,
        }
    }

    /// Whether the iterator is positioned on an entry.
    pub fn valid(&self) -> bool {
        self.position == Position::At
    }

    /// Key of the current entry.
    pub fn key(&self) -> Option<&InternalKey> {
        self.key.as_ref()
    }

    /// Value of the current entry. Empty when unpositioned.
    pub fn value(&self) -> &[u8] {
        if self.valid() { self.cursor.value() } else { &[] }
    }

    /// Position on the first entry `>= lower`.
    pub fn first(&mut self) -> Result<bool, SSTableError> {
        let found = match self.lower.clone() {
            Some(lower) => self.cursor.seek_ge(&InternalKey::seek_key(lower).encode()),
            None => self.cursor.first(),
        };
        self.settle(found, true)
    }

    /// Position on the last entry `< upper`.
    pub fn last(&mut self) -> Result<bool, SSTableError> {
        let found = match self.upper.clone() {
            Some(upper) => self.cursor.seek_lt(&InternalKey::seek_key(upper).encode()),
            None => self.cursor.last(),
        };
        self.settle(found, false)
    }

    /// Advance to the next entry.
    pub fn next(&mut self) -> Result<bool, SSTableError> {
        match self.position {
            Position::Unpositioned | Position::BeforeFirst => self.first(),
            Position::AfterLast => Ok(false),
            Position::At => {
                let found = self.cursor.next();
                self.settle(found, true)
            }
        }
    }

    /// Step back to the previous entry.
    pub fn prev(&mut self) -> Result<bool, SSTableError> {
        match self.position {
            Position::Unpositioned | Position::AfterLast => self.last(),
            Position::BeforeFirst => Ok(false),
            Position::At => {
                let found = self.cursor.prev();
                self.settle(found, false)
            }
        }
    }

    /// Position on the newest entry of the first user key `>= target`.
    pub fn seek_ge(&mut self, target: &[u8]) -> Result<bool, SSTableError> {
        let target = match &self.lower {
            Some(lower) if self.ucmp.compare(lower, target) == Ordering::Greater => lower.clone(),
            _ => target.to_vec(),
        };
        let found = self.cursor.seek_ge(&InternalKey::seek_key(target).encode());
        self.settle(found, true)
    }

    /// Position on the oldest entry of the last user key `< target`.
    pub fn seek_lt(&mut self, target: &[u8]) -> Result<bool, SSTableError> {
        let target = match &self.upper {
            Some(upper) if self.ucmp.compare(upper, target) == Ordering::Less => upper.clone(),
            _ => target.to_vec(),
        };
        let found = self.cursor.seek_lt(&InternalKey::seek_key(target).encode());
        self.settle(found, false)
    }

    /// Forward scan over every entry in bounds, starting from the first.
    pub fn entries(&mut self) -> Entries<'_> {
        Entries {
            iter: self,
            started: false,
            done: false,
        }
    }

    /// Decode the cursor's key and apply the bound in the direction of
    /// travel.
    fn settle(
        &mut self,
        found: Result<bool, SSTableError>,
        forward: bool,
    ) -> Result<bool, SSTableError> {
        let exhausted = if forward {
            Position::AfterLast
        } else {
            Position::BeforeFirst
        };
        match found {
            Ok(true) => {}
            Ok(false) => return Ok(self.park(exhausted)),
            Err(e) => {
                self.park(Position::Unpositioned);
                return Err(e);
            }
        }

        let key = match InternalKey::decode(self.cursor.key()) {
            Ok(key) => key,
            Err(e) => {
                self.park(Position::Unpositioned);
                return Err(SSTableError::CorruptBlock(format!("data block key: {e}")));
            }
        };
        let in_bounds = if forward {
            self.upper
                .as_deref()
                .is_none_or(|u| self.ucmp.compare(&key.user_key, u) == Ordering::Less)
        } else {
            self.lower
                .as_deref()
                .is_none_or(|l| self.ucmp.compare(&key.user_key, l) != Ordering::Less)
        };
        if !in_bounds {
            return Ok(self.park(exhausted));
        }
        self.key = Some(key);
        self.position = Position::At;
        Ok(true)
    }

    fn park(&mut self, position: Position) -> bool {
        self.key = None;
        self.position = position;
        false
    }
}

impl std::fmt::Debug for TableIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableIter")
            .field("position", &self.position)
            .field("key", &self.key)
            .finish()
    }
}

/// Forward [`Iterator`] adapter returned by [`TableIter::entries`].
///
/// Yields `(key, value)` pairs; stops after the first error.
pub struct Entries<'a> {
    iter: &'a mut TableIter,
    started: bool,
    done: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<(InternalKey, Vec<u8>), SSTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = if self.started {
            self.iter.next()
        } else {
            self.started = true;
            self.iter.first()
        };
        match step {
            Ok(true) => {
                let key = self.iter.key.clone()?;
                Some(Ok((key, self.iter.value().to_vec())))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// RangeDelIter
// ------------------------------------------------------------------------------------------------

/// Iterator over the range tombstones of one table.
pub struct RangeDelIter {
    tombstones: Vec<Tombstone>,
    ucmp: Arc<dyn Comparator>,
    index: usize,
    position: Position,
}

impl RangeDelIter {
    /// Sort `tombstones` by start ascending, then sequence number
    /// descending.
    pub(crate) fn new(mut tombstones: Vec<Tombstone>, ucmp: Arc<dyn Comparator>) -> Self {
        tombstones.sort_by(|a, b| {
            ucmp.compare(&a.start, &b.start)
                .then_with(|| b.seq_num.cmp(&a.seq_num))
        });
        Self {
            tombstones,
            ucmp,
            index: 0,
            position: Position::Unpositioned,
        }
    }

    /// Number of tombstones.
    pub fn len(&self) -> usize {
        self.tombstones.len()
    }

    /// Whether there are no tombstones.
    pub fn is_empty(&self) -> bool {
        self.tombstones.is_empty()
    }

    /// All tombstones in iteration order.
    pub fn tombstones(&self) -> &[Tombstone] {
        &self.tombstones
    }

    /// Whether the iterator is positioned on a tombstone.
    pub fn valid(&self) -> bool {
        self.position == Position::At
    }

    /// The current tombstone.
    pub fn tombstone(&self) -> Option<&Tombstone> {
        if self.valid() {
            self.tombstones.get(self.index)
        } else {
            None
        }
    }

    /// Position on the first tombstone. Returns `false` if there is none.
    pub fn first(&mut self) -> bool {
        self.land(if self.is_empty() { None } else { Some(0) }, Position::AfterLast)
    }

    /// Position on the last tombstone. Returns `false` if there is none.
    pub fn last(&mut self) -> bool {
        self.land(self.len().checked_sub(1), Position::BeforeFirst)
    }

    /// Advance to the next tombstone. An unpositioned iterator behaves like
    /// [`first`](Self::first).
    pub fn next(&mut self) -> bool {
        match self.position {
            Position::Unpositioned | Position::BeforeFirst => self.first(),
            Position::AfterLast => false,
            Position::At => {
                let next = Some(self.index + 1).filter(|&i| i < self.len());
                self.land(next, Position::AfterLast)
            }
        }
    }

    /// Step back to the previous tombstone. An unpositioned iterator behaves
    /// like [`last`](Self::last).
    pub fn prev(&mut self) -> bool {
        match self.position {
            Position::Unpositioned | Position::AfterLast => self.last(),
            Position::BeforeFirst => false,
            Position::At => self.land(self.index.checked_sub(1), Position::BeforeFirst),
        }
    }

    /// Position on the first tombstone whose end is after `user_key`.
    pub fn seek_ge(&mut self, user_key: &[u8]) -> bool {
        let found = self
            .tombstones
            .iter()
            .position(|t| self.ucmp.compare(&t.end, user_key) == Ordering::Greater);
        self.land(found, Position::AfterLast)
    }

    /// Position on the last tombstone starting before `user_key`.
    pub fn seek_lt(&mut self, user_key: &[u8]) -> bool {
        let found = self
            .tombstones
            .iter()
            .rposition(|t| self.ucmp.compare(&t.start, user_key) == Ordering::Less);
        self.land(found, Position::BeforeFirst)
    }

    fn land(&mut self, index: Option<usize>, exhausted: Position) -> bool {
        match index {
            Some(i) => {
                self.index = i;
                self.position = Position::At;
                true
            }
            None => {
                self.position = exhausted;
                false
            }
        }
    }
}

impl std::fmt::Debug for RangeDelIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeDelIter")
            .field("len", &self.tombstones.len())
            .field("position", &self.position)
            .field("index", &self.index)
            .finish()
    }
}
