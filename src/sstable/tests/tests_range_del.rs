//! Range-deletion block tests for both encodings.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::key::{BytewiseComparator, InternalKey, InternalKeyKind};
    use crate::rangedel::{Fragmenter, Tombstone};
    use crate::sstable::tests::helpers::{build, init_tracing, open, scan};
    use crate::sstable::{
        RangeDelIter, Reader, ReaderOptions, SSTableError, TableFormat, Writer, WriterOptions,
    };
    use crate::vfs::{FileSystem, MemFs};

    fn legacy() -> WriterOptions {
        WriterOptions {
            table_format: TableFormat::LevelDb,
            ..Default::default()
        }
    }

    fn tombstones(reader: &Reader) -> Vec<String> {
        reader
            .range_del_iter()
            .unwrap()
            .unwrap()
            .tombstones()
            .iter()
            .map(Tombstone::to_string)
            .collect()
    }

    fn current(iter: &RangeDelIter) -> String {
        iter.tombstone().unwrap().to_string()
    }

    // ----------------------------------------------------------------
    // Fragmented (v2) encoding
    // ----------------------------------------------------------------

    /// # Scenario
    /// Overlapping tombstones are fragmented and written to a v2 table.
    ///
    /// # Starting environment
    /// Tombstones `[a, e)#5` and `[c, g)#7`.
    ///
    /// # Actions
    /// 1. Fragment them and add every resulting tombstone.
    /// 2. Read the range-del block back.
    ///
    /// # Expected behavior
    /// The reader yields the fragments expanded per sequence number, in
    /// `(start, seq desc)` order, under the `range-del.v2` block name.
    #[test]
    fn fragmented_tombstones_round_trip() {
        init_tracing();
        let mut fragmenter = Fragmenter::new(Arc::new(BytewiseComparator));
        fragmenter
            .add(InternalKey::new("a", 5, InternalKeyKind::RangeDelete), b"e")
            .unwrap();
        fragmenter
            .add(InternalKey::new("c", 7, InternalKeyKind::RangeDelete), b"g")
            .unwrap();
        let fragments = fragmenter.finish().unwrap();

        let fs = MemFs::new();
        let mut w = Writer::new(fs.create("t.sst").unwrap(), WriterOptions::default()).unwrap();
        for fragment in &fragments {
            for tombstone in fragment.tombstones() {
                w.add_tombstone(&tombstone).unwrap();
            }
        }
        w.set(b"b", b"point").unwrap();
        w.close().unwrap();

        let reader = open(&fs, "t.sst", ReaderOptions::default());
        assert!(reader.meta_index().contains_key("range-del.v2"));
        assert!(!reader.meta_index().contains_key("range-del"));
        assert_eq!(reader.properties().num_range_deletions, 4);
        assert_eq!(tombstones(&reader), ["a-c#5", "c-e#7", "c-e#5", "e-g#7"]);

        // Tombstones never appear among point entries.
        assert_eq!(scan(&mut reader.iter(None, None)), ["b#0,SET=point"]);
    }

    #[test]
    fn unfragmented_input_is_rejected() {
        let fs = MemFs::new();
        let mut w = Writer::new(fs.create("t.sst").unwrap(), WriterOptions::default()).unwrap();
        w.add(&InternalKey::new("a", 5, InternalKeyKind::RangeDelete), b"e")
            .unwrap();

        let err = w
            .add(&InternalKey::new("c", 7, InternalKeyKind::RangeDelete), b"g")
            .unwrap_err();
        assert!(matches!(err, SSTableError::UnfragmentedTombstone(_)), "{err}");
        assert!(err.is_usage());
        assert!(matches!(w.close(), Err(SSTableError::WriterFailed)));
    }

    #[test]
    fn same_span_requires_descending_sequence_numbers() {
        let fs = MemFs::new();
        let rangedel = |seq| InternalKey::new("a", seq, InternalKeyKind::RangeDelete);

        let mut w = Writer::new(fs.create("t.sst").unwrap(), WriterOptions::default()).unwrap();
        w.add(&rangedel(5), b"c").unwrap();
        w.add(&rangedel(3), b"c").unwrap();
        assert!(matches!(
            w.add(&rangedel(3), b"c"),
            Err(SSTableError::UnfragmentedTombstone(_))
        ));

        let mut w = Writer::new(fs.create("u.sst").unwrap(), WriterOptions::default()).unwrap();
        w.add(&rangedel(3), b"c").unwrap();
        assert!(matches!(
            w.add(&rangedel(5), b"c"),
            Err(SSTableError::UnfragmentedTombstone(_))
        ));
    }

    #[test]
    fn abutting_fragments_are_accepted() {
        let fs = MemFs::new();
        build(
            &fs,
            "t.sst",
            WriterOptions::default(),
            &[
                ("a.RANGEDEL.4", "c"),
                ("c.RANGEDEL.9", "e"),
                ("c.RANGEDEL.2", "e"),
                ("x.RANGEDEL.1", "z"),
            ],
        );
        let reader = open(&fs, "t.sst", ReaderOptions::default());
        assert_eq!(tombstones(&reader), ["a-c#4", "c-e#9", "c-e#2", "x-z#1"]);
    }

    #[test]
    fn empty_tombstones_are_dropped() {
        let fs = MemFs::new();
        let meta = build(
            &fs,
            "t.sst",
            WriterOptions::default(),
            &[("m.RANGEDEL.1", "m"), ("q.RANGEDEL.1", "b")],
        );
        assert!(!meta.has_range_keys());
        let reader = open(&fs, "t.sst", ReaderOptions::default());
        assert_eq!(reader.properties().num_range_deletions, 0);
        assert!(reader.range_del_iter().unwrap().is_none());
    }

    // ----------------------------------------------------------------
    // Legacy (v1) encoding
    // ----------------------------------------------------------------

    #[test]
    fn legacy_encoding_stores_overlapping_tombstones() {
        init_tracing();
        let fs = MemFs::new();
        let meta = build(
            &fs,
            "t.sst",
            legacy(),
            &[("a.RANGEDEL.5", "e"), ("c.RANGEDEL.7", "g"), ("c.RANGEDEL.9", "d")],
        );
        assert!(meta.has_range_keys());

        let reader = open(&fs, "t.sst", ReaderOptions::default());
        assert!(reader.meta_index().contains_key("range-del"));
        assert!(!reader.meta_index().contains_key("range-del.v2"));
        assert_eq!(tombstones(&reader), ["a-e#5", "c-d#9", "c-g#7"]);
    }

    #[test]
    fn legacy_encoding_rejects_decreasing_starts() {
        let fs = MemFs::new();
        let mut w = Writer::new(fs.create("t.sst").unwrap(), legacy()).unwrap();
        w.delete_range(b"m", b"p").unwrap();
        assert!(matches!(
            w.delete_range(b"c", b"d"),
            Err(SSTableError::KeysOutOfOrder { .. })
        ));
    }

    // ----------------------------------------------------------------
    // RangeDelIter positioning
    // ----------------------------------------------------------------

    #[test]
    fn range_del_iter_positions() {
        let fs = MemFs::new();
        build(
            &fs,
            "t.sst",
            WriterOptions::default(),
            &[
                ("a.RANGEDEL.5", "c"),
                ("c.RANGEDEL.7", "e"),
                ("c.RANGEDEL.5", "e"),
                ("e.RANGEDEL.7", "g"),
            ],
        );
        let reader = open(&fs, "t.sst", ReaderOptions::default());
        let mut iter = reader.range_del_iter().unwrap().unwrap();
        assert_eq!(iter.len(), 4);
        assert!(!iter.valid());

        assert!(iter.next());
        assert_eq!(current(&iter), "a-c#5");
        assert!(iter.last());
        assert_eq!(current(&iter), "e-g#7");
        assert!(!iter.next());
        assert!(iter.prev());
        assert_eq!(current(&iter), "e-g#7");

        assert!(iter.seek_ge(b"d"));
        assert_eq!(current(&iter), "c-e#7");
        assert!(iter.seek_ge(b"c"));
        assert_eq!(current(&iter), "c-e#7");
        assert!(!iter.seek_ge(b"g"));
        assert!(iter.prev());
        assert_eq!(current(&iter), "e-g#7");

        assert!(iter.seek_lt(b"c"));
        assert_eq!(current(&iter), "a-c#5");
        assert!(iter.seek_lt(b"d"));
        assert_eq!(current(&iter), "c-e#5");
        assert!(!iter.seek_lt(b"a"));
        assert!(iter.next());
        assert_eq!(current(&iter), "a-c#5");
        assert!(!iter.prev());
    }

    #[test]
    fn tombstones_only_table() {
        let fs = MemFs::new();
        let meta = build(&fs, "t.sst", WriterOptions::default(), &[("b.RANGEDEL.3", "k")]);
        assert!(!meta.has_point_keys());
        assert_eq!((meta.smallest_seq_num, meta.largest_seq_num), (3, 3));

        let reader = open(&fs, "t.sst", ReaderOptions::default());
        assert!(!reader.iter(None, None).first().unwrap());
        let iter = reader.range_del_iter().unwrap().unwrap();
        let tombstone = &iter.tombstones()[0];
        assert!(tombstone.contains(&BytewiseComparator, b"j"));
        assert!(!tombstone.contains(&BytewiseComparator, b"k"));
    }
}
