//! Reader tests: open, point lookups, filters, comparators, formats.

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;
    use std::sync::Arc;

    use crate::key::{Comparator, InternalKeyKind};
    use crate::sstable::tests::helpers::{build, build_numbered, init_tracing, open, scan};
    use crate::sstable::{
        BloomFilterPolicy, CompressionType, FilterPolicy, Reader, ReaderOptions, SSTableError,
        TableFormat, WriterOptions,
    };
    use crate::vfs::{FileSystem, MemFs};

    /// Orders keys from largest to smallest.
    struct ReverseComparator;

    impl Comparator for ReverseComparator {
        fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
            b.cmp(a)
        }

        fn name(&self) -> &str {
            "test.ReverseBytewise"
        }

        fn separator(&self, start: &[u8], _limit: &[u8]) -> Vec<u8> {
            start.to_vec()
        }

        fn successor(&self, key: &[u8]) -> Vec<u8> {
            key.to_vec()
        }
    }

    fn bloom() -> Option<Arc<dyn FilterPolicy>> {
        Some(Arc::new(BloomFilterPolicy::default()))
    }

    // ----------------------------------------------------------------
    // Round trip
    // ----------------------------------------------------------------

    #[test]
    fn many_blocks_round_trip() {
        init_tracing();
        let fs = MemFs::new();
        let opts = WriterOptions {
            block_size: 256,
            ..Default::default()
        };
        build_numbered(&fs, "t.sst", opts, 1000);

        let reader = open(&fs, "t.sst", ReaderOptions::default());
        assert!(reader.properties().num_data_blocks > 10);

        let entries = scan(&mut reader.iter(None, None));
        assert_eq!(entries.len(), 1000);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry, &format!("key{:05}#1,SET=value{:05}", i * 2, i * 2));
        }
    }

    #[test]
    fn both_formats_and_compressions_read_back() {
        for format in [TableFormat::LevelDb, TableFormat::V2] {
            for compression in [CompressionType::None, CompressionType::Snappy] {
                let fs = MemFs::new();
                let opts = WriterOptions {
                    table_format: format,
                    compression,
                    block_size: 128,
                    ..Default::default()
                };
                build_numbered(&fs, "t.sst", opts, 200);

                let reader = open(&fs, "t.sst", ReaderOptions::default());
                assert_eq!(reader.format(), format);
                assert_eq!(reader.properties().compression_name, compression.name());
                assert_eq!(scan(&mut reader.iter(None, None)).len(), 200);
                let (_, value) = reader.get(b"key00100").unwrap().unwrap();
                assert_eq!(value, b"value00100");
            }
        }
    }

    #[test]
    fn snappy_shrinks_repetitive_values() {
        let sizes: Vec<u64> = [CompressionType::None, CompressionType::Snappy]
            .into_iter()
            .map(|compression| {
                let fs = MemFs::new();
                let opts = WriterOptions {
                    compression,
                    ..Default::default()
                };
                let value = "x".repeat(200);
                let keys: Vec<String> = (0..100).map(|i| format!("k{i:03}.SET.1")).collect();
                let entries: Vec<(&str, &str)> =
                    keys.iter().map(|k| (k.as_str(), value.as_str())).collect();
                build(&fs, "t.sst", opts, &entries).size
            })
            .collect();
        assert!(sizes[1] < sizes[0] / 2, "{sizes:?}");
    }

    // ----------------------------------------------------------------
    // Point lookups
    // ----------------------------------------------------------------

    /// # Scenario
    /// Point lookups over keys with several versions and a deletion.
    ///
    /// # Starting environment
    /// Table with `a#5 = new`, `a#2 = old`, `b#4 DEL`, `b#1 = gone`,
    /// `d#3 = d`.
    ///
    /// # Actions
    /// 1. `get` each of `a`, `b`, `c`, `d`, `e`.
    ///
    /// # Expected behavior
    /// The newest version is returned, a deletion included; absent keys
    /// return `None`.
    #[test]
    fn get_returns_newest_version() {
        init_tracing();
        let fs = MemFs::new();
        build(
            &fs,
            "t.sst",
            WriterOptions::default(),
            &[
                ("a.SET.5", "new"),
                ("a.SET.2", "old"),
                ("b.DEL.4", ""),
                ("b.SET.1", "gone"),
                ("d.SET.3", "d"),
            ],
        );
        let reader = open(&fs, "t.sst", ReaderOptions::default());

        let (key, value) = reader.get(b"a").unwrap().unwrap();
        assert_eq!((key.seq_num, value.as_slice()), (5, &b"new"[..]));

        let (key, _) = reader.get(b"b").unwrap().unwrap();
        assert_eq!(key.kind, InternalKeyKind::Delete);
        assert_eq!(key.seq_num, 4);

        assert!(reader.get(b"c").unwrap().is_none());
        assert_eq!(reader.get(b"d").unwrap().unwrap().1, b"d");
        assert!(reader.get(b"e").unwrap().is_none());
        assert!(reader.get(b"").unwrap().is_none());
    }

    #[test]
    fn get_across_many_blocks() {
        let fs = MemFs::new();
        let opts = WriterOptions {
            block_size: 64,
            ..Default::default()
        };
        build_numbered(&fs, "t.sst", opts, 500);
        let reader = open(&fs, "t.sst", ReaderOptions::default());

        for i in 0..1000 {
            let key = format!("key{i:05}");
            let got = reader.get(key.as_bytes()).unwrap();
            if i % 2 == 0 {
                assert_eq!(got.unwrap().1, format!("value{i:05}").into_bytes());
            } else {
                assert!(got.is_none(), "{key}");
            }
        }
    }

    // ----------------------------------------------------------------
    // Filters
    // ----------------------------------------------------------------

    /// # Scenario
    /// A bloom filter written with the table is used for lookups.
    ///
    /// # Starting environment
    /// 500 keys written with the bloom policy.
    ///
    /// # Actions
    /// 1. Open with the same policy; probe present and absent keys.
    /// 2. Open without a policy.
    ///
    /// # Expected behavior
    /// Present keys always pass; absent keys are mostly rejected. Without
    /// a policy the filter is ignored.
    #[test]
    fn bloom_filter_prunes_absent_keys() {
        init_tracing();
        let fs = MemFs::new();
        let opts = WriterOptions {
            filter_policy: bloom(),
            ..Default::default()
        };
        build_numbered(&fs, "t.sst", opts, 500);

        let reader = open(
            &fs,
            "t.sst",
            ReaderOptions {
                filter_policy: bloom(),
                ..Default::default()
            },
        );
        assert!(reader.meta_index().contains_key("filter.bloom"));
        assert_eq!(reader.properties().filter_policy_name.as_deref(), Some("bloom"));
        assert!(reader.properties().filter_size > 0);

        for i in 0..500 {
            assert!(reader.may_contain(format!("key{:05}", i * 2).as_bytes()));
        }
        let false_positives = (0..1000)
            .filter(|i| reader.may_contain(format!("absent{i}").as_bytes()))
            .count();
        assert!(false_positives < 100, "{false_positives} false positives");
        assert!(reader.get(b"absent1").unwrap().is_none());
        assert!(reader.get(b"key00002").unwrap().is_some());

        let unfiltered = open(&fs, "t.sst", ReaderOptions::default());
        assert!(unfiltered.may_contain(b"absent1"));
    }

    #[test]
    fn filter_with_other_name_is_ignored() {
        struct OtherPolicy;

        impl FilterPolicy for OtherPolicy {
            fn name(&self) -> &str {
                "other"
            }
            fn new_writer(&self) -> Box<dyn crate::sstable::FilterWriter> {
                BloomFilterPolicy::default().new_writer()
            }
            fn may_contain(&self, _filter: &[u8], _key: &[u8]) -> bool {
                false
            }
        }

        let fs = MemFs::new();
        let opts = WriterOptions {
            filter_policy: bloom(),
            ..Default::default()
        };
        build(&fs, "t.sst", opts, &[("a.SET.1", "1")]);
        let reader = open(
            &fs,
            "t.sst",
            ReaderOptions {
                filter_policy: Some(Arc::new(OtherPolicy)),
                ..Default::default()
            },
        );
        assert!(reader.may_contain(b"a"));
        assert!(reader.get(b"a").unwrap().is_some());
    }

    // ----------------------------------------------------------------
    // Comparators
    // ----------------------------------------------------------------

    #[test]
    fn custom_comparator_orders_the_table() {
        let fs = MemFs::new();
        let opts = WriterOptions {
            comparator: Arc::new(ReverseComparator),
            ..Default::default()
        };
        build(
            &fs,
            "t.sst",
            opts,
            &[("c.SET.1", "3"), ("b.SET.1", "2"), ("a.SET.1", "1")],
        );

        let reader = open(
            &fs,
            "t.sst",
            ReaderOptions {
                comparator: Arc::new(ReverseComparator),
                ..Default::default()
            },
        );
        assert_eq!(reader.properties().comparator_name, "test.ReverseBytewise");
        assert_eq!(
            scan(&mut reader.iter(None, None)),
            ["c#1,SET=3", "b#1,SET=2", "a#1,SET=1"]
        );

        let mut iter = reader.iter(None, None);
        assert!(iter.seek_ge(b"b").unwrap());
        assert_eq!(iter.key().unwrap().user_key, b"b");
        assert!(iter.next().unwrap());
        assert_eq!(iter.key().unwrap().user_key, b"a");
    }

    #[test]
    fn comparator_mismatch_is_rejected() {
        let fs = MemFs::new();
        let opts = WriterOptions {
            comparator: Arc::new(ReverseComparator),
            ..Default::default()
        };
        build(&fs, "t.sst", opts, &[("a.SET.1", "1")]);

        let err = Reader::open(fs.open("t.sst").unwrap(), ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, SSTableError::InvalidOptions(_)), "{err}");
    }

    // ----------------------------------------------------------------
    // Accessors
    // ----------------------------------------------------------------

    #[test]
    fn accessors_report_table_identity() {
        let fs = MemFs::new();
        let meta = build(&fs, "t.sst", WriterOptions::default(), &[("a.SET.1", "1")]);
        let reader = open(&fs, "t.sst", ReaderOptions::default());

        assert_eq!(reader.size(), meta.size);
        assert_eq!(reader.format(), TableFormat::V2);
        assert_eq!(reader.file_num(), None);
        assert!(reader.meta_index().contains_key("properties"));

        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Reader>();
    }
}
