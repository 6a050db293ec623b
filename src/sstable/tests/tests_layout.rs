//! Layout introspection: block positions and their rendering.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::sstable::tests::helpers::{build_numbered, init_tracing, open};
    use crate::sstable::{
        BloomFilterPolicy, Layout, ReaderOptions, TableFormat, Writer, WriterOptions,
    };
    use crate::vfs::{FileSystem, MemFs};

    fn assert_contiguous(layout: &Layout, size: u64) {
        let blocks = layout.blocks();
        for pair in blocks.windows(2) {
            let ((name, handle), (next_name, next)) = (&pair[0], &pair[1]);
            assert_eq!(
                handle.end_with_trailer(),
                next.offset,
                "{name} {handle} is not followed by {next_name} {next}"
            );
        }
        assert_eq!(blocks[0].1.offset, 0);
        assert_eq!(layout.file_size(), size);
    }

    /// # Scenario
    /// Every block of a table with a filter and tombstones is accounted for.
    ///
    /// # Starting environment
    /// 100 keys in small blocks, a bloom filter, one tombstone.
    ///
    /// # Actions
    /// 1. Read the layout.
    ///
    /// # Expected behavior
    /// Blocks tile the file from offset 0 to the end with nothing between
    /// them, in write order: data, filter, index, range-del, properties,
    /// meta-index, footer.
    #[test]
    fn blocks_tile_the_file_in_write_order() {
        init_tracing();
        let fs = MemFs::new();
        let opts = WriterOptions {
            block_size: 128,
            filter_policy: Some(Arc::new(BloomFilterPolicy::default())),
            ..Default::default()
        };
        let mut w = Writer::new(fs.create("t.sst").unwrap(), opts).unwrap();
        for i in 0..100 {
            w.set(format!("key{i:03}").as_bytes(), b"value").unwrap();
        }
        w.delete_range(b"a", b"b").unwrap();
        w.close().unwrap();
        let size = w.metadata().unwrap().size;

        let layout = open(&fs, "t.sst", ReaderOptions::default()).layout().unwrap();
        assert_contiguous(&layout, size);
        assert_eq!(layout.format, TableFormat::V2);
        assert!(layout.data.len() > 1);
        assert_eq!(layout.filter.as_ref().unwrap().0, "filter.bloom");
        assert!(layout.range_del.is_some());
        assert_eq!(layout.footer.length, 53);

        let names: Vec<String> = layout
            .blocks()
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| name != "data")
            .collect();
        assert_eq!(
            names,
            ["filter.bloom", "index", "range-del.v2", "properties", "meta-index", "footer"]
        );
    }

    #[test]
    fn partitioned_index_layout() {
        let fs = MemFs::new();
        let opts = WriterOptions {
            block_size: 64,
            index_block_size: 64,
            ..Default::default()
        };
        build_numbered(&fs, "t.sst", opts, 300);
        let reader = open(&fs, "t.sst", ReaderOptions::default());
        let layout = reader.layout().unwrap();
        assert_contiguous(&layout, reader.size());

        let blocks = layout.blocks();
        let top = blocks.iter().position(|(n, _)| n == "top-index").unwrap();
        let last_partition = blocks.iter().rposition(|(n, _)| n == "index").unwrap();
        assert_eq!(top, last_partition + 1);
    }

    #[test]
    fn legacy_layout() {
        let fs = MemFs::new();
        let opts = WriterOptions {
            table_format: TableFormat::LevelDb,
            ..Default::default()
        };
        build_numbered(&fs, "t.sst", opts, 10);
        let reader = open(&fs, "t.sst", ReaderOptions::default());
        let layout = reader.layout().unwrap();
        assert_contiguous(&layout, reader.size());
        assert_eq!(layout.footer.length, 48);
        assert!(layout.filter.is_none());
        assert!(layout.range_del.is_none());
    }

    #[test]
    fn display_renders_one_line_per_block() {
        let fs = MemFs::new();
        build_numbered(&fs, "t.sst", WriterOptions::default(), 10);
        let reader = open(&fs, "t.sst", ReaderOptions::default());
        let layout = reader.layout().unwrap();
        let text = layout.to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), layout.blocks().len() + 1);
        assert!(lines[0].starts_with("         0  data ("));
        assert_eq!(lines.last().unwrap().trim(), format!("{}  EOF", reader.size()));
    }
}
