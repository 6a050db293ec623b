//! Table-level statistics stored in the properties block.

use std::fmt;

/// Statistics gathered by the writer during its single pass and written
/// once at close.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// Format version, see [`TableFormat::version`](super::TableFormat::version).
    pub format_version: u32,
    /// Name of the user comparator.
    pub comparator_name: String,
    /// Name of the filter policy, if a filter block was written.
    pub filter_policy_name: Option<String>,
    /// Name of the configured block compression.
    pub compression_name: String,

    /// Point entries, deletions included.
    pub num_entries: u64,
    /// Point deletions.
    pub num_deletions: u64,
    /// Range tombstones, counted per sequence number.
    pub num_range_deletions: u64,
    /// Data blocks.
    pub num_data_blocks: u64,
    /// Index partitions; zero for a single-level index.
    pub index_partitions: u64,

    /// Bytes of index blocks (partitions only for a two-level index).
    pub index_size: u64,
    /// Bytes of the top-level index; zero for a single-level index.
    pub top_level_index_size: u64,
    /// Bytes of the filter block.
    pub filter_size: u64,
    /// Bytes of data blocks, trailers included.
    pub data_size: u64,
    /// Sum of encoded internal key lengths of point entries.
    pub raw_key_size: u64,
    /// Sum of point value lengths.
    pub raw_value_size: u64,

    /// Smallest point user key.
    pub smallest_point_key: Option<Vec<u8>>,
    /// Largest point user key.
    pub largest_point_key: Option<Vec<u8>>,
    /// Smallest sequence number over points and tombstones.
    pub smallest_seq_num: u64,
    /// Largest sequence number over points and tombstones.
    pub largest_seq_num: u64,

    /// Creation time, nanoseconds since the UNIX epoch.
    pub creation_time: u64,
}

impl Properties {
    /// Whether the index is partitioned.
    pub fn is_two_level_index(&self) -> bool {
        self.index_partitions > 0
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = |k: &Option<Vec<u8>>| {
            k.as_deref()
                .map(|k| String::from_utf8_lossy(k).into_owned())
                .unwrap_or_default()
        };
        writeln!(f, "format.version: {}", self.format_version)?;
        writeln!(f, "comparator: {}", self.comparator_name)?;
        writeln!(
            f,
            "filter.policy: {}",
            self.filter_policy_name.as_deref().unwrap_or("")
        )?;
        writeln!(f, "compression: {}", self.compression_name)?;
        writeln!(f, "num.entries: {}", self.num_entries)?;
        writeln!(f, "num.deletions: {}", self.num_deletions)?;
        writeln!(f, "num.range-deletions: {}", self.num_range_deletions)?;
        writeln!(f, "num.data-blocks: {}", self.num_data_blocks)?;
        writeln!(f, "index.partitions: {}", self.index_partitions)?;
        writeln!(f, "index.size: {}", self.index_size)?;
        writeln!(f, "index.top-level.size: {}", self.top_level_index_size)?;
        writeln!(f, "filter.size: {}", self.filter_size)?;
        writeln!(f, "data.size: {}", self.data_size)?;
        writeln!(f, "raw.key.size: {}", self.raw_key_size)?;
        writeln!(f, "raw.value.size: {}", self.raw_value_size)?;
        writeln!(
            f,
            "point.keys: [{}, {}]",
            key(&self.smallest_point_key),
            key(&self.largest_point_key)
        )?;
        write!(
            f,
            "seqnums: [{}, {}]",
            self.smallest_seq_num, self.largest_seq_num
        )
    }
}
