//! Physical block layout of a table, for inspection tools and tests.

use std::fmt;

use super::{BlockHandle, TableFormat};

/// Where every block of a table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// On-disk format.
    pub format: TableFormat,
    /// Data blocks in key order.
    pub data: Vec<BlockHandle>,
    /// The index block, or the partitions of a two-level index.
    pub index: Vec<BlockHandle>,
    /// Top-level index of a two-level index.
    pub top_index: Option<BlockHandle>,
    /// Filter block and its meta-index name.
    pub filter: Option<(String, BlockHandle)>,
    /// Range-deletion block.
    pub range_del: Option<BlockHandle>,
    /// Properties block.
    pub properties: BlockHandle,
    /// Meta-index block.
    pub meta_index: BlockHandle,
    /// Footer; its length is the footer size, with no trailer.
    pub footer: BlockHandle,
}

impl Layout {
    /// Every block with a display name, ordered by offset.
    pub fn blocks(&self) -> Vec<(String, BlockHandle)> {
        let mut blocks: Vec<(String, BlockHandle)> = Vec::new();
        blocks.extend(self.data.iter().map(|h| ("data".to_string(), *h)));
        blocks.extend(self.index.iter().map(|h| ("index".to_string(), *h)));
        if let Some(h) = self.top_index {
            blocks.push(("top-index".to_string(), h));
        }
        if let Some((name, h)) = &self.filter {
            blocks.push((name.clone(), *h));
        }
        if let Some(h) = self.range_del {
            blocks.push((self.format.range_del_encoding().block_name().to_string(), h));
        }
        blocks.push(("properties".to_string(), self.properties));
        blocks.push(("meta-index".to_string(), self.meta_index));
        blocks.push(("footer".to_string(), self.footer));
        blocks.sort_by_key(|(_, h)| h.offset);
        blocks
    }

    /// File size implied by the footer position.
    pub fn file_size(&self) -> u64 {
        self.footer.offset + self.footer.length
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, handle) in self.blocks() {
            writeln!(f, "{:>10}  {name} ({})", handle.offset, handle.length)?;
        }
        writeln!(f, "{:>10}  EOF", self.file_size())
    }
}
