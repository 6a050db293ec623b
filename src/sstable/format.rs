//! Table formats, checksums, compression, and the footer.
//!
//! # Footer layouts
//!
//! ```text
//! LevelDb (48 bytes):
//! [METAINDEX_HANDLE][INDEX_HANDLE][ZERO_PADDING → 40 B][MAGIC_U64_LE]
//!
//! V2 (53 bytes):
//! [CHECKSUM_TYPE_U8][METAINDEX_HANDLE][INDEX_HANDLE][ZERO_PADDING → 41 B]
//! [FORMAT_VERSION_U32_LE][MAGIC 8 B]
//! ```
//!
//! Handles are two LEB128 varints each. The last eight bytes of the file
//! identify the format; anything else is not a table.

use std::fmt;

use super::{BlockHandle, SSTableError};
use crate::encoding::{Decode, Encode, EncodingError, MAX_VARINT_LEN};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Magic number of the legacy footer, stored little-endian.
pub const LEVELDB_MAGIC: u64 = 0xdb47_7524_8b80_fb57;

/// Magic bytes of the current footer.
pub const V2_MAGIC: [u8; 8] = *b"\xf0\x9f\xaa\xb3\xf0\x9f\xaa\xb3";

/// Size of the magic number in both footers.
pub const MAGIC_LEN: usize = 8;

/// Legacy footer length.
pub const LEVELDB_FOOTER_LEN: usize = 48;

/// Current footer length.
pub const V2_FOOTER_LEN: usize = 53;

/// Version stamped into current-format footers.
pub const V2_FORMAT_VERSION: u32 = 2;

/// Compression byte plus checksum after every block.
pub const BLOCK_TRAILER_LEN: usize = 5;

/// Upper bound on the encoded size of one [`BlockHandle`].
pub const MAX_BLOCK_HANDLE_LEN: usize = 2 * MAX_VARINT_LEN;

const LEVELDB_HANDLES_REGION: usize = LEVELDB_FOOTER_LEN - MAGIC_LEN;
const V2_HANDLES_REGION: usize = V2_FOOTER_LEN - MAGIC_LEN - 4;

// ------------------------------------------------------------------------------------------------
// TableFormat
// ------------------------------------------------------------------------------------------------

/// On-disk format of a table, chosen once when the writer is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TableFormat {
    /// LevelDB-compatible: masked CRC32C, v1 range deletions, 48-byte
    /// footer, single-level index only.
    LevelDb,
    /// Current format: CRC32, v2 range deletions, 53-byte footer,
    /// optional two-level index.
    #[default]
    V2,
}

/// Encoding of the range-deletion block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDelEncoding {
    /// Ordinary block entries `start internal key → end user key`.
    V1,
    /// One entry per fragment `start → (end, seqnums)`.
    V2,
}

impl RangeDelEncoding {
    /// Meta-index name of the block.
    pub fn block_name(self) -> &'static str {
        match self {
            RangeDelEncoding::V1 => "range-del",
            RangeDelEncoding::V2 => "range-del.v2",
        }
    }
}

impl TableFormat {
    /// Checksum algorithm used in block trailers.
    pub fn checksum_type(self) -> ChecksumType {
        match self {
            TableFormat::LevelDb => ChecksumType::Crc32c,
            TableFormat::V2 => ChecksumType::Crc32,
        }
    }

    /// Range-deletion block encoding.
    pub fn range_del_encoding(self) -> RangeDelEncoding {
        match self {
            TableFormat::LevelDb => RangeDelEncoding::V1,
            TableFormat::V2 => RangeDelEncoding::V2,
        }
    }

    /// Footer length in bytes.
    pub fn footer_len(self) -> usize {
        match self {
            TableFormat::LevelDb => LEVELDB_FOOTER_LEN,
            TableFormat::V2 => V2_FOOTER_LEN,
        }
    }

    /// Whether the writer may partition the index.
    pub fn supports_two_level_index(self) -> bool {
        matches!(self, TableFormat::V2)
    }

    /// Version number recorded in the properties block.
    pub fn version(self) -> u32 {
        match self {
            TableFormat::LevelDb => 0,
            TableFormat::V2 => V2_FORMAT_VERSION,
        }
    }

    /// Identify the format from the last eight bytes of a file.
    pub fn from_magic(magic: &[u8]) -> Option<Self> {
        if magic == LEVELDB_MAGIC.to_le_bytes() {
            Some(TableFormat::LevelDb)
        } else if magic == V2_MAGIC {
            Some(TableFormat::V2)
        } else {
            None
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFormat::LevelDb => f.write_str("leveldb"),
            TableFormat::V2 => f.write_str("v2"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// ChecksumType
// ------------------------------------------------------------------------------------------------

/// Block trailer checksum algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChecksumType {
    /// CRC32C (Castagnoli), masked as in LevelDB.
    Crc32c = 1,
    /// CRC32 (IEEE).
    Crc32 = 2,
}

impl ChecksumType {
    /// Checksum of `block ++ [compression]`.
    pub fn compute(self, block: &[u8], compression: u8) -> u32 {
        match self {
            ChecksumType::Crc32c => {
                let crc = crc32c::crc32c_append(crc32c::crc32c(block), &[compression]);
                mask_crc(crc)
            }
            ChecksumType::Crc32 => {
                let mut hasher = crc32fast::Hasher::new();
                hasher.update(block);
                hasher.update(&[compression]);
                hasher.finalize()
            }
        }
    }
}

impl TryFrom<u8> for ChecksumType {
    type Error = SSTableError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ChecksumType::Crc32c),
            2 => Ok(ChecksumType::Crc32),
            other => Err(SSTableError::UnsupportedFormat(format!(
                "unknown checksum type {other}"
            ))),
        }
    }
}

/// LevelDB checksum masking.
fn mask_crc(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(0xa282_ead8)
}

// ------------------------------------------------------------------------------------------------
// CompressionType
// ------------------------------------------------------------------------------------------------

/// Per-block compression recorded in the block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// Stored as-is.
    None = 0,
    /// Snappy raw block format.
    #[default]
    Snappy = 1,
}

impl CompressionType {
    /// Name recorded in the properties block.
    pub fn name(self) -> &'static str {
        match self {
            CompressionType::None => "NoCompression",
            CompressionType::Snappy => "Snappy",
        }
    }
}

impl TryFrom<u8> for CompressionType {
    type Error = SSTableError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Snappy),
            other => Err(SSTableError::CorruptBlock(format!(
                "unknown compression type {other}"
            ))),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Footer
// ------------------------------------------------------------------------------------------------

/// Fixed-size trailer anchoring every other block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Format identified by the magic number.
    pub format: TableFormat,
    /// Checksum algorithm of block trailers.
    pub checksum: ChecksumType,
    /// Location of the meta-index block.
    pub meta_index: BlockHandle,
    /// Location of the index block, or of the top-level index.
    pub index: BlockHandle,
}

impl Footer {
    /// Footer for a new table.
    pub fn new(format: TableFormat, meta_index: BlockHandle, index: BlockHandle) -> Self {
        Self {
            format,
            checksum: format.checksum_type(),
            meta_index,
            index,
        }
    }

    /// Encode to exactly [`TableFormat::footer_len`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>, SSTableError> {
        let mut buf = Vec::with_capacity(self.format.footer_len());
        match self.format {
            TableFormat::LevelDb => {
                self.meta_index.encode_to(&mut buf)?;
                self.index.encode_to(&mut buf)?;
                buf.resize(LEVELDB_HANDLES_REGION, 0);
                buf.extend_from_slice(&LEVELDB_MAGIC.to_le_bytes());
            }
            TableFormat::V2 => {
                buf.push(self.checksum as u8);
                self.meta_index.encode_to(&mut buf)?;
                self.index.encode_to(&mut buf)?;
                buf.resize(V2_HANDLES_REGION, 0);
                V2_FORMAT_VERSION.encode_to(&mut buf)?;
                buf.extend_from_slice(&V2_MAGIC);
            }
        }
        Ok(buf)
    }

    /// Decode a footer whose magic has already identified `format`.
    ///
    /// `buf` must be exactly the footer bytes.
    pub fn decode(format: TableFormat, buf: &[u8]) -> Result<Self, SSTableError> {
        if buf.len() != format.footer_len() {
            return Err(SSTableError::CorruptFooter(format!(
                "footer is {} bytes, expected {}",
                buf.len(),
                format.footer_len()
            )));
        }
        let (checksum, handles) = match format {
            TableFormat::LevelDb => (ChecksumType::Crc32c, &buf[..LEVELDB_HANDLES_REGION]),
            TableFormat::V2 => {
                let checksum = ChecksumType::try_from(buf[0])?;
                let (version, _) = u32::decode_from(&buf[V2_HANDLES_REGION..])?;
                if version != V2_FORMAT_VERSION {
                    return Err(SSTableError::UnsupportedFormat(format!(
                        "format version {version}"
                    )));
                }
                (checksum, &buf[1..V2_HANDLES_REGION])
            }
        };

        let corrupt =
            |e: EncodingError| SSTableError::CorruptFooter(format!("bad block handle: {e}"));
        let (meta_index, n) = BlockHandle::decode_from(handles).map_err(corrupt)?;
        let (index, _) = BlockHandle::decode_from(&handles[n..]).map_err(corrupt)?;

        Ok(Self {
            format,
            checksum,
            meta_index,
            index,
        })
    }
}
