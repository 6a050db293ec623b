//! Encode / Decode implementations for table structures.
//!
//! The types themselves live in `super`; this file holds only their wire
//! format.

use crate::encoding::{self, Decode, Encode, EncodingError};

use super::{BlockHandle, Properties};
use crate::rangedel::Fragment;

// ------------------------------------------------------------------------------------------------
// BlockHandle: [offset varint][length varint]
// ------------------------------------------------------------------------------------------------

impl Encode for BlockHandle {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::encode_uvarint(self.offset, buf);
        encoding::encode_uvarint(self.length, buf);
        Ok(())
    }
}

impl Decode for BlockHandle {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (offset, n) = encoding::decode_uvarint(&buf[off..])?;
        off += n;
        let (length, n) = encoding::decode_uvarint(&buf[off..])?;
        off += n;
        Ok((Self { offset, length }, off))
    }
}

// ------------------------------------------------------------------------------------------------
// Properties
// ------------------------------------------------------------------------------------------------

impl Encode for Properties {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.format_version.encode_to(buf)?;
        self.comparator_name.encode_to(buf)?;
        self.filter_policy_name.encode_to(buf)?;
        self.compression_name.encode_to(buf)?;
        self.num_entries.encode_to(buf)?;
        self.num_deletions.encode_to(buf)?;
        self.num_range_deletions.encode_to(buf)?;
        self.num_data_blocks.encode_to(buf)?;
        self.index_partitions.encode_to(buf)?;
        self.index_size.encode_to(buf)?;
        self.top_level_index_size.encode_to(buf)?;
        self.filter_size.encode_to(buf)?;
        self.data_size.encode_to(buf)?;
        self.raw_key_size.encode_to(buf)?;
        self.raw_value_size.encode_to(buf)?;
        self.smallest_point_key.encode_to(buf)?;
        self.largest_point_key.encode_to(buf)?;
        self.smallest_seq_num.encode_to(buf)?;
        self.largest_seq_num.encode_to(buf)?;
        self.creation_time.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for Properties {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (format_version, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (comparator_name, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (filter_policy_name, n) = Option::<String>::decode_from(&buf[off..])?;
        off += n;
        let (compression_name, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (num_entries, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (num_deletions, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (num_range_deletions, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (num_data_blocks, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (index_partitions, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (index_size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (top_level_index_size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (filter_size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (data_size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (raw_key_size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (raw_value_size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (smallest_point_key, n) = Option::<Vec<u8>>::decode_from(&buf[off..])?;
        off += n;
        let (largest_point_key, n) = Option::<Vec<u8>>::decode_from(&buf[off..])?;
        off += n;
        let (smallest_seq_num, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (largest_seq_num, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (creation_time, n) = u64::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                format_version,
                comparator_name,
                filter_policy_name,
                compression_name,
                num_entries,
                num_deletions,
                num_range_deletions,
                num_data_blocks,
                index_partitions,
                index_size,
                top_level_index_size,
                filter_size,
                data_size,
                raw_key_size,
                raw_value_size,
                smallest_point_key,
                largest_point_key,
                smallest_seq_num,
                largest_seq_num,
                creation_time,
            },
            off,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Range-deletion v2 fragment value:
// [end_len varint][end][count varint][seq_num u64_le × count]
// ------------------------------------------------------------------------------------------------

/// Encode the value half of a v2 range-deletion entry. The fragment start
/// is the entry key.
pub(crate) fn encode_fragment_value(
    fragment: &Fragment,
    buf: &mut Vec<u8>,
) -> Result<(), EncodingError> {
    encoding::encode_uvarint(fragment.end.len() as u64, buf);
    buf.extend_from_slice(&fragment.end);
    encoding::encode_uvarint(fragment.seq_nums.len() as u64, buf);
    for seq in &fragment.seq_nums {
        seq.encode_to(buf)?;
    }
    Ok(())
}

/// Decode a v2 range-deletion value into `(end, seq_nums)`. The whole of
/// `buf` must be consumed.
pub(crate) fn decode_fragment_value(buf: &[u8]) -> Result<(Vec<u8>, Vec<u64>), EncodingError> {
    let mut off = 0;
    let (end_len, n) = encoding::decode_uvarint(buf)?;
    off += n;
    let end_len = usize::try_from(end_len)
        .map_err(|_| EncodingError::LengthOverflow(format!("end key length {end_len}")))?;
    let end = buf
        .get(off..)
        .and_then(|rest| rest.get(..end_len))
        .ok_or(EncodingError::UnexpectedEof {
            needed: end_len,
            available: buf.len().saturating_sub(off),
        })?
        .to_vec();
    off += end_len;

    let (count, n) = encoding::decode_uvarint(&buf[off..])?;
    off += n;
    let remaining = buf.len() - off;
    if count.saturating_mul(8) != remaining as u64 {
        return Err(EncodingError::LengthOverflow(format!(
            "{count} sequence numbers in {remaining} bytes"
        )));
    }
    let mut seq_nums = Vec::with_capacity(remaining / 8);
    for _ in 0..count {
        let (seq, n) = u64::decode_from(&buf[off..])?;
        off += n;
        seq_nums.push(seq);
    }
    Ok((end, seq_nums))
}
