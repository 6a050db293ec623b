//! Length-prefix limits: MAX_BYTE_LEN and LengthOverflow error paths.

use crate::encoding::*;

#[test]
fn vec_u8_decode_exceeds_max_byte_len() {
    let buf = (MAX_BYTE_LEN + 1).to_le_bytes();
    let err = decode_from_slice::<Vec<u8>>(&buf).unwrap_err();
    assert!(
        matches!(err, EncodingError::LengthOverflow(_)),
        "expected LengthOverflow, got: {err:?}"
    );
}

#[test]
fn vec_u8_decode_at_max_byte_len_needs_data() {
    let buf = MAX_BYTE_LEN.to_le_bytes();
    let err = decode_from_slice::<Vec<u8>>(&buf).unwrap_err();
    assert!(matches!(err, EncodingError::UnexpectedEof { .. }));
}

#[test]
fn string_decode_exceeds_max_byte_len() {
    let buf = (MAX_BYTE_LEN + 1).to_le_bytes();
    let err = decode_from_slice::<String>(&buf).unwrap_err();
    assert!(matches!(err, EncodingError::LengthOverflow(_)));
}

#[test]
fn vec_u8_decode_u32_max_length() {
    let buf = u32::MAX.to_le_bytes();
    let err = decode_from_slice::<Vec<u8>>(&buf).unwrap_err();
    assert!(matches!(err, EncodingError::LengthOverflow(_)));
}
