//! Tests for `Option<T>`, the shape of the optional properties fields.

use crate::encoding::*;

#[test]
fn filter_name_present() {
    let val = Some("rocksdb.BuiltinBloomFilter".to_string());
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes[0], 1);
    let (decoded, consumed) = decode_from_slice::<Option<String>>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, bytes.len());
}

#[test]
fn absent_point_key_is_one_tag_byte() {
    let val: Option<Vec<u8>> = None;
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, [0]);
    let (decoded, consumed) = decode_from_slice::<Option<Vec<u8>>>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, 1);
}

#[test]
fn present_point_key_is_length_prefixed() {
    let val = Some(b"apple".to_vec());
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, [1, 5, 0, 0, 0, b'a', b'p', b'p', b'l', b'e']);
}

#[test]
fn unknown_tag_is_rejected() {
    let err = decode_from_slice::<Option<u32>>(&[5]).unwrap_err();
    assert!(matches!(err, EncodingError::InvalidTag { tag: 5, .. }));
}

#[test]
fn some_with_truncated_payload() {
    let err = decode_from_slice::<Option<u64>>(&[1, 0, 0]).unwrap_err();
    assert!(matches!(err, EncodingError::UnexpectedEof { needed: 8, available: 2 }));
}
