//! Internal key encoding, text form, and kind decoding.

#[cfg(test)]
mod tests {
    use crate::key::{InternalKey, InternalKeyKind, KeyParseError, SEQ_NUM_MAX, TRAILER_LEN};

    /// # Scenario
    /// Encode a key and inspect the raw trailer bytes.
    ///
    /// # Expected behavior
    /// The trailer is `(seq << 8) | kind` in little-endian after the user key.
    #[test]
    fn trailer_layout() {
        let key = InternalKey::new(b"ab".to_vec(), 7, InternalKeyKind::Set);
        let encoded = key.encode();
        assert_eq!(encoded.len(), 2 + TRAILER_LEN);
        assert_eq!(&encoded[..2], b"ab");
        assert_eq!(&encoded[2..], &((7u64 << 8) | 1).to_le_bytes());
        assert_eq!(InternalKey::decode(&encoded).unwrap(), key);
    }

    #[test]
    fn decode_rejects_short_and_unknown_kind() {
        assert_eq!(
            InternalKey::decode(b"abc").unwrap_err(),
            KeyParseError::TooShort(3)
        );

        let mut encoded = b"k".to_vec();
        encoded.extend_from_slice(&((3u64 << 8) | 9).to_le_bytes());
        assert_eq!(
            InternalKey::decode(&encoded).unwrap_err(),
            KeyParseError::UnknownKind(9)
        );
    }

    #[test]
    fn seq_num_is_clamped() {
        let key = InternalKey::new(b"k".to_vec(), u64::MAX, InternalKeyKind::Set);
        assert_eq!(key.seq_num, SEQ_NUM_MAX);
    }

    #[test]
    fn parse_and_display() {
        let key = InternalKey::parse("a.SET.1").unwrap();
        assert_eq!(key, InternalKey::new(b"a".to_vec(), 1, InternalKeyKind::Set));
        assert_eq!(key.to_string(), "a#1,SET");

        let key = InternalKey::parse("x.y.RANGEDEL.42").unwrap();
        assert_eq!(key.user_key, b"x.y");
        assert_eq!(key.kind, InternalKeyKind::RangeDelete);
        assert_eq!(key.seq_num, 42);

        assert_eq!(InternalKey::parse("b.DEL.0").unwrap().to_string(), "b#0,DEL");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["a", "a.SET", "a.PUT.1", "a.SET.x", "a.SET.-1"] {
            assert!(
                matches!(InternalKey::parse(bad), Err(KeyParseError::Malformed(_))),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn sentinel_and_seek_keys() {
        let sentinel = InternalKey::range_delete_sentinel(b"z".to_vec());
        assert_eq!(sentinel.seq_num, SEQ_NUM_MAX);
        assert_eq!(sentinel.kind, InternalKeyKind::RangeDelete);

        let seek = InternalKey::seek_key(b"z".to_vec());
        assert_eq!(seek.trailer(), u64::MAX);
    }

    #[test]
    fn kind_try_from_roundtrip() {
        for kind in [
            InternalKeyKind::Delete,
            InternalKeyKind::Set,
            InternalKeyKind::Merge,
            InternalKeyKind::RangeDelete,
            InternalKeyKind::Max,
        ] {
            assert_eq!(InternalKeyKind::try_from(kind as u8).unwrap(), kind);
        }
    }
}
