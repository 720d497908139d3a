//! Compact tag/value field encoding used inside binary frames.
//!
//! Every field starts with a varint tag `(field_id << 3) | wire_type`:
//!
//! ```text
//! wire type 0  varint            base-128 groups, low group first, 0x80 = continue
//! wire type 1  fixed 64-bit      8 little-endian bytes
//! wire type 2  length-delimited  varint length, then that many bytes
//! wire type 5  fixed 32-bit      4 little-endian bytes
//! ```
//!
//! Wire types 3 and 4 (group markers) never appear in this protocol and are
//! rejected, as is anything outside the four types above.

use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Largest number of bytes a 64-bit varint can occupy.
pub const MAX_VARINT_LEN: usize = 10;

/// Field wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    /// Resolves a raw wire type, rejecting group markers and unknown values.
    pub fn from_raw(raw: u8, offset: usize) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            other => Err(ProtocolError::UnsupportedWireType {
                wire_type: other,
                offset,
            }),
        }
    }
}

/// A decoded field payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Varint(u64),
    Fixed64(u64),
    Bytes(Bytes),
    Fixed32(u32),
}

impl FieldValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldValue::Varint(_) => WireType::Varint,
            FieldValue::Fixed64(_) => WireType::Fixed64,
            FieldValue::Bytes(_) => WireType::LengthDelimited,
            FieldValue::Fixed32(_) => WireType::Fixed32,
        }
    }

    /// Returns the payload of a length-delimited field.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the numeric payload of a varint or fixed-width field.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Varint(v) | FieldValue::Fixed64(v) => Some(*v),
            FieldValue::Fixed32(v) => Some(u64::from(*v)),
            FieldValue::Bytes(_) => None,
        }
    }
}

/// Decoded fields keyed by field id. A repeated id keeps its last value.
pub type FieldMap = BTreeMap<u32, FieldValue>;

/// Appends `value` as a varint.
pub fn encode_varint(mut value: u64, buf: &mut BytesMut) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Returns the encoded length of `value` in bytes.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Decodes a varint starting at `offset`, returning `(value, bytes_consumed)`.
pub fn decode_varint(buf: &[u8], offset: usize) -> Result<(u64, usize), ProtocolError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    let mut pos = offset;

    loop {
        let byte = *buf
            .get(pos)
            .ok_or(ProtocolError::TruncatedVarint { offset })?;
        pos += 1;

        let group = u64::from(byte & 0x7F);
        // The tenth group may only carry the single remaining bit.
        if shift == 63 && group > 1 {
            return Err(ProtocolError::VarintOverflow { offset });
        }
        value |= group << shift;

        if byte & 0x80 == 0 {
            return Ok((value, pos - offset));
        }

        shift += 7;
        if shift > 63 {
            return Err(ProtocolError::VarintOverflow { offset });
        }
    }
}

/// Appends a field tag.
pub fn encode_tag(field_id: u32, wire_type: WireType, buf: &mut BytesMut) {
    encode_varint((u64::from(field_id) << 3) | wire_type as u64, buf);
}

/// Appends a complete field: tag, then the payload in its wire representation.
pub fn encode_field(field_id: u32, value: &FieldValue, buf: &mut BytesMut) {
    encode_tag(field_id, value.wire_type(), buf);
    match value {
        FieldValue::Varint(v) => encode_varint(*v, buf),
        FieldValue::Fixed64(v) => buf.put_u64_le(*v),
        FieldValue::Bytes(data) => {
            encode_varint(data.len() as u64, buf);
            buf.put_slice(data);
        }
        FieldValue::Fixed32(v) => buf.put_u32_le(*v),
    }
}

/// Appends a length-delimited field.
pub fn encode_bytes_field(field_id: u32, data: &[u8], buf: &mut BytesMut) {
    encode_tag(field_id, WireType::LengthDelimited, buf);
    encode_varint(data.len() as u64, buf);
    buf.put_slice(data);
}

/// Scans `buf` field by field until it is exhausted.
pub fn decode_fields(buf: &[u8]) -> Result<FieldMap, ProtocolError> {
    let mut fields = FieldMap::new();
    let mut pos = 0;

    while pos < buf.len() {
        let tag_offset = pos;
        let (tag, used) = decode_varint(buf, pos)?;
        pos += used;

        let wire_type = WireType::from_raw((tag & 0x07) as u8, tag_offset)?;
        let field = u32::try_from(tag >> 3).map_err(|_| ProtocolError::VarintOverflow {
            offset: tag_offset,
        })?;

        let value = match wire_type {
            WireType::Varint => {
                let (v, used) = decode_varint(buf, pos)?;
                pos += used;
                FieldValue::Varint(v)
            }
            WireType::Fixed64 => {
                let raw = take(buf, pos, 8, field)?;
                pos += 8;
                let mut le = [0u8; 8];
                le.copy_from_slice(raw);
                FieldValue::Fixed64(u64::from_le_bytes(le))
            }
            WireType::LengthDelimited => {
                let (len, used) = decode_varint(buf, pos)?;
                pos += used;
                let len = usize::try_from(len).map_err(|_| ProtocolError::TruncatedField {
                    field,
                    needed: usize::MAX,
                    available: buf.len() - pos,
                })?;
                let raw = take(buf, pos, len, field)?;
                pos += len;
                FieldValue::Bytes(Bytes::copy_from_slice(raw))
            }
            WireType::Fixed32 => {
                let raw = take(buf, pos, 4, field)?;
                pos += 4;
                let mut le = [0u8; 4];
                le.copy_from_slice(raw);
                FieldValue::Fixed32(u32::from_le_bytes(le))
            }
        };

        fields.insert(field, value);
    }

    Ok(fields)
}

fn take(buf: &[u8], pos: usize, len: usize, field: u32) -> Result<&[u8], ProtocolError> {
    let available = buf.len().saturating_sub(pos);
    if available < len {
        return Err(ProtocolError::TruncatedField {
            field,
            needed: len,
            available,
        });
    }
    Ok(&buf[pos..pos + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(value: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_varint(value, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_varint_known_encodings() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(1), vec![0x01]);
        assert_eq!(varint(127), vec![0x7F]);
        assert_eq!(varint(128), vec![0x80, 0x01]);
        assert_eq!(varint(300), vec![0xAC, 0x02]);
        assert_eq!(varint(16_384), vec![0x80, 0x80, 0x01]);
        assert_eq!(varint(u64::MAX).len(), MAX_VARINT_LEN);
    }

    #[test]
    fn test_varint_len_matches_encoding() {
        for value in [0, 1, 127, 128, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            assert_eq!(varint_len(value), varint(value).len(), "value {}", value);
        }
    }

    #[test]
    fn test_decode_varint_at_offset() {
        let buf = [0xFF, 0xAC, 0x02, 0x55];
        assert_eq!(decode_varint(&buf, 1).unwrap(), (300, 2));
    }

    #[test]
    fn test_decode_varint_truncated() {
        let result = decode_varint(&[0x80, 0x80], 0);
        assert!(matches!(result, Err(ProtocolError::TruncatedVarint { offset: 0 })));
    }

    #[test]
    fn test_decode_varint_overflow() {
        let buf = [0xFF; 11];
        assert!(matches!(
            decode_varint(&buf, 0),
            Err(ProtocolError::VarintOverflow { .. })
        ));

        // Ten groups whose last group carries more than one bit.
        let mut buf = vec![0xFF; 9];
        buf.push(0x02);
        assert!(matches!(
            decode_varint(&buf, 0),
            Err(ProtocolError::VarintOverflow { .. })
        ));
    }

    #[test]
    fn test_field_roundtrip_each_wire_type() {
        let cases = [
            (1, FieldValue::Varint(150)),
            (2, FieldValue::Fixed64(0x0102_0304_0506_0708)),
            (3, FieldValue::Bytes(Bytes::from_static(b"<cps:request/>"))),
            (4, FieldValue::Fixed32(0xDEAD_BEEF)),
        ];

        for (id, value) in cases {
            let mut buf = BytesMut::new();
            encode_field(id, &value, &mut buf);
            let fields = decode_fields(&buf).unwrap();
            assert_eq!(fields.len(), 1);
            assert_eq!(fields.get(&id), Some(&value));
        }
    }

    #[test]
    fn test_fixed32_reads_four_bytes_at_current_offset() {
        // tag(1, 5) = 0x0D, followed by a varint field so the offset matters.
        let mut buf = BytesMut::new();
        encode_field(1, &FieldValue::Fixed32(7), &mut buf);
        encode_field(2, &FieldValue::Varint(9), &mut buf);
        assert_eq!(&buf[..5], &[0x0D, 7, 0, 0, 0]);

        let fields = decode_fields(&buf).unwrap();
        assert_eq!(fields[&1], FieldValue::Fixed32(7));
        assert_eq!(fields[&2], FieldValue::Varint(9));
    }

    #[test]
    fn test_group_wire_types_rejected() {
        for wire_type in [3u8, 4, 6, 7] {
            let buf = [(1 << 3) | wire_type, 0x00];
            let result = decode_fields(&buf);
            assert!(
                matches!(
                    result,
                    Err(ProtocolError::UnsupportedWireType { wire_type: w, offset: 0 }) if w == wire_type
                ),
                "wire type {} should be rejected",
                wire_type
            );
        }
    }

    #[test]
    fn test_repeated_field_last_write_wins() {
        let mut buf = BytesMut::new();
        encode_bytes_field(1, b"first", &mut buf);
        encode_bytes_field(2, b"storage", &mut buf);
        encode_bytes_field(1, b"second", &mut buf);

        let fields = decode_fields(&buf).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[&1].as_bytes().unwrap().as_ref(), b"second");
    }

    #[test]
    fn test_truncated_length_delimited() {
        let mut buf = BytesMut::new();
        encode_bytes_field(1, b"abcdef", &mut buf);
        buf.truncate(buf.len() - 2);

        let result = decode_fields(&buf);
        assert!(matches!(
            result,
            Err(ProtocolError::TruncatedField {
                field: 1,
                needed: 6,
                available: 4
            })
        ));
    }

    #[test]
    fn test_empty_buffer_decodes_to_no_fields() {
        assert!(decode_fields(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_field_value_accessors() {
        assert_eq!(FieldValue::Fixed32(5).as_u64(), Some(5));
        assert_eq!(FieldValue::Varint(5).as_bytes(), None);
        assert_eq!(
            FieldValue::Bytes(Bytes::from_static(b"x")).wire_type(),
            WireType::LengthDelimited
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn varint_roundtrip(n in any::<u64>()) {
                let encoded = varint(n);
                prop_assert_eq!(decode_varint(&encoded, 0).unwrap(), (n, encoded.len()));
            }

            #[test]
            fn varint_continuation_bits(n in any::<u64>()) {
                let encoded = varint(n);
                let (last, rest) = encoded.split_last().unwrap();
                prop_assert_eq!(last & 0x80, 0);
                prop_assert!(rest.iter().all(|b| b & 0x80 != 0));
            }

            #[test]
            fn bytes_field_roundtrip(id in 1u32..(1 << 28), data in proptest::collection::vec(any::<u8>(), 0..512)) {
                let mut buf = BytesMut::new();
                encode_bytes_field(id, &data, &mut buf);
                let fields = decode_fields(&buf).unwrap();
                prop_assert_eq!(fields[&id].as_bytes().unwrap().as_ref(), &data[..]);
            }

            #[test]
            fn numeric_fields_roundtrip(id in 1u32..(1 << 28), v in any::<u64>(), w in any::<u32>()) {
                for value in [FieldValue::Varint(v), FieldValue::Fixed64(v), FieldValue::Fixed32(w)] {
                    let mut buf = BytesMut::new();
                    encode_field(id, &value, &mut buf);
                    let fields = decode_fields(&buf).unwrap();
                    prop_assert_eq!(&fields[&id], &value);
                }
            }
        }
    }
}
