//! Canonical CBOR encoder.

use crate::value::Value;

/// Encode a value to canonical CBOR bytes.
///
/// Output follows RFC 8949 §4.2.1: shortest-form integers and lengths,
/// definite lengths only, map keys sorted by their encoded form
/// (length-first, then bytewise).
pub fn to_canonical_cbor(value: &Value) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value);
    encoder.into_bytes()
}

/// Encode a value, appending to an existing buffer.
///
/// The buffer keeps its allocation, which lets callers recycle buffers
/// between encodings.
pub fn encode_into(value: &Value, buffer: &mut Vec<u8>) {
    let mut encoder = CanonicalEncoder::with_buffer(std::mem::take(buffer));
    encoder.encode(value);
    *buffer = encoder.into_bytes();
}

/// A canonical CBOR encoder.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder that appends to `buffer`.
    pub fn with_buffer(buffer: Vec<u8>) -> Self {
        Self { buffer }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) {
        match value {
            // null is simple value 22, false/true are 20/21
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Bytes(b) => {
                self.encode_head(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.encode_head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.encode_head(4, items.len() as u64);
                for item in items {
                    self.encode(item);
                }
            }
            Value::Map(pairs) => self.encode_map(pairs),
            Value::Tag(tag, inner) => {
                self.encode_head(6, *tag);
                self.encode(inner);
            }
        }
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(0, n as u64);
        } else {
            // -1 - n stays within [0, 2^63 - 1] for every negative i64.
            self.encode_head(1, (-1 - n) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | value as u8);
        } else if let Ok(v) = u8::try_from(value) {
            self.buffer.push(mt | 24);
            self.buffer.push(v);
        } else if let Ok(v) = u16::try_from(value) {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&v.to_be_bytes());
        } else if let Ok(v) = u32::try_from(value) {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&v.to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) {
        let mut encoded: Vec<(Vec<u8>, &Value)> = pairs
            .iter()
            .map(|(key, value)| (to_canonical_cbor(key), value))
            .collect();
        encoded.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        self.encode_head(5, pairs.len() as u64);
        for (key, value) in encoded {
            self.buffer.extend_from_slice(&key);
            self.encode(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_simple_values() {
        assert_eq!(to_canonical_cbor(&Value::Null), vec![0xf6]);
        assert_eq!(to_canonical_cbor(&Value::Bool(false)), vec![0xf4]);
        assert_eq!(to_canonical_cbor(&Value::Bool(true)), vec![0xf5]);
    }

    #[test]
    fn encode_integers_shortest_form() {
        assert_eq!(to_canonical_cbor(&Value::Integer(23)), vec![0x17]);
        assert_eq!(to_canonical_cbor(&Value::Integer(24)), vec![0x18, 24]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(256)),
            vec![0x19, 0x01, 0x00]
        );
        assert_eq!(
            to_canonical_cbor(&Value::Integer(65536)),
            vec![0x1a, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(to_canonical_cbor(&Value::Integer(-1)), vec![0x20]);
        assert_eq!(to_canonical_cbor(&Value::Integer(-25)), vec![0x38, 24]);
    }

    #[test]
    fn encode_extreme_integers() {
        let max = to_canonical_cbor(&Value::Integer(i64::MAX));
        assert_eq!(max[0], 0x1b);
        assert_eq!(max.len(), 9);

        let min = to_canonical_cbor(&Value::Integer(i64::MIN));
        assert_eq!(min[0], 0x3b);
        assert_eq!(&min[1..], &(i64::MAX as u64).to_be_bytes());
    }

    #[test]
    fn encode_text_and_bytes() {
        assert_eq!(
            to_canonical_cbor(&Value::Text("id".into())),
            vec![0x62, b'i', b'd']
        );
        assert_eq!(
            to_canonical_cbor(&Value::Bytes(vec![1, 2, 3])),
            vec![0x43, 1, 2, 3]
        );
    }

    #[test]
    fn encode_tag() {
        // tag 29 (shared reference) over index 2
        assert_eq!(
            to_canonical_cbor(&Value::tag(29, Value::Integer(2))),
            vec![0xd8, 29, 0x02]
        );
        // tag 259 needs a two-byte head
        assert_eq!(
            to_canonical_cbor(&Value::tag(259, Value::Array(vec![]))),
            vec![0xd9, 0x01, 0x03, 0x80]
        );
    }

    #[test]
    fn map_encoding_ignores_insertion_order() {
        let a = Value::Map(vec![
            (Value::from("bb"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(1)),
        ]);
        let b = Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (Value::from("bb"), Value::Integer(2)),
        ]);
        let bytes = to_canonical_cbor(&a);
        assert_eq!(bytes, to_canonical_cbor(&b));
        assert_eq!(bytes, vec![0xa2, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]);
    }

    #[test]
    fn encode_into_appends_and_keeps_allocation() {
        let mut buffer = Vec::with_capacity(64);
        buffer.push(0xff);
        encode_into(&Value::Integer(1), &mut buffer);
        assert_eq!(buffer, vec![0xff, 0x01]);
        assert!(buffer.capacity() >= 64);
    }
}
