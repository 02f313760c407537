//! Canonical CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Largest element count accepted for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Largest byte/text length accepted.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Deepest nesting of arrays, maps and tags accepted.
pub const MAX_DEPTH: usize = 256;

/// Decode exactly one value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not canonical CBOR, contain forbidden
/// constructs (floats, indefinite lengths), or continue past the first item.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// A canonical CBOR decoder.
///
/// Rejects non-shortest encodings and unsorted map keys, so every accepted
/// input re-encodes to the same bytes.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial = self.read_byte()?;
        let major_type = initial >> 5;
        let info = initial & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::unsupported_type("unsigned integer above i64::MAX"))
            }
            1 => {
                let n = self.decode_argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::unsupported_type("negative integer below i64::MIN"))
            }
            2 => {
                let len = self.decode_length(info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            3 => {
                let len = self.decode_length(info, MAX_BYTES_LENGTH)?;
                let bytes = self.read_bytes(len)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => {
                let len = self.decode_length(info, MAX_CONTAINER_ELEMENTS)?;
                self.nested(|d| {
                    let mut items = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        items.push(d.decode()?);
                    }
                    Ok(Value::Array(items))
                })
            }
            5 => {
                let len = self.decode_length(info, MAX_CONTAINER_ELEMENTS)?;
                self.nested(|d| d.decode_map(len))
            }
            6 => {
                let tag = self.decode_argument(info)?;
                self.nested(|d| Ok(Value::Tag(tag, Box::new(d.decode()?))))
            }
            _ => self.decode_simple(info),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> CodecResult<T>) -> CodecResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::DepthLimitExceeded {
                max_depth: MAX_DEPTH,
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn decode_argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, shortest_limit) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.read_byte()?), 24),
            25 => {
                let b = self.read_bytes(2)?;
                (u64::from(u16::from_be_bytes([b[0], b[1]])), 0x100)
            }
            26 => {
                let b = self.read_bytes(4)?;
                (
                    u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
                    0x1_0000,
                )
            }
            27 => {
                let b = self.read_bytes(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                (u64::from_be_bytes(raw), 0x1_0000_0000)
            }
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };

        if value < shortest_limit {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn decode_length(&mut self, info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.decode_argument(info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        Ok(claimed as usize)
    }

    fn decode_map(&mut self, len: usize) -> CodecResult<Value> {
        let mut pairs = Vec::with_capacity(len.min(1024));
        let data = self.data;
        let mut prev_key: Option<&'a [u8]> = None;

        for _ in 0..len {
            let start = self.pos;
            let key = self.decode()?;
            let key_bytes = &data[start..self.pos];

            if let Some(prev) = prev_key {
                let ordering = prev.len().cmp(&key_bytes.len()).then_with(|| prev.cmp(key_bytes));
                if ordering != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }
            prev_key = Some(key_bytes);

            let value = self.decode()?;
            pairs.push((key, value));
        }

        Ok(Value::Map(pairs))
    }

    fn decode_simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 | 23 => Ok(Value::Null),
            25..=27 => Err(CodecError::FloatForbidden),
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            _ => Err(CodecError::unsupported_type(format!("simple value {info}"))),
        }
    }
}
