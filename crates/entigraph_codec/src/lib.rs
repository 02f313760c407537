//! # EntiGraph Codec
//!
//! Canonical CBOR encoding/decoding for EntiGraph.
//!
//! The graph copier serializes object graphs through this codec, and the
//! file persister frames its log records with it. Encoding is deterministic:
//!
//! - Maps are sorted by key (length-first, then bytewise on encoded keys)
//! - Integers and lengths use the shortest encoding
//! - No floats, no indefinite-length items
//! - Tags (major type 6) are preserved, which is how object references
//!   survive the trip (tag 29, shared reference)
//!
//! ## Usage
//!
//! ```
//! use entigraph_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let value = Value::tag(29, Value::Integer(3));
//! let bytes = to_canonical_cbor(&value);
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder, MAX_DEPTH};
pub use encoder::{encode_into, to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Registered CBOR tag numbers used by EntiGraph.
pub mod tags {
    /// Reference to a shared value by index (cbor-sharedrefs).
    pub const SHARED_REF: u64 = 29;
    /// Binary UUID (RFC 4122).
    pub const UUID: u64 = 37;
    /// Map whose entry order is significant, encoded as an array of pairs.
    pub const ORDERED_MAP: u64 = 259;
    /// Optional wrapper: empty array for `None`, one element for `Some`.
    pub const OPTIONAL: u64 = 0x4547_0001;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn value_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            "[a-z]{0,8}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,4}", inner.clone()), 0..4).prop_map(|pairs| {
                    let mut pairs: Vec<(Value, Value)> = pairs
                        .into_iter()
                        .map(|(k, v)| (Value::Text(k), v))
                        .collect();
                    pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
                    pairs.dedup_by(|a, b| a.0 == b.0);
                    Value::Map(pairs)
                }),
                (0u64..300, inner).prop_map(|(tag, v)| Value::tag(tag, v)),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in value_strategy()) {
            let bytes = to_canonical_cbor(&value);
            prop_assert_eq!(from_cbor(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn nested_graph_image_shape() {
        let image = Value::Array(vec![
            Value::map(vec![
                (Value::from("t"), Value::from("Order")),
                (
                    Value::from("f"),
                    Value::map(vec![(
                        Value::from("customer"),
                        Value::tag(tags::SHARED_REF, Value::Integer(1)),
                    )]),
                ),
            ]),
            Value::map(vec![
                (Value::from("t"), Value::from("Customer")),
                (Value::from("f"), Value::Map(vec![])),
            ]),
        ]);
        let bytes = to_canonical_cbor(&image);
        assert_eq!(from_cbor(&bytes).unwrap(), image);
    }
}
