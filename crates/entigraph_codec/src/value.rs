//! Dynamic CBOR value type.

use crate::encoder::to_canonical_cbor;
use std::cmp::Ordering;

/// A dynamic CBOR value.
///
/// Floats are not representable. Graph images and log records must encode
/// to identical bytes for identical inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (supports full i64 range).
    Integer(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of key-value pairs (keys are sorted on encode).
    Map(Vec<(Value, Value)>),
    /// Tagged item (major type 6).
    Tag(u64, Box<Value>),
}

impl Value {
    /// Create a map value with keys sorted in canonical order.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
        Value::Map(pairs)
    }

    /// Create a tagged value.
    pub fn tag(tag: u64, inner: Value) -> Self {
        Value::Tag(tag, Box::new(inner))
    }

    /// Compare two values by their canonical encodings.
    ///
    /// Canonical CBOR orders encoded items length-first, then bytewise.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        let a = to_canonical_cbor(self);
        let b = to_canonical_cbor(other);
        a.len().cmp(&b.len()).then_with(|| a.cmp(&b))
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer, if this is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The byte string, if this is one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The text, if this is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The items, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The pairs, if this is a map.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Tag number and content, if this is a tagged item.
    pub fn as_tag(&self) -> Option<(u64, &Value)> {
        match self {
            Value::Tag(tag, inner) => Some((*tag, inner)),
            _ => None,
        }
    }

    /// Looks up a text key in a map. Records and graph images key their
    /// fields by short text strings.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keys_sort_length_first() {
        let map = Value::map(vec![
            (Value::Text("abc".into()), Value::Integer(1)),
            (Value::Text("z".into()), Value::Integer(2)),
            (Value::Text("ab".into()), Value::Integer(3)),
        ]);

        let keys: Vec<_> = map
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_text().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["z", "ab", "abc"]);
    }

    #[test]
    fn integers_order_positive_before_negative() {
        let mut values = vec![
            Value::Integer(-1),
            Value::Integer(300),
            Value::Integer(0),
            Value::Integer(-2),
        ];
        values.sort_by(Value::cmp_canonical);
        assert_eq!(
            values,
            vec![
                Value::Integer(0),
                Value::Integer(-1),
                Value::Integer(-2),
                Value::Integer(300),
            ]
        );
    }

    #[test]
    fn tag_accessor() {
        let v = Value::tag(29, Value::Integer(4));
        assert_eq!(v.as_tag(), Some((29, &Value::Integer(4))));
        assert_eq!(Value::Null.as_tag(), None);
    }

    #[test]
    fn map_get_by_text_key() {
        let map = Value::map(vec![
            (Value::from("t"), Value::from("Account")),
            (Value::Integer(1), Value::from("ignored")),
        ]);
        assert_eq!(map.get("t"), Some(&Value::from("Account")));
        assert_eq!(map.get("missing"), None);
        assert_eq!(Value::Integer(1).get("t"), None);
    }
}
