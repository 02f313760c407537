//! Serialized graph images and the slot <-> CBOR mapping.

use super::pool::PooledBuffer;
use crate::error::{CoreError, CoreResult};
use crate::graph::{Handle, Object, Slot};
use crate::types::TypeName;
use entigraph_codec::{from_cbor, tags, CodecError, Value};
use uuid::Uuid;

const TYPE_KEY: &str = "t";
const FIELDS_KEY: &str = "f";

/// Converts a slot to a CBOR value. `refs` encodes the body of each
/// reference; the caller decides what a handle becomes.
pub(crate) fn slot_to_value(
    slot: &Slot,
    refs: &mut dyn FnMut(Handle) -> CoreResult<Value>,
) -> CoreResult<Value> {
    Ok(match slot {
        Slot::Null => Value::Null,
        Slot::Bool(b) => Value::Bool(*b),
        Slot::Int(n) => Value::Integer(*n),
        Slot::Text(s) => Value::Text(s.clone()),
        Slot::Bytes(b) => Value::Bytes(b.clone()),
        Slot::Uuid(u) => Value::tag(tags::UUID, Value::Bytes(u.as_bytes().to_vec())),
        Slot::Ref(h) => Value::tag(tags::SHARED_REF, refs(*h)?),
        Slot::List(items) => Value::Array(
            items
                .iter()
                .map(|item| slot_to_value(item, refs))
                .collect::<CoreResult<_>>()?,
        ),
        Slot::Map(pairs) => {
            let mut encoded = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                encoded.push(Value::Array(vec![
                    slot_to_value(k, refs)?,
                    slot_to_value(v, refs)?,
                ]));
            }
            Value::tag(tags::ORDERED_MAP, Value::Array(encoded))
        }
        Slot::Optional(inner) => {
            let items = match inner {
                Some(v) => vec![slot_to_value(v, refs)?],
                None => Vec::new(),
            };
            Value::tag(tags::OPTIONAL, Value::Array(items))
        }
    })
}

fn malformed(message: &str) -> CoreError {
    CoreError::Codec(CodecError::invalid_structure(message))
}

/// Converts a CBOR value back to a slot. `refs` resolves the body of each
/// shared-reference tag.
pub(crate) fn value_to_slot(
    value: &Value,
    refs: &mut dyn FnMut(&Value) -> CoreResult<Handle>,
) -> CoreResult<Slot> {
    Ok(match value {
        Value::Null => Slot::Null,
        Value::Bool(b) => Slot::Bool(*b),
        Value::Integer(n) => Slot::Int(*n),
        Value::Text(s) => Slot::Text(s.clone()),
        Value::Bytes(b) => Slot::Bytes(b.clone()),
        Value::Array(items) => Slot::List(
            items
                .iter()
                .map(|item| value_to_slot(item, refs))
                .collect::<CoreResult<_>>()?,
        ),
        Value::Map(_) => return Err(malformed("untagged map in field value")),
        Value::Tag(tag, inner) => match *tag {
            tags::SHARED_REF => Slot::Ref(refs(&**inner)?),
            tags::UUID => {
                let bytes = inner.as_bytes().ok_or_else(|| malformed("uuid is not bytes"))?;
                Slot::Uuid(Uuid::from_slice(bytes).map_err(|_| malformed("uuid is not 16 bytes"))?)
            }
            tags::ORDERED_MAP => {
                let entries = inner
                    .as_array()
                    .ok_or_else(|| malformed("ordered map is not an array"))?;
                let mut pairs = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry.as_array() {
                        Some([k, v]) => pairs.push((value_to_slot(k, refs)?, value_to_slot(v, refs)?)),
                        _ => return Err(malformed("ordered map entry is not a pair")),
                    }
                }
                Slot::Map(pairs)
            }
            tags::OPTIONAL => match inner.as_array() {
                Some([]) => Slot::Optional(None),
                Some([v]) => Slot::Optional(Some(Box::new(value_to_slot(v, refs)?))),
                _ => return Err(malformed("optional holds more than one value")),
            },
            other => {
                return Err(CoreError::Codec(CodecError::unsupported_type(format!(
                    "tag {other}"
                ))))
            }
        },
    })
}

/// Converts a slot that must not contain references.
pub(crate) fn plain_value_to_slot(value: &Value) -> CoreResult<Slot> {
    value_to_slot(value, &mut |_| Err(malformed("unexpected reference")))
}

/// One object inside a decoded image.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    /// Type of the object.
    pub type_name: TypeName,
    /// Encoded fields, transient ones already dropped.
    pub fields: Vec<(String, Value)>,
}

impl ImageEntry {
    /// The encoded value of `field`, if present.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    /// Builds an object, resolving local reference `i` to `table[i]`.
    pub(crate) fn materialize(&self, table: &[Handle]) -> CoreResult<Object> {
        let mut object = Object::new(self.type_name.clone());
        let mut resolve = |inner: &Value| -> CoreResult<Handle> {
            inner
                .as_integer()
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| table.get(i).copied())
                .ok_or_else(|| malformed("reference outside image"))
        };
        for (name, value) in &self.fields {
            object.set(name, value_to_slot(value, &mut resolve)?);
        }
        Ok(object)
    }
}

/// A reachable graph serialized into a pooled buffer.
///
/// Objects are numbered in first-visit order; `sources[i]` is the heap
/// handle object `i` was read from.
#[derive(Debug)]
pub struct GraphImage<'p> {
    pub(crate) bytes: PooledBuffer<'p>,
    pub(crate) sources: Vec<Handle>,
    pub(crate) roots: Vec<usize>,
}

impl GraphImage<'_> {
    /// Number of objects in the image.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns true if the image holds no object.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Source handles, by local index.
    #[must_use]
    pub fn sources(&self) -> &[Handle] {
        &self.sources
    }

    /// Local indices of the requested roots, in request order.
    #[must_use]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Decodes the buffer back into entries.
    ///
    /// # Errors
    ///
    /// Codec errors if the buffer is not a well-formed image.
    pub fn decode(&self) -> CoreResult<Vec<ImageEntry>> {
        let value = from_cbor(&self.bytes)?;
        let items = value
            .as_array()
            .ok_or_else(|| malformed("image is not an array"))?;
        if items.len() != self.sources.len() {
            return Err(malformed("image length does not match its sources"));
        }
        items.iter().map(decode_entry).collect()
    }
}

pub(crate) fn encode_entry(type_name: &TypeName, fields: Vec<(Value, Value)>) -> Value {
    Value::map(vec![
        (Value::from(TYPE_KEY), Value::from(type_name.as_str())),
        (Value::from(FIELDS_KEY), Value::map(fields)),
    ])
}

fn decode_entry(item: &Value) -> CoreResult<ImageEntry> {
    let type_name = item
        .get(TYPE_KEY)
        .and_then(Value::as_text)
        .ok_or_else(|| malformed("image entry without type"))?;
    let fields = item
        .get(FIELDS_KEY)
        .and_then(Value::as_map)
        .ok_or_else(|| malformed("image entry without fields"))?
        .iter()
        .map(|(k, v)| {
            k.as_text()
                .map(|name| (name.to_string(), v.clone()))
                .ok_or_else(|| malformed("field name is not text"))
        })
        .collect::<CoreResult<_>>()?;
    Ok(ImageEntry {
        type_name: TypeName::new(type_name),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_refs(_: Handle) -> CoreResult<Value> {
        Err(malformed("unexpected reference"))
    }

    #[test]
    fn every_slot_kind_survives() {
        let slot = Slot::List(vec![
            Slot::Null,
            Slot::Bool(true),
            Slot::Int(-7),
            Slot::from("text"),
            Slot::Bytes(vec![0, 1]),
            Slot::Uuid(Uuid::from_u128(42)),
            Slot::Map(vec![(Slot::from("b"), Slot::Int(1)), (Slot::from("a"), Slot::Int(2))]),
            Slot::none(),
            Slot::some(Slot::none()),
        ]);
        let value = slot_to_value(&slot, &mut no_refs).unwrap();
        assert_eq!(plain_value_to_slot(&value).unwrap(), slot);
    }

    #[test]
    fn references_go_through_the_callbacks() {
        let target = Handle::new(9, 3);
        let value = slot_to_value(&Slot::Ref(target), &mut |h| {
            Ok(Value::Integer(i64::from(h.index)))
        })
        .unwrap();
        assert_eq!(value, Value::tag(tags::SHARED_REF, Value::Integer(9)));

        let back = value_to_slot(&value, &mut |_| Ok(Handle::new(0, 0))).unwrap();
        assert_eq!(back, Slot::Ref(Handle::new(0, 0)));
        assert!(plain_value_to_slot(&value).is_err());
    }

    #[test]
    fn untagged_maps_are_rejected() {
        let value = Value::Map(vec![(Value::from("a"), Value::Integer(1))]);
        assert!(matches!(plain_value_to_slot(&value), Err(CoreError::Codec(_))));
    }

    #[test]
    fn materialize_rejects_out_of_range_refs() {
        let entry = ImageEntry {
            type_name: TypeName::new("Node"),
            fields: vec![(
                "next".to_string(),
                Value::tag(tags::SHARED_REF, Value::Integer(5)),
            )],
        };
        assert!(entry.materialize(&[Handle::new(0, 0)]).is_err());
    }
}
