//! Objects and field values.

use super::heap::Handle;
use crate::types::TypeName;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UUID.
    Uuid(Uuid),
    /// Reference to another object in the same heap.
    Ref(Handle),
    /// Ordered sequence.
    List(Vec<Slot>),
    /// Key/value pairs in insertion order.
    Map(Vec<(Slot, Slot)>),
    /// Explicit optional wrapper.
    Optional(Option<Box<Slot>>),
}

static NULL: Slot = Slot::Null;

impl Slot {
    /// Wraps a present optional value.
    pub fn some(value: impl Into<Slot>) -> Self {
        Slot::Optional(Some(Box::new(value.into())))
    }

    /// An empty optional.
    #[must_use]
    pub const fn none() -> Self {
        Slot::Optional(None)
    }

    /// Returns true for [`Slot::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Slot::Null)
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Slot::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Slot::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the text, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Slot::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the UUID, if this is one.
    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Slot::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Returns the referenced handle, if this is a reference.
    #[must_use]
    pub fn as_ref_handle(&self) -> Option<Handle> {
        match self {
            Slot::Ref(h) => Some(*h),
            _ => None,
        }
    }

    /// Returns the elements, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Slot]> {
        match self {
            Slot::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the pairs, if this is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<&[(Slot, Slot)]> {
        match self {
            Slot::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Returns the wrapped value of an optional; `None` for anything else.
    #[must_use]
    pub fn as_optional(&self) -> Option<Option<&Slot>> {
        match self {
            Slot::Optional(inner) => Some(inner.as_deref()),
            _ => None,
        }
    }

    /// Calls `f` for every handle referenced at any depth.
    pub fn for_each_ref(&self, f: &mut impl FnMut(Handle)) {
        match self {
            Slot::Ref(h) => f(*h),
            Slot::List(items) => items.iter().for_each(|s| s.for_each_ref(f)),
            Slot::Map(pairs) => {
                for (k, v) in pairs {
                    k.for_each_ref(f);
                    v.for_each_ref(f);
                }
            }
            Slot::Optional(Some(inner)) => inner.for_each_ref(f),
            _ => {}
        }
    }

    /// Returns true if any reference appears at any depth.
    #[must_use]
    pub fn has_refs(&self) -> bool {
        let mut found = false;
        self.for_each_ref(&mut |_| found = true);
        found
    }

    /// Renders the value for messages.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Slot::Null => "null".to_string(),
            Slot::Bool(b) => b.to_string(),
            Slot::Int(n) => n.to_string(),
            Slot::Text(s) => format!("{s:?}"),
            Slot::Bytes(b) => format!("<{} bytes>", b.len()),
            Slot::Uuid(u) => u.to_string(),
            Slot::Ref(h) => h.to_string(),
            Slot::List(items) => {
                let inner: Vec<String> = items.iter().map(Slot::render).collect();
                format!("[{}]", inner.join(", "))
            }
            Slot::Map(pairs) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.render(), v.render()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Slot::Optional(None) => "none".to_string(),
            Slot::Optional(Some(inner)) => format!("some({})", inner.render()),
        }
    }
}

impl From<bool> for Slot {
    fn from(b: bool) -> Self {
        Slot::Bool(b)
    }
}

impl From<i64> for Slot {
    fn from(n: i64) -> Self {
        Slot::Int(n)
    }
}

impl From<i32> for Slot {
    fn from(n: i32) -> Self {
        Slot::Int(i64::from(n))
    }
}

impl From<u32> for Slot {
    fn from(n: u32) -> Self {
        Slot::Int(i64::from(n))
    }
}

impl From<&str> for Slot {
    fn from(s: &str) -> Self {
        Slot::Text(s.to_string())
    }
}

impl From<String> for Slot {
    fn from(s: String) -> Self {
        Slot::Text(s)
    }
}

impl From<Vec<u8>> for Slot {
    fn from(b: Vec<u8>) -> Self {
        Slot::Bytes(b)
    }
}

impl From<Uuid> for Slot {
    fn from(u: Uuid) -> Self {
        Slot::Uuid(u)
    }
}

impl From<Handle> for Slot {
    fn from(h: Handle) -> Self {
        Slot::Ref(h)
    }
}

impl From<Vec<Slot>> for Slot {
    fn from(items: Vec<Slot>) -> Self {
        Slot::List(items)
    }
}

impl<T: Into<Slot>> From<Option<T>> for Slot {
    fn from(value: Option<T>) -> Self {
        Slot::Optional(value.map(|v| Box::new(v.into())))
    }
}

/// A schema-less object: a type name plus named fields.
///
/// Absent fields read as [`Slot::Null`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    type_name: TypeName,
    fields: BTreeMap<String, Slot>,
}

impl Object {
    /// Creates an object with no fields.
    pub fn new(type_name: impl Into<TypeName>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field and returns the object.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Slot>) -> Self {
        self.set(name, value);
        self
    }

    /// The object's type.
    #[must_use]
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Reads a field.
    #[must_use]
    pub fn get(&self, name: &str) -> &Slot {
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Writes a field, returning the previous value.
    pub fn set(&mut self, name: &str, value: impl Into<Slot>) -> Option<Slot> {
        self.fields.insert(name.to_string(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, name: &str) -> Option<Slot> {
        self.fields.remove(name)
    }

    /// Iterates fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of stored fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Calls `f` for every referenced handle.
    pub fn for_each_ref(&self, f: &mut impl FnMut(Handle)) {
        for slot in self.fields.values() {
            slot.for_each_ref(f);
        }
    }

    /// Every referenced handle, in field order.
    #[must_use]
    pub fn references(&self) -> Vec<Handle> {
        let mut refs = Vec::new();
        self.for_each_ref(&mut |h| refs.push(h));
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_read_as_null() {
        let account = Object::new("Account").with("balance", 10);
        assert_eq!(account.get("balance"), &Slot::Int(10));
        assert!(account.get("owner").is_null());
    }

    #[test]
    fn references_found_at_any_depth() {
        let a = Handle::new(1, 0);
        let b = Handle::new(2, 0);
        let c = Handle::new(3, 0);
        let object = Object::new("Order")
            .with("customer", a)
            .with("lines", vec![Slot::Ref(b), Slot::Int(4)])
            .with("note", Slot::some(c));

        let mut refs = object.references();
        refs.sort();
        assert_eq!(refs, vec![a, b, c]);
    }

    #[test]
    fn optional_conversion() {
        assert_eq!(Slot::from(None::<i64>), Slot::none());
        assert_eq!(Slot::from(Some(3)), Slot::some(3));
        assert_eq!(Slot::some(3).as_optional(), Some(Some(&Slot::Int(3))));
    }

    #[test]
    fn render_is_readable() {
        let slot = Slot::Map(vec![(Slot::from("k"), Slot::List(vec![Slot::Int(1)]))]);
        assert_eq!(slot.render(), "{\"k\": [1]}");
    }
}
