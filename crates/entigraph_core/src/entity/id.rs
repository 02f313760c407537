//! Entity identifiers: how they are read, generated and assigned.

use super::data::EntityData;
use crate::error::{CoreError, CoreResult};
use crate::graph::{Object, Slot};
use crate::types::TypeName;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Upper bound on candidates tried before giving up on a free identifier.
const MAX_ID_ATTEMPTS: usize = 1 << 16;

/// Strategy that produces the next identifier for a type.
pub trait IdSetter: Send + Sync + fmt::Debug {
    /// Produces the identifier after `cursor`, the last one handed out.
    ///
    /// Returns `None` if this strategy never generates identifiers.
    fn next_id(&self, cursor: Option<&Slot>) -> Option<Slot>;

    /// Whether this strategy generates identifiers at all.
    fn generates(&self) -> bool {
        true
    }
}

/// 32-bit sequential identifiers starting at 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntIdSetter;

impl IdSetter for IntIdSetter {
    fn next_id(&self, cursor: Option<&Slot>) -> Option<Slot> {
        let next = match cursor.and_then(Slot::as_int) {
            None => 0,
            Some(n) if n >= i64::from(i32::MAX) => i64::from(i32::MIN),
            Some(n) => n + 1,
        };
        Some(Slot::Int(next))
    }
}

/// 64-bit sequential identifiers starting at 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongIdSetter;

impl IdSetter for LongIdSetter {
    fn next_id(&self, cursor: Option<&Slot>) -> Option<Slot> {
        let next = cursor.and_then(Slot::as_int).map_or(0, |n| n.wrapping_add(1));
        Some(Slot::Int(next))
    }
}

/// Random UUIDs rendered as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextIdSetter;

impl IdSetter for TextIdSetter {
    fn next_id(&self, _cursor: Option<&Slot>) -> Option<Slot> {
        Some(Slot::Text(Uuid::new_v4().to_string()))
    }
}

/// Random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdSetter;

impl IdSetter for UuidIdSetter {
    fn next_id(&self, _cursor: Option<&Slot>) -> Option<Slot> {
        Some(Slot::Uuid(Uuid::new_v4()))
    }
}

/// Identifiers are always set by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuppliedIdSetter;

impl IdSetter for SuppliedIdSetter {
    fn next_id(&self, _cursor: Option<&Slot>) -> Option<Slot> {
        None
    }

    fn generates(&self) -> bool {
        false
    }
}

/// Identifier strategy declared on a type.
#[derive(Debug, Clone)]
pub enum IdKind {
    /// Sequential 32-bit integers.
    Int,
    /// Sequential 64-bit integers.
    Long,
    /// Random UUID text.
    Text,
    /// Random UUIDs.
    Uuid,
    /// Set by the caller before saving.
    Supplied,
    /// A caller-provided strategy.
    Custom(Arc<dyn IdSetter>),
}

impl IdKind {
    /// Returns the setter implementing this strategy.
    #[must_use]
    pub fn setter(&self) -> Arc<dyn IdSetter> {
        match self {
            IdKind::Int => Arc::new(IntIdSetter),
            IdKind::Long => Arc::new(LongIdSetter),
            IdKind::Text => Arc::new(TextIdSetter),
            IdKind::Uuid => Arc::new(UuidIdSetter),
            IdKind::Supplied => Arc::new(SuppliedIdSetter),
            IdKind::Custom(setter) => Arc::clone(setter),
        }
    }

    /// Whether identifiers of this kind are generated.
    #[must_use]
    pub fn generates(&self) -> bool {
        self.setter().generates()
    }
}

type Probe = dyn Fn(&Object) -> Option<Slot> + Send + Sync;

/// Reads the identifier of an object.
///
/// The default finder reads a single field; custom finders can derive
/// composite identifiers from several fields.
#[derive(Clone)]
pub struct IdFinder {
    label: Arc<str>,
    probe: Arc<Probe>,
}

impl IdFinder {
    /// A finder that reads `field`, treating `Null` as no identifier.
    #[must_use]
    pub fn field(field: &str) -> Self {
        let name = field.to_string();
        Self {
            label: Arc::from(field),
            probe: Arc::new(move |object: &Object| {
                let value = object.get(&name);
                (!value.is_null()).then(|| value.clone())
            }),
        }
    }

    /// A finder backed by an arbitrary function.
    pub fn new(
        label: &str,
        probe: impl Fn(&Object) -> Option<Slot> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: Arc::from(label),
            probe: Arc::new(probe),
        }
    }

    /// Reads the identifier of `object`.
    #[must_use]
    pub fn find(&self, object: &Object) -> Option<Slot> {
        (self.probe)(object)
    }

    /// Label given at construction.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for IdFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdFinder").field("label", &self.label).finish()
    }
}

/// Assigns identifiers to entities of one type.
#[derive(Debug, Clone)]
pub struct IdManager {
    type_name: TypeName,
    field: String,
    setter: Arc<dyn IdSetter>,
}

impl IdManager {
    /// Creates a manager for `field` of `type_name`.
    pub fn new(type_name: TypeName, field: impl Into<String>, setter: Arc<dyn IdSetter>) -> Self {
        Self {
            type_name,
            field: field.into(),
            setter,
        }
    }

    /// The identifier field.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Whether this manager generates identifiers.
    #[must_use]
    pub fn generates(&self) -> bool {
        self.setter.generates()
    }

    /// The identifier already carried by `object`, if any.
    #[must_use]
    pub fn current_id<'a>(&self, object: &'a Object) -> Option<&'a Slot> {
        let value = object.get(&self.field);
        (!value.is_null()).then_some(value)
    }

    /// Returns the identifier of `object`, generating one if it has none.
    ///
    /// A generated identifier is written into the object and becomes the
    /// collection's cursor. Candidates already indexed are skipped.
    ///
    /// # Errors
    ///
    /// `MissingId` if the strategy does not generate identifiers, and
    /// `IdSpaceExhausted` if no free candidate turns up.
    pub fn ensure_id(&self, object: &mut Object, data: &mut EntityData) -> CoreResult<Slot> {
        if let Some(id) = self.current_id(object) {
            return Ok(id.clone());
        }
        if !self.setter.generates() {
            return Err(CoreError::MissingId {
                type_name: self.type_name.clone(),
            });
        }

        let mut cursor = data.last_id().cloned();
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = self
                .setter
                .next_id(cursor.as_ref())
                .ok_or_else(|| CoreError::MissingId {
                    type_name: self.type_name.clone(),
                })?;
            if data.contains_id(&candidate) {
                cursor = Some(candidate);
                continue;
            }
            object.set(&self.field, candidate.clone());
            data.set_last_id(Some(candidate.clone()));
            debug!(type_name = %self.type_name, id = %candidate.render(), "assigned identifier");
            return Ok(candidate);
        }

        Err(CoreError::IdSpaceExhausted {
            type_name: self.type_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Heap;

    fn manager(kind: &IdKind) -> IdManager {
        IdManager::new(TypeName::new("Account"), "id", kind.setter())
    }

    #[test]
    fn int_ids_start_at_zero_and_wrap() {
        assert_eq!(IntIdSetter.next_id(None), Some(Slot::Int(0)));
        assert_eq!(IntIdSetter.next_id(Some(&Slot::Int(4))), Some(Slot::Int(5)));
        assert_eq!(
            IntIdSetter.next_id(Some(&Slot::Int(i64::from(i32::MAX)))),
            Some(Slot::Int(i64::from(i32::MIN)))
        );
        assert_eq!(
            LongIdSetter.next_id(Some(&Slot::Int(i64::MAX))),
            Some(Slot::Int(i64::MIN))
        );
    }

    #[test]
    fn ensure_id_is_idempotent() {
        let mut data = EntityData::new(TypeName::new("Account"));
        let ids = manager(&IdKind::Long);
        let mut account = Object::new("Account");

        let first = ids.ensure_id(&mut account, &mut data).unwrap();
        let second = ids.ensure_id(&mut account, &mut data).unwrap();
        assert_eq!(first, Slot::Int(0));
        assert_eq!(first, second);
        assert_eq!(data.last_id(), Some(&Slot::Int(0)));
    }

    #[test]
    fn preset_id_is_kept() {
        let mut data = EntityData::new(TypeName::new("Account"));
        let mut account = Object::new("Account").with("id", 41);
        let id = manager(&IdKind::Int).ensure_id(&mut account, &mut data).unwrap();
        assert_eq!(id, Slot::Int(41));
        assert_eq!(data.last_id(), None);
    }

    #[test]
    fn taken_candidates_are_skipped() {
        let mut heap = Heap::new();
        let mut data = EntityData::new(TypeName::new("Account"));
        data.set_id_getter(Some(IdFinder::field("id")), &heap).unwrap();
        let taken = heap.alloc(Object::new("Account").with("id", 0));
        data.ensure_member_and_return_changed(taken, &heap).unwrap();

        let mut account = Object::new("Account");
        let id = manager(&IdKind::Int).ensure_id(&mut account, &mut data).unwrap();
        assert_eq!(id, Slot::Int(1));
    }

    #[test]
    fn supplied_ids_must_be_present() {
        let mut data = EntityData::new(TypeName::new("Account"));
        let mut account = Object::new("Account");
        let err = manager(&IdKind::Supplied)
            .ensure_id(&mut account, &mut data)
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingId { .. }));
    }

    #[test]
    fn text_ids_are_uuid_strings() {
        let mut data = EntityData::new(TypeName::new("Account"));
        let mut account = Object::new("Account");
        let id = manager(&IdKind::Text).ensure_id(&mut account, &mut data).unwrap();
        let text = id.as_text().unwrap();
        assert!(Uuid::parse_str(text).is_ok());
    }

    #[test]
    fn composite_finder() {
        let finder = IdFinder::new("tenant+code", |o| {
            Some(Slot::List(vec![o.get("tenant").clone(), o.get("code").clone()]))
        });
        let object = Object::new("Sku").with("tenant", 1).with("code", "A");
        assert_eq!(
            finder.find(&object),
            Some(Slot::List(vec![Slot::Int(1), Slot::from("A")]))
        );
        assert_eq!(finder.label(), "tenant+code");
    }
}
