//! Type descriptors: what the store knows about each registered type.

use super::id::IdKind;
use super::version::VersionKind;
use crate::error::{CoreError, CoreResult, Violation};
use crate::graph::{Object, Slot};
use crate::types::TypeName;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Whether a type is tracked in its own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Tracked in a collection, may carry an identifier and a version.
    Entity,
    /// Only ever reachable through other objects.
    Embedded,
}

/// A declarative check on one field.
///
/// `Null` (and an empty optional) passes every constraint except
/// [`Constraint::NotNull`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// The field must be set.
    NotNull,
    /// Integer lower bound, inclusive.
    Min(i64),
    /// Integer upper bound, inclusive.
    Max(i64),
    /// Longest accepted text (in characters), byte string, list or map.
    MaxLength(usize),
    /// Text must contain a non-whitespace character.
    NotBlank,
}

impl Constraint {
    fn check(&self, value: &Slot) -> Option<String> {
        let null = Slot::Null;
        let value = match value {
            Slot::Optional(None) => &null,
            Slot::Optional(Some(inner)) => inner,
            other => other,
        };
        if value.is_null() {
            return matches!(self, Constraint::NotNull).then(|| "must not be null".to_string());
        }
        match self {
            Constraint::NotNull => None,
            Constraint::Min(min) => match value.as_int() {
                Some(n) if n < *min => Some(format!("must be at least {min}")),
                Some(_) => None,
                None => Some("must be an integer".to_string()),
            },
            Constraint::Max(max) => match value.as_int() {
                Some(n) if n > *max => Some(format!("must be at most {max}")),
                Some(_) => None,
                None => Some("must be an integer".to_string()),
            },
            Constraint::MaxLength(max) => {
                let len = match value {
                    Slot::Text(s) => s.chars().count(),
                    Slot::Bytes(b) => b.len(),
                    Slot::List(items) => items.len(),
                    Slot::Map(pairs) => pairs.len(),
                    _ => return Some("has no length".to_string()),
                };
                (len > *max).then(|| format!("length must be at most {max}"))
            }
            Constraint::NotBlank => match value.as_text() {
                Some(s) if s.trim().is_empty() => Some("must not be blank".to_string()),
                Some(_) => None,
                None => Some("must be text".to_string()),
            },
        }
    }
}

type CheckFn = dyn Fn(&Object) -> Result<(), Violation> + Send + Sync;

/// A whole-object check supplied by the caller.
#[derive(Clone)]
pub struct Validator {
    name: String,
    check: Arc<CheckFn>,
}

impl Validator {
    /// Creates a validator.
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&Object) -> Result<(), Violation> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("name", &self.name).finish()
    }
}

/// Identifier declaration.
#[derive(Debug, Clone)]
pub struct IdField {
    /// Field holding the identifier.
    pub name: String,
    /// How identifiers are produced.
    pub kind: IdKind,
}

/// Version declaration.
#[derive(Debug, Clone)]
pub struct VersionField {
    /// Field holding the version.
    pub name: String,
    /// How versions advance.
    pub kind: VersionKind,
}

/// Everything the store knows about one type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: TypeName,
    kind: TypeKind,
    id: Option<IdField>,
    version: Option<VersionField>,
    transient: BTreeSet<String>,
    immutable: BTreeSet<String>,
    constraints: Vec<(String, Constraint)>,
    validators: Vec<Validator>,
}

impl TypeDescriptor {
    /// Starts describing an entity type.
    pub fn entity(name: impl Into<TypeName>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder::new(name.into(), TypeKind::Entity)
    }

    /// Starts describing an embedded type.
    pub fn embedded(name: impl Into<TypeName>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder::new(name.into(), TypeKind::Embedded)
    }

    /// The type name.
    #[must_use]
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// Entity or embedded.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Returns true for entity types.
    #[must_use]
    pub fn is_entity(&self) -> bool {
        self.kind == TypeKind::Entity
    }

    /// The identifier declaration.
    #[must_use]
    pub fn id(&self) -> Option<&IdField> {
        self.id.as_ref()
    }

    /// The version declaration.
    #[must_use]
    pub fn version(&self) -> Option<&VersionField> {
        self.version.as_ref()
    }

    /// Returns true if `field` is never copied or persisted.
    #[must_use]
    pub fn is_transient(&self, field: &str) -> bool {
        self.transient.contains(field)
    }

    /// Returns true if `field` keeps its stored value on update.
    #[must_use]
    pub fn is_immutable(&self, field: &str) -> bool {
        self.immutable.contains(field)
    }

    /// Fields declared immutable.
    pub fn immutable_fields(&self) -> impl Iterator<Item = &str> {
        self.immutable.iter().map(String::as_str)
    }

    /// Checks every constraint and validator against `object`.
    #[must_use]
    pub fn validate(&self, object: &Object) -> Vec<Violation> {
        let mut violations: Vec<Violation> = self
            .constraints
            .iter()
            .filter_map(|(field, constraint)| {
                constraint
                    .check(object.get(field))
                    .map(|message| Violation::new(field.as_str(), message))
            })
            .collect();
        violations.extend(
            self.validators
                .iter()
                .filter_map(|validator| (validator.check)(object).err()),
        );
        violations
    }
}

/// Builder for [`TypeDescriptor`].
#[derive(Debug)]
pub struct TypeDescriptorBuilder {
    inner: TypeDescriptor,
}

impl TypeDescriptorBuilder {
    fn new(name: TypeName, kind: TypeKind) -> Self {
        Self {
            inner: TypeDescriptor {
                name,
                kind,
                id: None,
                version: None,
                transient: BTreeSet::new(),
                immutable: BTreeSet::new(),
                constraints: Vec::new(),
                validators: Vec::new(),
            },
        }
    }

    /// Declares the identifier field.
    #[must_use]
    pub fn id(mut self, field: &str, kind: IdKind) -> Self {
        self.inner.id = Some(IdField {
            name: field.to_string(),
            kind,
        });
        self
    }

    /// Declares the version field.
    #[must_use]
    pub fn version(mut self, field: &str, kind: VersionKind) -> Self {
        self.inner.version = Some(VersionField {
            name: field.to_string(),
            kind,
        });
        self
    }

    /// Marks a field as never copied or persisted.
    #[must_use]
    pub fn transient(mut self, field: &str) -> Self {
        self.inner.transient.insert(field.to_string());
        self
    }

    /// Marks a field as fixed once stored.
    #[must_use]
    pub fn immutable(mut self, field: &str) -> Self {
        self.inner.immutable.insert(field.to_string());
        self
    }

    /// Adds a constraint on a field.
    #[must_use]
    pub fn constraint(mut self, field: &str, constraint: Constraint) -> Self {
        self.inner.constraints.push((field.to_string(), constraint));
        self
    }

    /// Adds a whole-object validator.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.inner.validators.push(validator);
        self
    }

    /// Finishes the descriptor.
    ///
    /// # Errors
    ///
    /// `ImmutableField` if the identifier is immutable but generated, or the
    /// version is immutable; `InvalidDescriptor` for other inconsistencies.
    pub fn build(self) -> CoreResult<TypeDescriptor> {
        let d = self.inner;
        if d.name.as_str().trim().is_empty() {
            return Err(CoreError::invalid_descriptor(&d.name, "type name is empty"));
        }
        if d.kind == TypeKind::Embedded && (d.id.is_some() || d.version.is_some()) {
            return Err(CoreError::invalid_descriptor(
                &d.name,
                "embedded types carry no identifier or version",
            ));
        }
        if let Some(id) = &d.id {
            if d.transient.contains(&id.name) {
                return Err(CoreError::invalid_descriptor(&d.name, "identifier is transient"));
            }
            if d.immutable.contains(&id.name) && id.kind.generates() {
                return Err(CoreError::ImmutableField {
                    type_name: d.name.clone(),
                    field: id.name.clone(),
                });
            }
        }
        if let Some(version) = &d.version {
            if d.transient.contains(&version.name) {
                return Err(CoreError::invalid_descriptor(&d.name, "version is transient"));
            }
            if d.immutable.contains(&version.name) {
                return Err(CoreError::ImmutableField {
                    type_name: d.name.clone(),
                    field: version.name.clone(),
                });
            }
            if d.id.as_ref().is_some_and(|id| id.name == version.name) {
                return Err(CoreError::invalid_descriptor(
                    &d.name,
                    "identifier and version share a field",
                ));
            }
        }
        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_generated_id_is_a_configuration_error() {
        let err = TypeDescriptor::entity("Account")
            .id("id", IdKind::Long)
            .immutable("id")
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::ImmutableField { .. }));

        assert!(TypeDescriptor::entity("Account")
            .id("id", IdKind::Supplied)
            .immutable("id")
            .build()
            .is_ok());
    }

    #[test]
    fn immutable_version_is_a_configuration_error() {
        let err = TypeDescriptor::entity("Account")
            .version("version", VersionKind::Int)
            .immutable("version")
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::ImmutableField { .. }));
    }

    #[test]
    fn embedded_types_have_no_id() {
        let err = TypeDescriptor::embedded("Address")
            .id("id", IdKind::Int)
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidDescriptor { .. }));
    }

    #[test]
    fn constraints_report_violations() {
        let descriptor = TypeDescriptor::entity("Account")
            .constraint("balance", Constraint::Min(0))
            .constraint("owner", Constraint::NotNull)
            .constraint("owner", Constraint::MaxLength(3))
            .constraint("nickname", Constraint::NotBlank)
            .build()
            .unwrap();

        let ok = Object::new("Account").with("balance", 0).with("owner", "abc");
        assert!(descriptor.validate(&ok).is_empty());

        let bad = Object::new("Account")
            .with("balance", -1)
            .with("owner", "abcd")
            .with("nickname", "  ");
        let fields: Vec<String> = descriptor
            .validate(&bad)
            .into_iter()
            .map(|v| v.field)
            .collect();
        assert_eq!(fields, vec!["balance", "owner", "nickname"]);
    }

    #[test]
    fn empty_optional_counts_as_null() {
        let descriptor = TypeDescriptor::entity("Account")
            .constraint("limit", Constraint::NotNull)
            .build()
            .unwrap();
        let object = Object::new("Account").with("limit", Slot::none());
        assert_eq!(descriptor.validate(&object).len(), 1);
    }

    #[test]
    fn custom_validator_runs() {
        let descriptor = TypeDescriptor::entity("Range")
            .validator(Validator::new("ordered", |o| {
                match (o.get("lo").as_int(), o.get("hi").as_int()) {
                    (Some(lo), Some(hi)) if lo > hi => {
                        Err(Violation::new("lo", "must not exceed hi"))
                    }
                    _ => Ok(()),
                }
            }))
            .build()
            .unwrap();
        let bad = Object::new("Range").with("lo", 5).with("hi", 1);
        assert_eq!(descriptor.validate(&bad), vec![Violation::new("lo", "must not exceed hi")]);
    }
}
