//! Optimistic-lock versions.

use crate::error::{CoreError, CoreResult};
use crate::graph::{Object, Slot};
use crate::types::TypeName;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Strategy that stamps and advances a version value.
pub trait VersionIncrementer: Send + Sync + fmt::Debug {
    /// The version written on first save.
    fn first(&self) -> Slot;

    /// The version following `current`.
    fn next(&self, current: &Slot) -> Slot;
}

/// 32-bit counter starting at 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntVersionIncrementer;

impl VersionIncrementer for IntVersionIncrementer {
    fn first(&self) -> Slot {
        Slot::Int(1)
    }

    fn next(&self, current: &Slot) -> Slot {
        match current.as_int() {
            Some(n) if n >= i64::from(i32::MAX) => Slot::Int(i64::from(i32::MIN)),
            Some(n) => Slot::Int(n + 1),
            None => self.first(),
        }
    }
}

/// 64-bit counter starting at 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongVersionIncrementer;

impl VersionIncrementer for LongVersionIncrementer {
    fn first(&self) -> Slot {
        Slot::Int(1)
    }

    fn next(&self, current: &Slot) -> Slot {
        current
            .as_int()
            .map_or_else(|| self.first(), |n| Slot::Int(n.wrapping_add(1)))
    }
}

/// Fresh random UUID text on every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextVersionIncrementer;

impl VersionIncrementer for TextVersionIncrementer {
    fn first(&self) -> Slot {
        Slot::Text(Uuid::new_v4().to_string())
    }

    fn next(&self, _current: &Slot) -> Slot {
        self.first()
    }
}

/// Fresh random UUID on every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidVersionIncrementer;

impl VersionIncrementer for UuidVersionIncrementer {
    fn first(&self) -> Slot {
        Slot::Uuid(Uuid::new_v4())
    }

    fn next(&self, _current: &Slot) -> Slot {
        self.first()
    }
}

/// Version strategy declared on a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    /// 32-bit counter.
    Int,
    /// 64-bit counter.
    Long,
    /// Random UUID text.
    Text,
    /// Random UUID.
    Uuid,
}

impl VersionKind {
    /// Returns the incrementer implementing this strategy.
    #[must_use]
    pub fn incrementer(self) -> Arc<dyn VersionIncrementer> {
        match self {
            VersionKind::Int => Arc::new(IntVersionIncrementer),
            VersionKind::Long => Arc::new(LongVersionIncrementer),
            VersionKind::Text => Arc::new(TextVersionIncrementer),
            VersionKind::Uuid => Arc::new(UuidVersionIncrementer),
        }
    }
}

/// Checks and advances the version field of one entity type.
#[derive(Debug, Clone)]
pub struct VersionManager {
    type_name: TypeName,
    field: String,
    incrementer: Arc<dyn VersionIncrementer>,
}

impl VersionManager {
    /// Creates a manager for `field` of `type_name`.
    pub fn new(
        type_name: TypeName,
        field: impl Into<String>,
        incrementer: Arc<dyn VersionIncrementer>,
    ) -> Self {
        Self {
            type_name,
            field: field.into(),
            incrementer,
        }
    }

    /// The version field.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The version currently carried by `object`.
    #[must_use]
    pub fn current<'a>(&self, object: &'a Object) -> &'a Slot {
        object.get(&self.field)
    }

    /// The version a never-saved entity receives.
    #[must_use]
    pub fn first(&self) -> Slot {
        self.incrementer.first()
    }

    /// Stamps the first version or advances the current one.
    pub fn increment_version(&self, object: &mut Object) -> Slot {
        let current = object.get(&self.field);
        let next = if current.is_null() {
            self.incrementer.first()
        } else {
            self.incrementer.next(current)
        };
        object.set(&self.field, next.clone());
        next
    }

    /// Checks that a working copy was read at the stored version.
    ///
    /// # Errors
    ///
    /// `InvalidVersionState` if the working copy carries no version while
    /// the stored entity does, `VersionConflict` if both are set and differ.
    pub fn ensure_same_version(&self, working: &Object, stored: &Object) -> CoreResult<()> {
        self.check(self.current(working), self.current(stored))
    }

    pub(crate) fn check(&self, working: &Slot, stored: &Slot) -> CoreResult<()> {
        if stored.is_null() {
            return Ok(());
        }
        if working.is_null() {
            return Err(CoreError::InvalidVersionState {
                type_name: self.type_name.clone(),
                stored: stored.render(),
            });
        }
        if working != stored {
            return Err(CoreError::VersionConflict {
                type_name: self.type_name.clone(),
                working: working.render(),
                stored: stored.render(),
            });
        }
        Ok(())
    }
}
