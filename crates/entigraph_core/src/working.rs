//! Caller-owned working copies.

use crate::copier::{Direction, WorkingCopyRegistry};
use crate::graph::{Handle, Heap, Object, Slot};
use crate::types::TypeName;

/// A private, mutable copy of an entity and everything it reaches.
///
/// The copy lives in its own heap and never aliases storage. It remembers
/// which storage object each of its objects was copied from, so a later
/// save merges changes into the right originals. A copy built with
/// [`WorkingCopy::new`] has no such history and is saved as new (or matched
/// by identifier).
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    heap: Heap,
    root: Handle,
    type_name: TypeName,
    origins: WorkingCopyRegistry,
}

impl WorkingCopy {
    /// Starts a new working copy with `object` as its root.
    #[must_use]
    pub fn new(object: Object) -> Self {
        let type_name = object.type_name().clone();
        let mut heap = Heap::new();
        let root = heap.alloc(object);
        Self {
            heap,
            root,
            type_name,
            origins: WorkingCopyRegistry::new(Direction::Forward),
        }
    }

    pub(crate) fn from_parts(heap: Heap, root: Handle, origins: WorkingCopyRegistry) -> Self {
        let type_name = heap
            .get(root)
            .map_or_else(|| TypeName::new(""), |o| o.type_name().clone());
        Self {
            heap,
            root,
            type_name,
            origins,
        }
    }

    /// Handle of the root object.
    #[must_use]
    pub fn root(&self) -> Handle {
        self.root
    }

    /// Type of the root object.
    #[must_use]
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// The private heap.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The root object.
    #[must_use]
    pub fn root_object(&self) -> Option<&Object> {
        self.heap.get(self.root)
    }

    /// Any object of this copy.
    #[must_use]
    pub fn object(&self, handle: Handle) -> Option<&Object> {
        self.heap.get(handle)
    }

    /// Any object of this copy, mutably.
    pub fn object_mut(&mut self, handle: Handle) -> Option<&mut Object> {
        self.heap.get_mut(handle)
    }

    /// Reads a field of the root.
    #[must_use]
    pub fn get(&self, field: &str) -> &Slot {
        const NULL: &Slot = &Slot::Null;
        self.root_object().map_or(NULL, |o| o.get(field))
    }

    /// Writes a field of the root.
    pub fn set(&mut self, field: &str, value: impl Into<Slot>) -> &mut Self {
        if let Some(root) = self.heap.get_mut(self.root) {
            root.set(field, value);
        }
        self
    }

    /// Adds an object to this copy so the root (or another object) can
    /// reference it.
    pub fn add(&mut self, object: Object) -> Handle {
        self.heap.alloc(object)
    }

    /// Follows a reference field of the root.
    #[must_use]
    pub fn follow(&self, field: &str) -> Option<Handle> {
        self.get(field).as_ref_handle()
    }

    /// The storage object `handle` was copied from.
    #[must_use]
    pub fn origin_of(&self, handle: Handle) -> Option<Handle> {
        self.origins.resolve_original_for(handle)
    }

    /// The copy/original pairs recorded when this copy was made.
    #[must_use]
    pub fn origins(&self) -> &WorkingCopyRegistry {
        &self.origins
    }

    /// Returns true if the root was never copied from storage.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.origin_of(self.root).is_none()
    }
}

impl From<Object> for WorkingCopy {
    fn from(object: Object) -> Self {
        Self::new(object)
    }
}
