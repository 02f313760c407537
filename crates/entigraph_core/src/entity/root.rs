//! The persisted root aggregate.

use super::data::EntityData;
use crate::graph::Handle;
use crate::types::TypeName;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// One [`EntityData`] per entity type, created on first registration and
/// never removed.
#[derive(Debug, Clone, Default)]
pub struct Root {
    collections: BTreeMap<TypeName, EntityData>,
}

impl Root {
    /// Creates an empty root.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collection for `type_name`.
    #[must_use]
    pub fn collection(&self, type_name: &str) -> Option<&EntityData> {
        self.collections.get(type_name)
    }

    /// The collection for `type_name`, mutably.
    pub fn collection_mut(&mut self, type_name: &str) -> Option<&mut EntityData> {
        self.collections.get_mut(type_name)
    }

    /// Returns the collection for `type_name`, creating it if needed.
    ///
    /// The flag is true when the collection was just created.
    pub fn ensure_collection(&mut self, type_name: &TypeName) -> (&mut EntityData, bool) {
        match self.collections.entry(type_name.clone()) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(EntityData::new(type_name.clone())), true),
        }
    }

    /// Installs a collection restored from a log, replacing any previous one.
    pub(crate) fn install(&mut self, data: EntityData) {
        self.collections.insert(data.type_name().clone(), data);
    }

    /// Drops a collection created by a write that was rolled back.
    pub(crate) fn remove(&mut self, type_name: &str) -> Option<EntityData> {
        self.collections.remove(type_name)
    }

    /// Iterates collections in type-name order.
    pub fn collections(&self) -> impl Iterator<Item = &EntityData> {
        self.collections.values()
    }

    /// Every member of every collection.
    pub fn all_members(&self) -> impl Iterator<Item = Handle> + '_ {
        self.collections.values().flat_map(|data| data.members().iter())
    }

    /// Number of collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Returns true if no collection exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
