//! Copy/original correspondence for one copy or merge cycle.

use crate::graph::Handle;
use std::collections::HashMap;

/// Which way a cycle copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Storage objects copied into a working heap.
    Forward,
    /// Working objects merged into storage.
    Inverted,
}

/// Pairs each working-side object with the storage object it stands for.
///
/// In both directions the "copy" is the working-side handle and the
/// "original" the storage-side handle.
#[derive(Debug, Clone)]
pub struct WorkingCopyRegistry {
    direction: Direction,
    copy_to_original: HashMap<Handle, Handle>,
    original_to_copy: HashMap<Handle, Handle>,
}

impl WorkingCopyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            copy_to_original: HashMap::new(),
            original_to_copy: HashMap::new(),
        }
    }

    /// The direction of the cycle that filled this registry.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Records that `copy` corresponds to `original`.
    pub fn register(&mut self, copy: Handle, original: Handle) {
        if let Some(stale) = self.copy_to_original.insert(copy, original) {
            self.original_to_copy.remove(&stale);
        }
        if let Some(stale) = self.original_to_copy.insert(original, copy) {
            if stale != copy {
                self.copy_to_original.remove(&stale);
            }
        }
    }

    /// The storage object `copy` was made from.
    #[must_use]
    pub fn resolve_original_for(&self, copy: Handle) -> Option<Handle> {
        self.copy_to_original.get(&copy).copied()
    }

    /// The working object standing for `original`.
    #[must_use]
    pub fn resolve_copy_for_original(&self, original: Handle) -> Option<Handle> {
        self.original_to_copy.get(&original).copied()
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.copy_to_original.len()
    }

    /// Returns true if no pair is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.copy_to_original.is_empty()
    }

    /// Iterates `(copy, original)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, Handle)> + '_ {
        self.copy_to_original.iter().map(|(c, o)| (*c, *o))
    }

    /// Drops every pair.
    pub fn clear(&mut self) {
        self.copy_to_original.clear();
        self.original_to_copy.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_both_ways() {
        let mut registry = WorkingCopyRegistry::new(Direction::Forward);
        let copy = Handle::new(0, 0);
        let original = Handle::new(7, 1);
        registry.register(copy, original);

        assert_eq!(registry.resolve_original_for(copy), Some(original));
        assert_eq!(registry.resolve_copy_for_original(original), Some(copy));
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.resolve_original_for(copy), None);
    }

    #[test]
    fn re_registering_replaces_pair() {
        let mut registry = WorkingCopyRegistry::new(Direction::Inverted);
        let copy = Handle::new(0, 0);
        registry.register(copy, Handle::new(1, 0));
        registry.register(copy, Handle::new(2, 0));

        assert_eq!(registry.resolve_original_for(copy), Some(Handle::new(2, 0)));
        assert_eq!(registry.resolve_copy_for_original(Handle::new(1, 0)), None);
        assert_eq!(registry.len(), 1);
    }
}
