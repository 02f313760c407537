//! Reference-identity sets.

use crate::graph::Handle;
use std::collections::BTreeSet;

/// A set whose membership is decided by reference identity alone.
///
/// Two objects with equal fields are still two members. Iteration follows
/// handle order, which is allocation order within one heap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySet {
    members: BTreeSet<Handle>,
}

impl IdentitySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member. Returns false if it was already present.
    pub fn insert(&mut self, handle: Handle) -> bool {
        self.members.insert(handle)
    }

    /// Removes a member. Returns false if it was absent.
    pub fn remove(&mut self, handle: Handle) -> bool {
        self.members.remove(&handle)
    }

    /// Returns true if `handle` is a member.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.members.contains(&handle)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates members.
    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.members.iter().copied()
    }

    /// Removes every member, returning them.
    pub fn drain(&mut self) -> Vec<Handle> {
        std::mem::take(&mut self.members).into_iter().collect()
    }
}

impl FromIterator<Handle> for IdentitySet {
    fn from_iter<I: IntoIterator<Item = Handle>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Heap, Object};

    #[test]
    fn equal_objects_are_distinct_members() {
        let mut heap = Heap::new();
        let a = heap.alloc(Object::new("Account").with("balance", 5));
        let b = heap.alloc(Object::new("Account").with("balance", 5));
        assert_eq!(heap.get(a), heap.get(b));

        let mut set = IdentitySet::new();
        assert!(set.insert(a));
        assert!(set.insert(b));
        assert!(!set.insert(a));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn remove_and_drain() {
        let mut set: IdentitySet = [Handle::new(0, 0), Handle::new(1, 0)].into_iter().collect();
        assert!(set.remove(Handle::new(0, 0)));
        assert!(!set.remove(Handle::new(0, 0)));
        assert_eq!(set.drain(), vec![Handle::new(1, 0)]);
        assert!(set.is_empty());
    }
}
