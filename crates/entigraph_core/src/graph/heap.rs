//! Generational object arena.

use super::object::Object;
use std::collections::HashSet;
use std::fmt;

/// Reference identity of an object inside one [`Heap`].
///
/// A slot index paired with the generation it was allocated in. Freeing an
/// object bumps its slot's generation, so stale handles to a recycled slot
/// never resolve to the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    /// Slot position in the arena.
    pub index: u32,
    /// Allocation generation of the slot.
    pub generation: u32,
}

impl Handle {
    /// Creates a handle from its raw parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Default)]
struct Entry {
    generation: u32,
    object: Option<Object>,
}

/// An arena of objects addressed by [`Handle`].
#[derive(Debug, Clone, Default)]
pub struct Heap {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object and returns its handle.
    pub fn alloc(&mut self, object: Object) -> Handle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.object = Some(object);
            return Handle::new(index, entry.generation);
        }
        let index = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        self.entries.push(Entry {
            generation: 0,
            object: Some(object),
        });
        Handle::new(index, 0)
    }

    fn entry(&self, handle: Handle) -> Option<&Entry> {
        self.entries
            .get(handle.index as usize)
            .filter(|e| e.generation == handle.generation)
    }

    /// Returns the object behind `handle`, if it is live.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&Object> {
        self.entry(handle)?.object.as_ref()
    }

    /// Returns the object behind `handle` mutably, if it is live.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Object> {
        self.entries
            .get_mut(handle.index as usize)
            .filter(|e| e.generation == handle.generation)?
            .object
            .as_mut()
    }

    /// Returns true if `handle` names a live object.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Swaps the object behind a live handle, returning the previous one.
    pub fn replace(&mut self, handle: Handle, object: Object) -> Option<Object> {
        let slot = self.get_mut(handle)?;
        Some(std::mem::replace(slot, object))
    }

    /// Frees a live object. Its handle, and every copy of it, goes stale.
    pub fn free(&mut self, handle: Handle) -> Option<Object> {
        let entry = self
            .entries
            .get_mut(handle.index as usize)
            .filter(|e| e.generation == handle.generation)?;
        let object = entry.object.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(object)
    }

    /// Places an object at an exact handle, as recorded in a log.
    ///
    /// Overwrites whatever occupied the slot. Call [`Heap::rebuild_free_list`]
    /// once all objects are restored.
    pub fn restore(&mut self, handle: Handle, object: Object) {
        let index = handle.index as usize;
        if self.entries.len() <= index {
            self.entries.resize_with(index + 1, Entry::default);
        }
        let entry = &mut self.entries[index];
        if entry.object.is_none() {
            self.live += 1;
            self.free.retain(|&i| i != handle.index);
        }
        entry.generation = handle.generation;
        entry.object = Some(object);
    }

    /// Marks a handle as freed while replaying a log.
    pub fn forget(&mut self, handle: Handle) {
        let index = handle.index as usize;
        if self.entries.len() <= index {
            self.entries.resize_with(index + 1, Entry::default);
        }
        let entry = &mut self.entries[index];
        if entry.object.take().is_some() {
            self.live -= 1;
        }
        entry.generation = handle.generation.wrapping_add(1);
    }

    /// Recomputes the free list after restores.
    pub fn rebuild_free_list(&mut self) {
        self.free = self
            .entries
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, e)| e.object.is_none())
            .filter_map(|(i, _)| u32::try_from(i).ok())
            .collect();
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no object is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates live objects in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Object)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            let object = e.object.as_ref()?;
            Some((Handle::new(u32::try_from(i).ok()?, e.generation), object))
        })
    }

    /// Handles of every object reachable from `roots`, roots included.
    #[must_use]
    pub fn reachable(&self, roots: impl IntoIterator<Item = Handle>) -> HashSet<Handle> {
        let mut seen = HashSet::new();
        let mut stack: Vec<Handle> = roots.into_iter().collect();
        while let Some(handle) = stack.pop() {
            let Some(object) = self.get(handle) else {
                continue;
            };
            if !seen.insert(handle) {
                continue;
            }
            object.for_each_ref(&mut |r| stack.push(r));
        }
        seen
    }

    /// Frees every object not reachable from `roots`.
    ///
    /// Returns the freed handles with the objects they held.
    pub fn collect_garbage(
        &mut self,
        roots: impl IntoIterator<Item = Handle>,
    ) -> Vec<(Handle, Object)> {
        let marked = self.reachable(roots);
        let doomed: Vec<Handle> = self
            .iter()
            .map(|(h, _)| h)
            .filter(|h| !marked.contains(h))
            .collect();
        doomed
            .into_iter()
            .filter_map(|h| self.free(h).map(|o| (h, o)))
            .collect()
    }
}
