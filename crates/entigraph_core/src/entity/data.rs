//! Per-type tracked collections.

use super::id::IdFinder;
use crate::error::{CoreError, CoreResult};
use crate::graph::{Handle, Heap, Slot};
use crate::identity::IdentitySet;
use crate::types::TypeName;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::thread;
use tracing::debug;

/// Part of an [`EntityData`] touched by an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangedPart {
    /// The identity set gained a member.
    Members,
    /// The id index gained an entry.
    IdIndex,
}

/// The tracked members of one entity type.
///
/// Members are storage handles compared by identity. While an id finder is
/// configured, the id index holds exactly the same members as the identity
/// set.
#[derive(Debug, Clone)]
pub struct EntityData {
    type_name: TypeName,
    members: IdentitySet,
    id_index: Option<HashMap<Slot, Handle>>,
    finder: Option<IdFinder>,
    last_id: Option<Slot>,
}

impl EntityData {
    /// Creates an empty, unindexed collection.
    #[must_use]
    pub fn new(type_name: TypeName) -> Self {
        Self {
            type_name,
            members: IdentitySet::new(),
            id_index: None,
            finder: None,
            last_id: None,
        }
    }

    pub(crate) fn restored(type_name: TypeName, members: IdentitySet, last_id: Option<Slot>) -> Self {
        Self {
            type_name,
            members,
            id_index: None,
            finder: None,
            last_id,
        }
    }

    /// The entity type tracked here.
    #[must_use]
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// The members.
    #[must_use]
    pub fn members(&self) -> &IdentitySet {
        &self.members
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

    /// Returns true if `handle` is a member.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.members.contains(handle)
    }

    /// The configured id finder.
    #[must_use]
    pub fn id_finder(&self) -> Option<&IdFinder> {
        self.finder.as_ref()
    }

    /// Returns true while an id index is maintained.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.id_index.is_some()
    }

    /// The last generated identifier.
    #[must_use]
    pub fn last_id(&self) -> Option<&Slot> {
        self.last_id.as_ref()
    }

    /// Moves the generated-identifier cursor.
    pub fn set_last_id(&mut self, id: Option<Slot>) {
        self.last_id = id;
    }

    /// Returns true if the id index already maps `id`.
    ///
    /// Always false for an unindexed collection.
    #[must_use]
    pub fn contains_id(&self, id: &Slot) -> bool {
        self.id_index.as_ref().is_some_and(|index| index.contains_key(id))
    }

    /// Admits `handle` unless it is already a member.
    ///
    /// Returns the parts that changed; empty when `handle` was already
    /// present. Admitting twice is a no-op.
    ///
    /// # Errors
    ///
    /// With an index configured: `MissingId` if the finder yields no
    /// identifier, `DuplicateId` if another member already has it.
    pub fn ensure_member_and_return_changed(
        &mut self,
        handle: Handle,
        heap: &Heap,
    ) -> CoreResult<Vec<ChangedPart>> {
        if self.members.contains(handle) {
            return Ok(Vec::new());
        }

        let mut changed = vec![ChangedPart::Members];
        if let (Some(index), Some(finder)) = (self.id_index.as_mut(), self.finder.as_ref()) {
            let object = heap
                .get(handle)
                .ok_or(CoreError::DanglingReference { handle })?;
            let id = finder.find(object).ok_or_else(|| CoreError::MissingId {
                type_name: self.type_name.clone(),
            })?;
            if index.get(&id).is_some_and(|existing| *existing != handle) {
                return Err(CoreError::DuplicateId {
                    type_name: self.type_name.clone(),
                    id: id.render(),
                });
            }
            index.insert(id, handle);
            changed.push(ChangedPart::IdIndex);
        }
        self.members.insert(handle);
        Ok(changed)
    }

    /// Drops `handle` from the identity set and the id index.
    pub fn remove_member(&mut self, handle: Handle, heap: &Heap) -> bool {
        if !self.members.remove(handle) {
            return false;
        }
        if let Some(index) = self.id_index.as_mut() {
            let id = self
                .finder
                .as_ref()
                .zip(heap.get(handle))
                .and_then(|(finder, object)| finder.find(object));
            match id {
                Some(id) if index.get(&id) == Some(&handle) => {
                    index.remove(&id);
                }
                _ => index.retain(|_, h| *h != handle),
            }
        }
        true
    }

    /// Removes every member, returning them.
    pub fn clear(&mut self) -> Vec<Handle> {
        if let Some(index) = self.id_index.as_mut() {
            index.clear();
        }
        self.members.drain()
    }

    /// Looks up a member by identifier.
    ///
    /// Uses the index when present, otherwise scans with the configured
    /// finder. Returns `None` for an unindexed collection without a finder.
    #[must_use]
    pub fn find_by_id(&self, id: &Slot, heap: &Heap, parallel_threshold: usize) -> Option<Handle> {
        if let Some(index) = &self.id_index {
            return index.get(id).copied();
        }
        let finder = self.finder.as_ref()?;
        self.scan_by_id(id, heap, finder, parallel_threshold)
    }

    /// Scans the members for one whose `probe` yields `id`.
    ///
    /// Collections larger than `parallel_threshold` are split across scoped
    /// threads; `0` disables splitting.
    #[must_use]
    pub fn scan_by_id(
        &self,
        id: &Slot,
        heap: &Heap,
        probe: &IdFinder,
        parallel_threshold: usize,
    ) -> Option<Handle> {
        let matches = |h: &Handle| {
            heap.get(*h)
                .and_then(|object| probe.find(object))
                .is_some_and(|found| &found == id)
        };

        if parallel_threshold == 0 || self.members.len() <= parallel_threshold {
            return self.members.iter().find(matches);
        }

        let members: Vec<Handle> = self.members.iter().collect();
        let workers = thread::available_parallelism()
            .map_or(2, NonZeroUsize::get)
            .min(members.len() / parallel_threshold + 1)
            .max(1);
        let chunk = members.len().div_ceil(workers);
        debug!(type_name = %self.type_name, members = members.len(), workers, "parallel id scan");

        thread::scope(|scope| {
            let tasks: Vec<_> = members
                .chunks(chunk)
                .map(|part| scope.spawn(move || part.iter().copied().find(|h| matches(h))))
                .collect();
            tasks
                .into_iter()
                .filter_map(|task| task.join().ok().flatten())
                .min()
        })
    }

    /// Replaces the id finder and rebuilds the index.
    ///
    /// `None` drops the index. If two members map to the same identifier
    /// under the new finder the change is rejected and the previous finder
    /// and index stay in place.
    ///
    /// # Errors
    ///
    /// `DuplicateId` on a collision, `MissingId` if a member has no
    /// identifier under the new finder.
    pub fn set_id_getter(&mut self, finder: Option<IdFinder>, heap: &Heap) -> CoreResult<()> {
        let Some(finder) = finder else {
            self.finder = None;
            self.id_index = None;
            return Ok(());
        };

        let mut index = HashMap::with_capacity(self.members.len());
        for handle in self.members.iter() {
            let object = heap
                .get(handle)
                .ok_or(CoreError::DanglingReference { handle })?;
            let id = finder.find(object).ok_or_else(|| CoreError::MissingId {
                type_name: self.type_name.clone(),
            })?;
            if let Some(previous) = index.insert(id.clone(), handle) {
                if previous != handle {
                    return Err(CoreError::DuplicateId {
                        type_name: self.type_name.clone(),
                        id: id.render(),
                    });
                }
            }
        }

        debug!(type_name = %self.type_name, finder = finder.label(), entries = index.len(), "rebuilt id index");
        self.finder = Some(finder);
        self.id_index = Some(index);
        Ok(())
    }
}
