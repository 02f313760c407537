//! Undo log for all-or-nothing writes.
//!
//! Every storage mutation made while handling one write request is recorded
//! here. On failure the log is replayed backwards; on success it doubles as
//! the description of what changed, from which the persisted
//! [`ChangeSet`] is built.

use crate::entity::Root;
use crate::graph::{Handle, Heap, Object, Slot};
use crate::persist::ChangeSet;
use crate::types::TypeName;
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

#[derive(Debug)]
enum UndoEntry {
    Allocated(Handle),
    Replaced(Handle, Object),
    Freed(Handle, Object),
    Admitted(TypeName, Handle),
    Removed(TypeName, Handle),
    Cursor(TypeName, Option<Slot>),
}

/// Storage mutations of one write, in order.
#[derive(Debug, Default)]
pub(crate) struct UndoLog {
    entries: Vec<UndoEntry>,
}

impl UndoLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocated(&mut self, handle: Handle) {
        self.entries.push(UndoEntry::Allocated(handle));
    }

    pub(crate) fn replaced(&mut self, handle: Handle, previous: Object) {
        self.entries.push(UndoEntry::Replaced(handle, previous));
    }

    pub(crate) fn freed(&mut self, handle: Handle, object: Object) {
        self.entries.push(UndoEntry::Freed(handle, object));
    }

    pub(crate) fn admitted(&mut self, type_name: TypeName, handle: Handle) {
        self.entries.push(UndoEntry::Admitted(type_name, handle));
    }

    pub(crate) fn removed(&mut self, type_name: TypeName, handle: Handle) {
        self.entries.push(UndoEntry::Removed(type_name, handle));
    }

    pub(crate) fn cursor(&mut self, type_name: TypeName, previous: Option<Slot>) {
        self.entries.push(UndoEntry::Cursor(type_name, previous));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restores storage to its state before the first recorded mutation.
    pub(crate) fn rollback(self, heap: &mut Heap, root: &mut Root) {
        let undone = self.entries.len();
        for entry in self.entries.into_iter().rev() {
            match entry {
                UndoEntry::Allocated(handle) => {
                    heap.free(handle);
                }
                UndoEntry::Replaced(handle, previous) => {
                    heap.replace(handle, previous);
                }
                UndoEntry::Freed(handle, object) => heap.restore(handle, object),
                UndoEntry::Admitted(type_name, handle) => {
                    if let Some(data) = root.collection_mut(type_name.as_str()) {
                        data.remove_member(handle, heap);
                    }
                }
                UndoEntry::Removed(type_name, handle) => {
                    if let Some(data) = root.collection_mut(type_name.as_str()) {
                        if let Err(err) = data.ensure_member_and_return_changed(handle, heap) {
                            warn!(%type_name, %handle, error = %err, "could not restore member");
                        }
                    }
                }
                UndoEntry::Cursor(type_name, previous) => {
                    if let Some(data) = root.collection_mut(type_name.as_str()) {
                        data.set_last_id(previous);
                    }
                }
            }
        }
        warn!(mutations = undone, "rolled back rejected write");
    }

    /// Describes the net effect of this write for the persister.
    pub(crate) fn change_set(&self, heap: &Heap, root: &Root) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let mut seen = HashSet::new();
        let mut cursors = BTreeSet::new();

        for entry in &self.entries {
            match entry {
                UndoEntry::Allocated(handle) | UndoEntry::Replaced(handle, _) => {
                    if seen.insert(*handle) {
                        if let Some(object) = heap.get(*handle) {
                            changes.written.push((*handle, object.clone()));
                        }
                    }
                }
                UndoEntry::Freed(handle, _) => changes.freed.push(*handle),
                UndoEntry::Admitted(type_name, handle) => {
                    changes.admitted.push((type_name.clone(), *handle));
                }
                UndoEntry::Removed(type_name, handle) => {
                    changes.removed.push((type_name.clone(), *handle));
                }
                UndoEntry::Cursor(type_name, _) => {
                    cursors.insert(type_name.clone());
                }
            }
        }

        changes.cursors = cursors
            .into_iter()
            .filter_map(|t| {
                let cursor = root.collection(t.as_str())?.last_id().cloned();
                Some((t, cursor))
            })
            .collect();
        changes
    }
}
