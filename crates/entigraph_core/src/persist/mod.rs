//! Persistence of the storage graph.
//!
//! Every successful write hands the persister a [`ChangeSet`] describing
//! its net effect. Persisters store change sets as a log of
//! [`LogRecord`]s grouped into committed batches; [`Persister::load`]
//! replays the log into a [`Snapshot`] the store is rebuilt from.

mod memory;
mod record;

#[cfg(feature = "std")]
mod file;

#[cfg(feature = "std")]
pub use file::FilePersister;
pub use memory::MemoryPersister;
pub use record::{
    compute_crc32, scan_log, write_frame, write_records, write_sealed, LogRecord, LogScan,
    FRAME_HEADER_LEN, LOG_MAGIC, MAX_PAYLOAD_LEN,
};

use crate::entity::Root;
use crate::error::CoreResult;
use crate::graph::{Handle, Heap, Object, Slot};
use crate::identity::IdentitySet;
use crate::types::TypeName;
use std::collections::BTreeMap;
use std::fmt;

/// The net effect of one write on storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Objects created or replaced, with their final contents.
    pub written: Vec<(Handle, Object)>,
    /// Objects freed.
    pub freed: Vec<Handle>,
    /// Collections created.
    pub created: Vec<TypeName>,
    /// Members admitted.
    pub admitted: Vec<(TypeName, Handle)>,
    /// Members removed.
    pub removed: Vec<(TypeName, Handle)>,
    /// Generated-identifier cursors, final values.
    pub cursors: Vec<(TypeName, Option<Slot>)>,
}

impl ChangeSet {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
            && self.freed.is_empty()
            && self.created.is_empty()
            && self.admitted.is_empty()
            && self.removed.is_empty()
            && self.cursors.is_empty()
    }

    /// Describes the entire storage state as a single change set.
    #[must_use]
    pub fn full(heap: &Heap, root: &Root) -> Self {
        let mut changes = Self::default();
        for data in root.collections() {
            changes.created.push(data.type_name().clone());
            changes
                .admitted
                .extend(data.members().iter().map(|h| (data.type_name().clone(), h)));
            if let Some(cursor) = data.last_id() {
                changes
                    .cursors
                    .push((data.type_name().clone(), Some(cursor.clone())));
            }
        }
        changes.written = heap.iter().map(|(h, o)| (h, o.clone())).collect();
        changes
    }

    /// The records of this change set, closed by a commit of `batch`.
    ///
    /// Frees precede writes, so a slot freed and reused within one batch
    /// replays to its final occupant.
    #[must_use]
    pub fn to_records(&self, batch: u64) -> Vec<LogRecord> {
        let mut records = Vec::with_capacity(
            self.created.len()
                + self.freed.len()
                + self.written.len()
                + self.admitted.len()
                + self.removed.len()
                + self.cursors.len()
                + 1,
        );
        records.extend(self.created.iter().map(|t| LogRecord::Collection {
            type_name: t.clone(),
        }));
        records.extend(
            self.freed
                .iter()
                .map(|h| LogRecord::Freed { handle: *h }),
        );
        records.extend(self.written.iter().map(|(h, o)| LogRecord::Object {
            handle: *h,
            object: o.clone(),
        }));
        records.extend(self.removed.iter().map(|(t, h)| LogRecord::Member {
            type_name: t.clone(),
            handle: *h,
            present: false,
        }));
        records.extend(self.admitted.iter().map(|(t, h)| LogRecord::Member {
            type_name: t.clone(),
            handle: *h,
            present: true,
        }));
        records.extend(self.cursors.iter().map(|(t, id)| LogRecord::Cursor {
            type_name: t.clone(),
            id: id.clone(),
        }));
        records.push(LogRecord::Commit { batch });
        records
    }
}

/// One collection as recovered from a log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoredCollection {
    /// Members.
    pub members: IdentitySet,
    /// Generated-identifier cursor.
    pub last_id: Option<Slot>,
}

/// Storage state recovered from a log.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// The storage heap, handles as recorded.
    pub heap: Heap,
    /// Collections by type.
    pub collections: BTreeMap<TypeName, RestoredCollection>,
    /// Number of the last committed batch.
    pub batches: u64,
}

impl Snapshot {
    /// Replays committed records in order.
    #[must_use]
    pub fn replay(records: impl IntoIterator<Item = LogRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            match record {
                LogRecord::Collection { type_name } => {
                    snapshot.collections.entry(type_name).or_default();
                }
                LogRecord::Object { handle, object } => snapshot.heap.restore(handle, object),
                LogRecord::Freed { handle } => snapshot.heap.forget(handle),
                LogRecord::Member {
                    type_name,
                    handle,
                    present,
                } => {
                    let members = &mut snapshot.collections.entry(type_name).or_default().members;
                    if present {
                        members.insert(handle);
                    } else {
                        members.remove(handle);
                    }
                }
                LogRecord::Cursor { type_name, id } => {
                    snapshot.collections.entry(type_name).or_default().last_id = id;
                }
                LogRecord::Commit { batch } => snapshot.batches = batch,
                LogRecord::Seal { .. } => {}
            }
        }
        snapshot.heap.rebuild_free_list();
        snapshot
    }
}

/// Durable home of the storage graph.
///
/// Implementations must be shareable across threads; the store only calls
/// them while holding its lock, so calls never overlap.
pub trait Persister: Send + Sync + fmt::Debug {
    /// Appends one committed batch.
    ///
    /// # Errors
    ///
    /// Any failure; the store then rolls the write back.
    fn persist(&self, changes: &ChangeSet) -> CoreResult<()>;

    /// Replays everything persisted so far.
    ///
    /// Returns `None` if nothing was ever persisted.
    ///
    /// # Errors
    ///
    /// I/O or corruption errors.
    fn load(&self) -> CoreResult<Option<Snapshot>>;

    /// Replaces the log with `full`, a description of the entire state.
    ///
    /// # Errors
    ///
    /// Any failure; the previous log must stay intact.
    fn checkpoint(&self, full: &ChangeSet) -> CoreResult<()>;

    /// Number of batches persisted, including replayed ones.
    fn batches(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::IdFinder;

    #[test]
    fn replay_applies_frees_and_member_changes() {
        let order = TypeName::new("Order");
        let a = Handle::new(0, 0);
        let b = Handle::new(1, 0);
        let first = ChangeSet {
            written: vec![
                (a, Object::new("Order").with("id", 0)),
                (b, Object::new("Order").with("id", 1)),
            ],
            created: vec![order.clone()],
            admitted: vec![(order.clone(), a), (order.clone(), b)],
            cursors: vec![(order.clone(), Some(Slot::Int(1)))],
            ..ChangeSet::default()
        };
        let second = ChangeSet {
            freed: vec![b],
            removed: vec![(order.clone(), b)],
            ..ChangeSet::default()
        };

        let mut records = first.to_records(1);
        records.extend(second.to_records(2));
        let snapshot = Snapshot::replay(records);

        assert_eq!(snapshot.batches, 2);
        assert_eq!(snapshot.heap.len(), 1);
        assert!(snapshot.heap.contains(a));
        assert!(!snapshot.heap.contains(b));
        let restored = &snapshot.collections[&order];
        assert_eq!(restored.members.len(), 1);
        assert_eq!(restored.last_id, Some(Slot::Int(1)));

        // the freed slot is reused with a fresh generation
        let mut heap = snapshot.heap;
        let reused = heap.alloc(Object::new("Order"));
        assert_eq!(reused, Handle::new(1, 1));
    }

    #[test]
    fn full_change_set_covers_everything() {
        let mut heap = Heap::new();
        let mut root = Root::new();
        let name = TypeName::new("Account");
        let data = root.ensure_collection(&name).0;
        data.set_id_getter(Some(IdFinder::field("id")), &heap).unwrap();
        let a = heap.alloc(Object::new("Account").with("id", 4));
        let loose = heap.alloc(Object::new("Note"));
        let data = root.collection_mut("Account").unwrap();
        data.ensure_member_and_return_changed(a, &heap).unwrap();
        data.set_last_id(Some(Slot::Int(4)));

        let full = ChangeSet::full(&heap, &root);
        assert_eq!(full.written.len(), 2);
        assert!(full.written.iter().any(|(h, _)| *h == loose));
        assert_eq!(full.admitted, vec![(name.clone(), a)]);
        assert_eq!(full.cursors, vec![(name, Some(Slot::Int(4)))]);
        assert!(!full.is_empty());
        assert!(ChangeSet::default().is_empty());
    }
}
