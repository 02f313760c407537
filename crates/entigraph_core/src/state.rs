//! State guarded by the store lock.

use crate::copier::{BufferPool, Direction, GraphCopier};
use crate::entity::{EntityData, IdFinder, Root, TypeRegistry};
use crate::error::{CoreError, CoreResult};
use crate::graph::{Handle, Heap, Slot};
use crate::persist::Snapshot;
use crate::working::WorkingCopy;

/// How a member was found by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    Index,
    Scan,
}

/// The storage heap, the root aggregate and the registered types.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) heap: Heap,
    pub(crate) root: Root,
    pub(crate) types: TypeRegistry,
}

impl StoreState {
    /// Rebuilds storage from a replayed log. Types are registered later.
    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut root = Root::new();
        for (type_name, restored) in snapshot.collections {
            root.install(EntityData::restored(
                type_name,
                restored.members,
                restored.last_id,
            ));
        }
        Self {
            heap: snapshot.heap,
            root,
            types: TypeRegistry::new(),
        }
    }

    /// Hands out one fresh working copy per storage handle.
    pub(crate) fn copy_out(
        &self,
        pool: &BufferPool,
        validate: bool,
        handles: &[Handle],
    ) -> CoreResult<Vec<WorkingCopy>> {
        let copier = GraphCopier::new(&self.types, pool, validate);
        handles
            .iter()
            .map(|handle| {
                let mut heap = Heap::new();
                let outcome = copier.copy(&self.heap, &[*handle], &mut heap, Direction::Forward)?;
                let root = outcome
                    .roots
                    .first()
                    .copied()
                    .ok_or(CoreError::DanglingReference { handle: *handle })?;
                Ok(WorkingCopy::from_parts(heap, root, outcome.registry))
            })
            .collect()
    }

    /// Finds the member of `type_name` whose identifier is `id`.
    pub(crate) fn find_member(
        &self,
        type_name: &str,
        id: &Slot,
        parallel_threshold: usize,
    ) -> CoreResult<Option<(Handle, Lookup)>> {
        find_member(
            &self.heap,
            &self.root,
            &self.types,
            type_name,
            id,
            parallel_threshold,
        )
    }
}

/// Looks a member up by identifier.
///
/// Uses the id index when present, the configured finder otherwise, and
/// falls back to scanning the declared identifier field. Types without an
/// identifier never match.
pub(crate) fn find_member(
    heap: &Heap,
    root: &Root,
    types: &TypeRegistry,
    type_name: &str,
    id: &Slot,
    parallel_threshold: usize,
) -> CoreResult<Option<(Handle, Lookup)>> {
    let registered = types.entity(type_name)?;
    let data = root
        .collection(type_name)
        .ok_or_else(|| CoreError::not_registered(type_name))?;
    if data.is_indexed() {
        return Ok(data.find_by_id(id, heap, parallel_threshold).map(|h| (h, Lookup::Index)));
    }
    if let Some(finder) = data.id_finder() {
        return Ok(data
            .scan_by_id(id, heap, finder, parallel_threshold)
            .map(|h| (h, Lookup::Scan)));
    }
    let Some(ids) = registered.ids() else {
        return Ok(None);
    };
    let probe = IdFinder::field(ids.field());
    Ok(data
        .scan_by_id(id, heap, &probe, parallel_threshold)
        .map(|h| (h, Lookup::Scan)))
}
