//! Reachability admission.
//!
//! After a write, every entity reachable from the written object must be a
//! member of its type's collection. The synchronizer walks the stored graph
//! and admits whatever it finds missing.

use crate::entity::{Root, TypeRegistry};
use crate::error::{CoreError, CoreResult};
use crate::graph::{Handle, Heap};
use crate::types::TypeName;
use crate::undo::UndoLog;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Collections changed by one walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Types whose collection gained members.
    pub changed: BTreeSet<TypeName>,
    /// Newly admitted handles, in admission order.
    pub admitted: Vec<Handle>,
    /// Objects visited.
    pub visited: usize,
}

/// Walks stored graphs and admits unseen entities.
#[derive(Debug, Clone, Copy)]
pub struct RepositorySynchronizer<'a> {
    types: &'a TypeRegistry,
}

impl<'a> RepositorySynchronizer<'a> {
    /// Creates a synchronizer over the registered types.
    #[must_use]
    pub fn new(types: &'a TypeRegistry) -> Self {
        Self { types }
    }

    /// Admits every entity reachable from `start` that is not yet tracked.
    ///
    /// Admission ensures an identifier, stamps a first version when none is
    /// set, and adds the object to its collection. Transient fields are not
    /// followed.
    ///
    /// # Errors
    ///
    /// Identifier and index errors from admission; `UnsupportedType` for an
    /// unregistered object.
    pub fn sync_and_return_changed(
        &self,
        heap: &mut Heap,
        root: &mut Root,
        start: Handle,
    ) -> CoreResult<SyncOutcome> {
        let mut undo = UndoLog::new();
        match self.sync_logged(heap, root, start, &mut undo) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                undo.rollback(heap, root);
                Err(err)
            }
        }
    }

    pub(crate) fn sync_logged(
        &self,
        heap: &mut Heap,
        root: &mut Root,
        start: Handle,
        undo: &mut UndoLog,
    ) -> CoreResult<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        let mut visited = HashSet::new();
        let mut stack = vec![start];

        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            let Some(object) = heap.get(handle) else {
                continue;
            };
            let type_name = object.type_name().clone();
            let registered = self
                .types
                .get(type_name.as_str())
                .ok_or_else(|| CoreError::unsupported_type(&type_name))?;
            let descriptor = registered.descriptor();

            for (name, slot) in object.fields() {
                if !descriptor.is_transient(name) {
                    slot.for_each_ref(&mut |r| stack.push(r));
                }
            }

            if !descriptor.is_entity() {
                continue;
            }
            let data = root
                .collection_mut(type_name.as_str())
                .ok_or_else(|| CoreError::not_registered(&type_name))?;
            if data.contains(handle) {
                continue;
            }

            let previous = heap.get(handle).cloned();
            let mut object = previous.clone().ok_or(CoreError::DanglingReference { handle })?;
            if let Some(ids) = registered.ids() {
                if ids.current_id(&object).is_none() {
                    undo.cursor(type_name.clone(), data.last_id().cloned());
                }
                ids.ensure_id(&mut object, data)?;
            }
            if let Some(versions) = registered.versions() {
                if versions.current(&object).is_null() {
                    versions.increment_version(&mut object);
                }
            }
            if Some(&object) != previous.as_ref() {
                if let Some(previous) = heap.replace(handle, object) {
                    undo.replaced(handle, previous);
                }
            }

            data.ensure_member_and_return_changed(handle, heap)?;
            undo.admitted(type_name.clone(), handle);
            debug!(%type_name, %handle, "admitted entity");
            outcome.changed.insert(type_name);
            outcome.admitted.push(handle);
        }

        outcome.visited = visited.len();
        Ok(outcome)
    }
}
