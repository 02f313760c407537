//! Merging working copies back into storage.
//!
//! A batch is merged in two phases. Planning decides, for every object of
//! every copy, which storage object it lands on and whether it changed,
//! and runs every check; nothing in storage is touched until all copies
//! pass. Applying then allocates new objects, writes the changed ones and
//! admits whatever became reachable, recording each mutation in the undo
//! log.

use super::{
    plain_value_to_slot, slot_to_value, Direction, GraphCopier, ImageEntry, WorkingCopyRegistry,
};
use crate::entity::{RegisteredType, Root, TypeRegistry};
use crate::error::{CoreError, CoreResult};
use crate::graph::{Handle, Heap, Object, Slot};
use crate::state::find_member;
use crate::sync::RepositorySynchronizer;
use crate::types::TypeName;
use crate::undo::UndoLog;
use crate::working::WorkingCopy;
use entigraph_codec::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Existing(Handle),
    New,
}

/// One copy, decoded and resolved against storage.
#[derive(Debug)]
struct Plan {
    entries: Vec<ImageEntry>,
    sources: Vec<Handle>,
    root: usize,
    targets: Vec<Target>,
    dirty: Vec<bool>,
}

/// What a merged batch wrote.
#[derive(Debug)]
pub(crate) struct MergeOutcome {
    /// Storage handle of each copy's root, in batch order.
    pub(crate) roots: Vec<Handle>,
    /// Storage objects written.
    pub(crate) written: usize,
}

fn lookup_type<'t>(types: &'t TypeRegistry, type_name: &TypeName) -> CoreResult<&'t RegisteredType> {
    types
        .get(type_name.as_str())
        .ok_or_else(|| CoreError::unsupported_type(type_name))
}

/// The identifier carried by an encoded entry, if any.
fn entry_id(entry: &ImageEntry, registered: &RegisteredType) -> CoreResult<Option<Slot>> {
    let Some(ids) = registered.ids() else {
        return Ok(None);
    };
    match entry.field(ids.field()) {
        Some(value) if !value.is_null() => plain_value_to_slot(value).map(Some),
        _ => Ok(None),
    }
}

fn entry_version(entry: &ImageEntry, field: &str) -> CoreResult<Slot> {
    entry
        .field(field)
        .map_or(Ok(Slot::Null), plain_value_to_slot)
}

fn local_ref(index: usize) -> Value {
    Value::Integer(i64::try_from(index).unwrap_or(i64::MAX))
}

/// Compares an entry against the stored object it targets.
///
/// Version and immutable fields are ignored, as is the identifier when
/// the entry carries none; those are taken from storage on write. Stored
/// references compare equal to entry references that resolve to the same
/// storage object.
fn differs(
    entry: &ImageEntry,
    stored: &Object,
    registered: &RegisteredType,
    local_of: &HashMap<Handle, usize>,
    id_missing: bool,
) -> CoreResult<bool> {
    let descriptor = registered.descriptor();
    let version_field = registered.versions().map(|v| v.field());
    let id_field = registered.ids().map(|i| i.field()).filter(|_| id_missing);
    let skip = |name: &str| {
        descriptor.is_transient(name)
            || descriptor.is_immutable(name)
            || version_field == Some(name)
            || id_field == Some(name)
    };

    let mut working: Vec<(&str, &Value)> = entry
        .fields
        .iter()
        .filter(|(name, value)| !skip(name) && !value.is_null())
        .map(|(name, value)| (name.as_str(), value))
        .collect();
    working.sort_by(|a, b| a.0.cmp(b.0));

    let mut current = Vec::with_capacity(working.len());
    for (name, slot) in stored.fields() {
        if skip(name) || slot.is_null() {
            continue;
        }
        let value = slot_to_value(slot, &mut |h| {
            Ok(match local_of.get(&h) {
                Some(local) => local_ref(*local),
                None => Value::Array(vec![
                    Value::Integer(i64::from(h.index)),
                    Value::Integer(i64::from(h.generation)),
                ]),
            })
        })?;
        current.push((name, value));
    }

    Ok(working.len() != current.len()
        || working
            .iter()
            .zip(&current)
            .any(|((wn, wv), (cn, cv))| wn != cn || *wv != cv))
}

/// Resolves one copy against storage.
fn plan_copy(
    copier: GraphCopier<'_>,
    heap: &Heap,
    root: &Root,
    copy: &WorkingCopy,
    parallel_threshold: usize,
    unclaimed_ids: &mut HashSet<(TypeName, Slot)>,
) -> CoreResult<Plan> {
    let types = copier.types();
    let image = copier.serialize(copy.heap(), &[copy.root()])?;
    let entries = image.decode()?;
    let sources = image.sources().to_vec();
    let root_index = image.roots().first().copied().unwrap_or(0);
    drop(image);

    let mut targets = Vec::with_capacity(entries.len());
    for (entry, working) in entries.iter().zip(&sources) {
        let registered = lookup_type(types, &entry.type_name)?;
        let origin = copy.origin_of(*working).filter(|o| {
            heap.get(*o)
                .is_some_and(|stored| stored.type_name() == &entry.type_name)
        });
        let target = match origin {
            Some(stored) => Target::Existing(stored),
            None if registered.descriptor().is_entity() => match entry_id(entry, registered)? {
                Some(id) => {
                    if !unclaimed_ids.insert((entry.type_name.clone(), id.clone())) {
                        return Err(CoreError::invalid_batch(format!(
                            "{} {} is saved twice without provenance",
                            entry.type_name,
                            id.render()
                        )));
                    }
                    match find_member(heap, root, types, entry.type_name.as_str(), &id, parallel_threshold)? {
                        Some((stored, _)) => Target::Existing(stored),
                        None => Target::New,
                    }
                }
                None => {
                    if registered.ids().is_some_and(|ids| !ids.generates()) {
                        return Err(CoreError::MissingId {
                            type_name: entry.type_name.clone(),
                        });
                    }
                    Target::New
                }
            },
            None => Target::New,
        };
        targets.push(target);
    }

    let local_of: HashMap<Handle, usize> = targets
        .iter()
        .enumerate()
        .rev()
        .filter_map(|(i, t)| match t {
            Target::Existing(h) => Some((*h, i)),
            Target::New => None,
        })
        .collect();

    let mut dirty = Vec::with_capacity(entries.len());
    for (i, (entry, target)) in entries.iter().zip(&targets).enumerate() {
        let changed = match target {
            Target::New => true,
            Target::Existing(stored) => {
                let registered = lookup_type(types, &entry.type_name)?;
                let stored = heap
                    .get(*stored)
                    .ok_or(CoreError::DanglingReference { handle: *stored })?;
                let id_missing = entry_id(entry, registered)?.is_none();
                i == root_index || differs(entry, stored, registered, &local_of, id_missing)?
            }
        };
        dirty.push(changed);
    }

    Ok(Plan {
        entries,
        sources,
        root: root_index,
        targets,
        dirty,
    })
}

/// Rejects a dirty entry that would overwrite a newer or different entity.
fn check_existing(entry: &ImageEntry, registered: &RegisteredType, stored: &Object) -> CoreResult<()> {
    if let Some(ids) = registered.ids() {
        if let (Some(working), Some(current)) = (entry_id(entry, registered)?, ids.current_id(stored)) {
            if &working != current {
                return Err(CoreError::IdChanged {
                    type_name: entry.type_name.clone(),
                    stored: current.render(),
                    working: working.render(),
                });
            }
        }
    }
    if let Some(versions) = registered.versions() {
        let working = entry_version(entry, versions.field())?;
        versions.check(&working, versions.current(stored))?;
    }
    Ok(())
}

/// Builds the object a dirty entry writes.
fn prepare(
    entry: &ImageEntry,
    table: &[Handle],
    target: Target,
    registered: &RegisteredType,
    heap: &Heap,
) -> CoreResult<Object> {
    let mut object = entry.materialize(table)?;
    match target {
        Target::Existing(handle) => {
            let stored = heap
                .get(handle)
                .ok_or(CoreError::DanglingReference { handle })?;
            if let Some(ids) = registered.ids() {
                if ids.current_id(&object).is_none() {
                    if let Some(id) = ids.current_id(stored) {
                        object.set(ids.field(), id.clone());
                    }
                }
            }
            for field in registered.descriptor().immutable_fields() {
                let kept = stored.get(field);
                if !kept.is_null() {
                    object.set(field, kept.clone());
                }
            }
            if let Some(versions) = registered.versions() {
                object.set(versions.field(), versions.current(stored).clone());
                versions.increment_version(&mut object);
            }
        }
        Target::New => {
            if let Some(versions) = registered.versions() {
                object.set(versions.field(), versions.first());
            }
        }
    }
    Ok(object)
}

/// Writes `object` over a storage handle, keeping the id index in step
/// when the identifier a custom finder derives changes.
fn write_object(
    heap: &mut Heap,
    root: &mut Root,
    handle: Handle,
    object: Object,
    undo: &mut UndoLog,
) -> CoreResult<()> {
    let type_name = object.type_name().clone();
    let mut reindex = false;
    if let Some(data) = root.collection_mut(type_name.as_str()) {
        if data.contains(handle) && data.is_indexed() {
            let before = data
                .id_finder()
                .zip(heap.get(handle))
                .and_then(|(finder, stored)| finder.find(stored));
            let after = data.id_finder().and_then(|finder| finder.find(&object));
            if before != after {
                data.remove_member(handle, heap);
                undo.removed(type_name.clone(), handle);
                reindex = true;
            }
        }
    }

    let previous = heap
        .replace(handle, object)
        .ok_or(CoreError::DanglingReference { handle })?;
    undo.replaced(handle, previous);

    if reindex {
        if let Some(data) = root.collection_mut(type_name.as_str()) {
            data.ensure_member_and_return_changed(handle, heap)?;
            undo.admitted(type_name, handle);
        }
    }
    Ok(())
}

/// Merges a batch of working copies into storage.
///
/// Every check runs before the first mutation. Mutations are recorded in
/// `undo`; on error the caller rolls them back.
pub(crate) fn merge_batch(
    heap: &mut Heap,
    root: &mut Root,
    copier: GraphCopier<'_>,
    copies: &[WorkingCopy],
    parallel_threshold: usize,
    undo: &mut UndoLog,
) -> CoreResult<MergeOutcome> {
    let types = copier.types();

    let mut unclaimed_ids = HashSet::new();
    let plans = copies
        .iter()
        .map(|copy| plan_copy(copier, heap, root, copy, parallel_threshold, &mut unclaimed_ids))
        .collect::<CoreResult<Vec<_>>>()?;

    let mut writers: HashMap<Handle, usize> = HashMap::new();
    for plan in &plans {
        for ((entry, target), dirty) in plan.entries.iter().zip(&plan.targets).zip(&plan.dirty) {
            let (Target::Existing(stored), true) = (target, *dirty) else {
                continue;
            };
            let count = writers.entry(*stored).or_insert(0);
            *count += 1;
            if *count > 1 {
                return Err(CoreError::invalid_batch(format!(
                    "{stored} ({}) is written by more than one working object",
                    entry.type_name
                )));
            }
            let object = heap
                .get(*stored)
                .ok_or(CoreError::DanglingReference { handle: *stored })?;
            check_existing(entry, lookup_type(types, &entry.type_name)?, object)?;
        }
    }

    let mut tables: Vec<Vec<Handle>> = Vec::with_capacity(plans.len());
    for plan in &plans {
        let mut table = Vec::with_capacity(plan.entries.len());
        for (entry, target) in plan.entries.iter().zip(&plan.targets) {
            let handle = match target {
                Target::Existing(handle) => *handle,
                Target::New => {
                    let handle = heap.alloc(Object::new(entry.type_name.clone()));
                    undo.allocated(handle);
                    handle
                }
            };
            table.push(handle);
        }
        tables.push(table);
    }

    let mut written = 0;
    let mut roots = Vec::with_capacity(plans.len());
    for (plan, table) in plans.iter().zip(&tables) {
        for (i, entry) in plan.entries.iter().enumerate() {
            if !plan.dirty[i] {
                continue;
            }
            let registered = lookup_type(types, &entry.type_name)?;
            let object = prepare(entry, table, plan.targets[i], registered, heap)?;
            copier.check(&object)?;
            write_object(heap, root, table[i], object, undo)?;
            written += 1;
        }

        let mut registry = WorkingCopyRegistry::new(Direction::Inverted);
        for (working, stored) in plan.sources.iter().zip(table) {
            registry.register(*working, *stored);
        }
        let stored_root = plan
            .sources
            .get(plan.root)
            .and_then(|working| registry.resolve_original_for(*working))
            .ok_or_else(|| CoreError::invalid_batch("working copy has no root"))?;
        roots.push(stored_root);
    }

    let sync = RepositorySynchronizer::new(types);
    for stored_root in &roots {
        sync.sync_logged(heap, root, *stored_root, undo)?;
    }

    debug!(copies = copies.len(), written, "merged batch");
    Ok(MergeOutcome { roots, written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copier::BufferPool;
    use crate::entity::{IdKind, TypeDescriptor, VersionKind};

    struct Fixture {
        heap: Heap,
        root: Root,
        types: TypeRegistry,
        pool: BufferPool,
    }

    impl Fixture {
        fn new() -> Self {
            let mut types = TypeRegistry::new();
            let mut root = Root::new();
            let heap = Heap::new();
            for descriptor in [
                TypeDescriptor::entity("Account")
                    .id("id", IdKind::Long)
                    .version("version", VersionKind::Long)
                    .immutable("opened")
                    .build()
                    .unwrap(),
                TypeDescriptor::entity("Customer")
                    .id("email", IdKind::Supplied)
                    .build()
                    .unwrap(),
                TypeDescriptor::embedded("Address").build().unwrap(),
            ] {
                let registered = types.register(descriptor).unwrap();
                if registered.descriptor().is_entity() {
                    let finder = registered.default_finder();
                    root.ensure_collection(registered.name())
                        .0
                        .set_id_getter(finder, &heap)
                        .unwrap();
                }
            }
            Self {
                heap,
                root,
                types,
                pool: BufferPool::new(2),
            }
        }

        fn merge(&mut self, copies: &[WorkingCopy]) -> CoreResult<MergeOutcome> {
            let copier = GraphCopier::new(&self.types, &self.pool, true);
            let mut undo = UndoLog::new();
            let result = merge_batch(&mut self.heap, &mut self.root, copier, copies, 0, &mut undo);
            if result.is_err() {
                undo.rollback(&mut self.heap, &mut self.root);
            }
            result
        }

        fn read(&self, handle: Handle) -> WorkingCopy {
            let copier = GraphCopier::new(&self.types, &self.pool, true);
            let mut heap = Heap::new();
            let outcome = copier
                .copy(&self.heap, &[handle], &mut heap, Direction::Forward)
                .unwrap();
            WorkingCopy::from_parts(heap, outcome.roots[0], outcome.registry)
        }
    }

    #[test]
    fn new_entity_gets_id_and_first_version() {
        let mut f = Fixture::new();
        let copy = WorkingCopy::new(Object::new("Account").with("balance", 10));
        let outcome = f.merge(&[copy]).unwrap();

        let stored = f.heap.get(outcome.roots[0]).unwrap();
        assert_eq!(stored.get("id"), &Slot::Int(0));
        assert_eq!(stored.get("version"), &Slot::Int(1));
        assert_eq!(f.root.collection("Account").unwrap().len(), 1);
    }

    #[test]
    fn update_keeps_stored_fields_and_bumps_version() {
        let mut f = Fixture::new();
        let copy = WorkingCopy::new(Object::new("Account").with("balance", 10).with("opened", 2020));
        let stored = f.merge(&[copy]).unwrap().roots[0];

        let mut working = f.read(stored);
        working.set("balance", 11).set("opened", 1999).set("id", Slot::Null);
        let outcome = f.merge(&[working]).unwrap();
        assert_eq!(outcome.roots, vec![stored]);

        let object = f.heap.get(stored).unwrap();
        assert_eq!(object.get("balance"), &Slot::Int(11));
        assert_eq!(object.get("opened"), &Slot::Int(2020));
        assert_eq!(object.get("id"), &Slot::Int(0));
        assert_eq!(object.get("version"), &Slot::Int(2));
    }

    #[test]
    fn stale_copy_conflicts_without_side_effects() {
        let mut f = Fixture::new();
        let stored = f
            .merge(&[WorkingCopy::new(Object::new("Account").with("balance", 1))])
            .unwrap()
            .roots[0];
        let mut first = f.read(stored);
        let mut second = f.read(stored);

        first.set("balance", 2);
        f.merge(&[first]).unwrap();
        second.set("balance", 3);
        let err = f.merge(&[second]).unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(f.heap.get(stored).unwrap().get("balance"), &Slot::Int(2));
        assert_eq!(f.heap.len(), 1);
    }

    #[test]
    fn unchanged_children_are_not_rewritten() {
        let mut f = Fixture::new();
        let mut copy = WorkingCopy::new(Object::new("Account"));
        let owner = copy.add(Object::new("Customer").with("email", "a@x"));
        copy.set("owner", owner);
        let stored = f.merge(&[copy]).unwrap().roots[0];

        let mut working = f.read(stored);
        working.set("balance", 5);
        let outcome = f.merge(&[working]).unwrap();
        assert_eq!(outcome.written, 1);
        assert_eq!(f.heap.len(), 2);
    }

    #[test]
    fn update_by_supplied_id() {
        let mut f = Fixture::new();
        f.merge(&[WorkingCopy::new(
            Object::new("Customer").with("email", "a@x").with("name", "Ada"),
        )])
        .unwrap();

        let renamed = WorkingCopy::new(Object::new("Customer").with("email", "a@x").with("name", "Grace"));
        let outcome = f.merge(&[renamed]).unwrap();

        assert_eq!(f.root.collection("Customer").unwrap().len(), 1);
        assert_eq!(
            f.heap.get(outcome.roots[0]).unwrap().get("name"),
            &Slot::from("Grace")
        );
    }

    #[test]
    fn batch_rejections_happen_before_mutation() {
        let mut f = Fixture::new();

        let missing = WorkingCopy::new(Object::new("Customer").with("name", "nobody"));
        assert!(matches!(
            f.merge(&[missing]),
            Err(CoreError::MissingId { .. })
        ));

        let twice = [
            WorkingCopy::new(Object::new("Customer").with("email", "b@x")),
            WorkingCopy::new(Object::new("Customer").with("email", "b@x")),
        ];
        assert!(matches!(f.merge(&twice), Err(CoreError::InvalidBatch { .. })));

        let stored = f
            .merge(&[WorkingCopy::new(Object::new("Account"))])
            .unwrap()
            .roots[0];
        let same = [f.read(stored), f.read(stored)];
        assert!(matches!(f.merge(&same), Err(CoreError::InvalidBatch { .. })));

        let mut renumbered = f.read(stored);
        renumbered.set("id", 77);
        assert!(matches!(
            f.merge(&[renumbered]),
            Err(CoreError::IdChanged { .. })
        ));

        assert_eq!(f.heap.len(), 1);
        assert!(f.root.collection("Customer").unwrap().is_empty());
    }
}
