//! Deep copies across the storage/working boundary.
//!
//! Copying is serialization based: the reachable graph is written into a
//! pooled CBOR buffer as an array of `{t: type, f: fields}` entries, with
//! references encoded as tag 29 over the local index of their target. Local
//! indices are handed out on first visit, so cycles terminate and shared
//! objects are written once. Decoding allocates every target object first
//! and then fills the fields.

mod image;
pub(crate) mod merge;
mod pool;
mod registry;

pub use image::{GraphImage, ImageEntry};
pub use pool::{BufferPool, PooledBuffer};
pub use registry::{Direction, WorkingCopyRegistry};

pub(crate) use image::{plain_value_to_slot, slot_to_value, value_to_slot};

use crate::entity::TypeRegistry;
use crate::error::{CoreError, CoreResult};
use crate::graph::{Handle, Heap, Object};
use entigraph_codec::{encode_into, Value};
use std::collections::HashMap;
use tracing::debug;

/// Local index of `handle`, assigned on first visit.
fn visit(handle: Handle, index: &mut HashMap<Handle, usize>, order: &mut Vec<Handle>) -> usize {
    *index.entry(handle).or_insert_with(|| {
        order.push(handle);
        order.len() - 1
    })
}

/// Result of a copy: the copied roots and the correspondence of every
/// copied object.
#[derive(Debug)]
pub struct CopyOutcome {
    /// Target-side handles of the requested roots, in request order.
    pub roots: Vec<Handle>,
    /// One pair per copied object.
    pub registry: WorkingCopyRegistry,
}

/// Deep-copies object graphs between heaps.
#[derive(Debug, Clone, Copy)]
pub struct GraphCopier<'a> {
    types: &'a TypeRegistry,
    pool: &'a BufferPool,
    validate: bool,
}

impl<'a> GraphCopier<'a> {
    /// Creates a copier over the registered types.
    #[must_use]
    pub fn new(types: &'a TypeRegistry, pool: &'a BufferPool, validate: bool) -> Self {
        Self {
            types,
            pool,
            validate,
        }
    }

    /// Serializes everything reachable from `roots`.
    ///
    /// Transient fields are dropped.
    ///
    /// # Errors
    ///
    /// `UnsupportedType` for an object of an unregistered type,
    /// `DanglingReference` for a reference to a missing object.
    pub fn serialize(&self, source: &Heap, roots: &[Handle]) -> CoreResult<GraphImage<'a>> {
        let mut index: HashMap<Handle, usize> = HashMap::new();
        let mut order: Vec<Handle> = Vec::new();

        let root_indices: Vec<usize> = roots
            .iter()
            .map(|r| visit(*r, &mut index, &mut order))
            .collect();

        let mut entries = Vec::new();
        let mut cursor = 0;
        while cursor < order.len() {
            let handle = order[cursor];
            cursor += 1;

            let object = source
                .get(handle)
                .ok_or(CoreError::DanglingReference { handle })?;
            let descriptor = self
                .types
                .get(object.type_name().as_str())
                .ok_or_else(|| CoreError::unsupported_type(object.type_name()))?
                .descriptor();

            let mut fields = Vec::with_capacity(object.field_count());
            for (name, slot) in object.fields() {
                if descriptor.is_transient(name) {
                    continue;
                }
                let value = slot_to_value(slot, &mut |target| {
                    let local = visit(target, &mut index, &mut order);
                    Ok(Value::Integer(i64::try_from(local).unwrap_or(i64::MAX)))
                })?;
                fields.push((Value::from(name), value));
            }
            entries.push(image::encode_entry(object.type_name(), fields));
        }

        let mut bytes = self.pool.acquire();
        encode_into(&Value::Array(entries), &mut bytes);
        Ok(GraphImage {
            bytes,
            sources: order,
            roots: root_indices,
        })
    }

    /// Copies everything reachable from `roots` in `source` into `target`.
    ///
    /// With validation enabled, the first object failing its type's
    /// constraints aborts the copy and `target` is left as it was.
    ///
    /// # Errors
    ///
    /// Everything [`GraphCopier::serialize`] reports, plus `Validation`.
    pub fn copy(
        &self,
        source: &Heap,
        roots: &[Handle],
        target: &mut Heap,
        direction: Direction,
    ) -> CoreResult<CopyOutcome> {
        let image = self.serialize(source, roots)?;
        let entries = image.decode()?;

        let table: Vec<Handle> = entries
            .iter()
            .map(|e| target.alloc(Object::new(e.type_name.clone())))
            .collect();
        if let Err(err) = self.fill(&entries, &table, target) {
            for handle in &table {
                target.free(*handle);
            }
            return Err(err);
        }

        let mut registry = WorkingCopyRegistry::new(direction);
        for (source_handle, target_handle) in image.sources().iter().zip(&table) {
            match direction {
                Direction::Forward => registry.register(*target_handle, *source_handle),
                Direction::Inverted => registry.register(*source_handle, *target_handle),
            }
        }

        debug!(
            objects = table.len(),
            bytes = image.byte_len(),
            ?direction,
            "copied graph"
        );
        Ok(CopyOutcome {
            roots: image.roots().iter().map(|i| table[*i]).collect(),
            registry,
        })
    }

    fn fill(&self, entries: &[ImageEntry], table: &[Handle], target: &mut Heap) -> CoreResult<()> {
        for (entry, handle) in entries.iter().zip(table) {
            let object = entry.materialize(table)?;
            self.check(&object)?;
            target.replace(*handle, object);
        }
        Ok(())
    }

    /// Validates `object` against its type when validation is enabled.
    pub(crate) fn check(&self, object: &Object) -> CoreResult<()> {
        if !self.validate {
            return Ok(());
        }
        let Some(registered) = self.types.get(object.type_name().as_str()) else {
            return Err(CoreError::unsupported_type(object.type_name()));
        };
        let violations = registered.descriptor().validate(object);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation {
                type_name: object.type_name().clone(),
                violations,
            })
        }
    }

    pub(crate) fn types(&self) -> &'a TypeRegistry {
        self.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Constraint, IdKind, TypeDescriptor};
    use crate::graph::{graphs_equal, Slot};

    fn registry() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types
            .register(
                TypeDescriptor::entity("Node")
                    .id("id", IdKind::Long)
                    .transient("cache")
                    .constraint("weight", Constraint::Min(0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        types
            .register(TypeDescriptor::embedded("Tag").build().unwrap())
            .unwrap();
        types
    }

    #[test]
    fn cycles_and_shared_objects_keep_their_shape() {
        let types = registry();
        let pool = BufferPool::new(2);
        let copier = GraphCopier::new(&types, &pool, true);

        let mut source = Heap::new();
        let tag = source.alloc(Object::new("Tag").with("label", "x"));
        let a = source.alloc(Object::new("Node").with("tag", tag));
        let b = source.alloc(Object::new("Node").with("tag", tag).with("next", a));
        source.get_mut(a).unwrap().set("next", b);

        let mut target = Heap::new();
        let outcome = copier.copy(&source, &[a], &mut target, Direction::Forward).unwrap();

        assert_eq!(target.len(), 3);
        assert_eq!(outcome.registry.len(), 3);
        assert!(graphs_equal(&source, a, &target, outcome.roots[0]));

        let copy_a = outcome.roots[0];
        assert_eq!(outcome.registry.resolve_original_for(copy_a), Some(a));
        let copy_b = target.get(copy_a).unwrap().get("next").as_ref_handle().unwrap();
        let tag_via_a = target.get(copy_a).unwrap().get("tag").as_ref_handle();
        let tag_via_b = target.get(copy_b).unwrap().get("tag").as_ref_handle();
        assert_eq!(tag_via_a, tag_via_b);
    }

    #[test]
    fn transient_fields_are_not_copied() {
        let types = registry();
        let pool = BufferPool::new(2);
        let copier = GraphCopier::new(&types, &pool, true);

        let mut source = Heap::new();
        let a = source.alloc(Object::new("Node").with("cache", 99).with("weight", 1));
        let mut target = Heap::new();
        let outcome = copier.copy(&source, &[a], &mut target, Direction::Forward).unwrap();

        let copy = target.get(outcome.roots[0]).unwrap();
        assert!(copy.get("cache").is_null());
        assert_eq!(copy.get("weight"), &Slot::Int(1));
    }

    #[test]
    fn unregistered_types_fail_fast() {
        let types = registry();
        let pool = BufferPool::new(2);
        let copier = GraphCopier::new(&types, &pool, true);

        let mut source = Heap::new();
        let stranger = source.alloc(Object::new("Stranger"));
        let a = source.alloc(Object::new("Node").with("friend", stranger));
        let err = copier.serialize(&source, &[a]).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedType { .. }));
    }

    #[test]
    fn dangling_references_are_reported() {
        let types = registry();
        let pool = BufferPool::new(2);
        let copier = GraphCopier::new(&types, &pool, true);

        let mut source = Heap::new();
        let gone = source.alloc(Object::new("Node"));
        let a = source.alloc(Object::new("Node").with("next", gone));
        source.free(gone);
        let err = copier.serialize(&source, &[a]).unwrap_err();
        assert!(matches!(err, CoreError::DanglingReference { handle } if handle == gone));
    }

    #[test]
    fn failed_validation_leaves_target_untouched() {
        let types = registry();
        let pool = BufferPool::new(2);
        let copier = GraphCopier::new(&types, &pool, true);

        let mut source = Heap::new();
        let bad = source.alloc(Object::new("Node").with("weight", -1));
        let a = source.alloc(Object::new("Node").with("next", bad));
        let mut target = Heap::new();
        let err = copier
            .copy(&source, &[a], &mut target, Direction::Forward)
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation { .. }));
        assert!(target.is_empty());

        let lenient = GraphCopier::new(&types, &pool, false);
        assert!(lenient
            .copy(&source, &[a], &mut target, Direction::Forward)
            .is_ok());
    }

    #[test]
    fn buffers_are_returned_after_use() {
        let types = registry();
        let pool = BufferPool::new(2);
        let copier = GraphCopier::new(&types, &pool, true);

        let mut source = Heap::new();
        let a = source.alloc(Object::new("Node"));
        {
            let image = copier.serialize(&source, &[a]).unwrap();
            assert_eq!(image.len(), 1);
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);
    }
}
