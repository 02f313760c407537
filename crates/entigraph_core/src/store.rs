//! The store facade.

use crate::config::Config;
use crate::copier::merge::merge_batch;
use crate::copier::{BufferPool, GraphCopier};
use crate::entity::{IdFinder, Root, TypeDescriptor};
use crate::error::{CoreError, CoreResult};
use crate::graph::{Handle, Heap, Object, Slot};
use crate::lock::ReadWriteLock;
use crate::persist::{ChangeSet, MemoryPersister, Persister};
use crate::state::{Lookup, StoreState};
use crate::stats::{StatsSnapshot, StoreStats};
use crate::types::TypeName;
use crate::undo::UndoLog;
use crate::working::WorkingCopy;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An isolated, change-tracking repository over an in-memory object graph.
///
/// Callers only ever hold [`WorkingCopy`]s. Reads hand out fresh copies;
/// writes merge copies back, check versions, assign identifiers, admit
/// newly reachable entities and persist the result as one batch. A write
/// that fails for any reason leaves storage exactly as it was.
///
/// # Example
///
/// ```
/// use entigraph_core::{IdKind, Object, Store, TypeDescriptor, VersionKind, WorkingCopy};
///
/// let store = Store::in_memory();
/// store.register(
///     TypeDescriptor::entity("Account")
///         .id("id", IdKind::Long)
///         .version("version", VersionKind::Long)
///         .build()?,
/// )?;
///
/// let saved = store.save(&WorkingCopy::new(Object::new("Account").with("balance", 10)))?;
/// assert_eq!(saved.get("id").as_int(), Some(0));
///
/// let mut copy = store.find_by_id("Account", 0)?.expect("saved above");
/// copy.set("balance", 9);
/// store.save(&copy)?;
/// assert_eq!(store.count("Account")?, 1);
/// # Ok::<(), entigraph_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct Store {
    state: ReadWriteLock<StoreState>,
    persister: Arc<dyn Persister>,
    pool: BufferPool,
    config: Config,
    stats: StoreStats,
}

impl Store {
    fn with_state(config: Config, persister: Arc<dyn Persister>, state: StoreState) -> Self {
        Self {
            state: ReadWriteLock::with_timeout(state, config.lock_timeout),
            persister,
            pool: BufferPool::new(config.buffer_pool_capacity),
            config,
            stats: StoreStats::new(),
        }
    }

    /// Opens a store over `persister`, replaying whatever it holds.
    ///
    /// Restored collections are unindexed until their type is registered
    /// again.
    ///
    /// # Errors
    ///
    /// Errors from [`Persister::load`].
    pub fn open(config: Config, persister: Arc<dyn Persister>) -> CoreResult<Self> {
        let state = match persister.load()? {
            Some(snapshot) => {
                info!(
                    objects = snapshot.heap.len(),
                    collections = snapshot.collections.len(),
                    batches = snapshot.batches,
                    "restored store"
                );
                StoreState::from_snapshot(snapshot)
            }
            None => StoreState::default(),
        };
        Ok(Self::with_state(config, persister, state))
    }

    /// Opens an empty store persisting to memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_state(
            Config::default(),
            Arc::new(MemoryPersister::new()),
            StoreState::default(),
        )
    }

    /// Opens a store persisting to the log file at `path`.
    ///
    /// # Errors
    ///
    /// Errors from [`crate::FilePersister::open`] and replay.
    #[cfg(feature = "std")]
    pub fn open_file(path: impl AsRef<std::path::Path>, config: Config) -> CoreResult<Self> {
        let persister = crate::persist::FilePersister::open(path.as_ref(), &config)?;
        Self::open(config, Arc::new(persister))
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The persister.
    #[must_use]
    pub fn persister(&self) -> &Arc<dyn Persister> {
        &self.persister
    }

    /// Runs a logged write: rolls back on error, persists on success.
    fn write_logged<R>(
        &self,
        op: impl FnOnce(&mut StoreState, &mut UndoLog) -> CoreResult<R>,
    ) -> CoreResult<R> {
        self.state.write(|scope| {
            let state = scope.get_mut();
            let mut undo = UndoLog::new();
            let result = op(state, &mut undo).and_then(|value| {
                if !undo.is_empty() {
                    self.persister
                        .persist(&undo.change_set(&state.heap, &state.root))?;
                }
                Ok(value)
            });
            if let Err(err) = &result {
                if err.is_conflict() {
                    self.stats.record_conflict();
                }
                warn!(error = %err, "rejected write");
                if !undo.is_empty() {
                    self.stats.record_rollback();
                    undo.rollback(&mut state.heap, &mut state.root);
                }
            }
            result
        })
    }

    /// Registers an entity or embedded type.
    ///
    /// Entity types get a collection (persisted on first registration) and
    /// an id index when they declare an identifier. Registering a type whose
    /// collection was restored from the log reattaches the index.
    ///
    /// # Errors
    ///
    /// `DuplicateRegistration`, index errors from rebuilding a restored
    /// collection, and persistence errors.
    pub fn register(&self, descriptor: TypeDescriptor) -> CoreResult<()> {
        let name = descriptor.name().clone();
        self.state.write(|scope| {
            let state = scope.get_mut();
            let registered = state.types.register(descriptor)?;
            if !registered.descriptor().is_entity() {
                debug!(type_name = %name, "registered embedded type");
                return Ok(());
            }
            let finder = registered.default_finder();

            let (data, created) = state.root.ensure_collection(&name);
            let mut result = data.set_id_getter(finder, &state.heap);
            if result.is_ok() && created {
                let changes = ChangeSet {
                    created: vec![name.clone()],
                    ..ChangeSet::default()
                };
                result = self.persister.persist(&changes);
            }
            if let Err(err) = result {
                warn!(type_name = %name, error = %err, "registration failed");
                if created {
                    state.root.remove(name.as_str());
                }
                state.types.unregister(name.as_str());
                return Err(err);
            }

            debug!(type_name = %name, restored = !created, "registered entity type");
            Ok(())
        })
    }

    /// Saves one working copy and returns a fresh copy of the stored result.
    ///
    /// # Errors
    ///
    /// See [`Store::save_all`].
    pub fn save(&self, copy: &WorkingCopy) -> CoreResult<WorkingCopy> {
        self.save_all(std::slice::from_ref(copy))?
            .pop()
            .ok_or_else(|| CoreError::invalid_batch("save produced no copy"))
    }

    /// Saves a batch of working copies atomically.
    ///
    /// Each copy's objects land on the storage objects they were copied
    /// from, or on the member with the same caller-supplied identifier, or
    /// become new storage objects. Only changed objects are written; each
    /// written entity gets its version advanced.
    ///
    /// # Errors
    ///
    /// `VersionConflict` / `InvalidVersionState` for stale copies,
    /// `InvalidBatch` when two working objects claim one storage object,
    /// `MissingId`, `IdChanged`, `DuplicateId`, `Validation`,
    /// `UnsupportedType`, and persistence errors. Storage is unchanged
    /// after any error.
    pub fn save_all(&self, copies: &[WorkingCopy]) -> CoreResult<Vec<WorkingCopy>> {
        if copies.is_empty() {
            return Ok(Vec::new());
        }
        let (fresh, written) = self.write_logged(|state, undo| {
            let copier = GraphCopier::new(&state.types, &self.pool, self.config.validate_copies);
            let outcome = merge_batch(
                &mut state.heap,
                &mut state.root,
                copier,
                copies,
                self.config.parallel_scan_threshold,
                undo,
            )?;
            let fresh = state.copy_out(&self.pool, self.config.validate_copies, &outcome.roots)?;
            Ok((fresh, outcome.written))
        })?;
        self.stats.record_save(written as u64);
        Ok(fresh)
    }

    fn lookup(&self, state: &StoreState, type_name: &str, id: &Slot) -> CoreResult<Option<Handle>> {
        let found = state.find_member(type_name, id, self.config.parallel_scan_threshold)?;
        Ok(found.map(|(handle, lookup)| {
            match lookup {
                Lookup::Index => self.stats.record_index_lookup(),
                Lookup::Scan => self.stats.record_scan(),
            }
            handle
        }))
    }

    fn hand_out(&self, state: &StoreState, handles: &[Handle]) -> CoreResult<Vec<WorkingCopy>> {
        let copies = state.copy_out(&self.pool, self.config.validate_copies, handles)?;
        for _ in &copies {
            self.stats.record_read();
        }
        Ok(copies)
    }

    /// Finds an entity by identifier.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered` and copy errors.
    pub fn find_by_id(
        &self,
        type_name: &str,
        id: impl Into<Slot>,
    ) -> CoreResult<Option<WorkingCopy>> {
        let id = id.into();
        self.state.read(|state| {
            let Some(handle) = self.lookup(state, type_name, &id)? else {
                return Ok(None);
            };
            Ok(self.hand_out(state, &[handle])?.pop())
        })
    }

    /// Copies of every member of `type_name`.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered` and copy errors.
    pub fn find_all(&self, type_name: &str) -> CoreResult<Vec<WorkingCopy>> {
        self.state.read(|state| {
            let handles = members(state, type_name)?;
            self.hand_out(state, &handles)
        })
    }

    /// Copies of the members with the given identifiers; unknown ones are
    /// skipped.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered` and copy errors.
    pub fn find_all_by_id<I>(&self, type_name: &str, ids: I) -> CoreResult<Vec<WorkingCopy>>
    where
        I: IntoIterator,
        I::Item: Into<Slot>,
    {
        let ids: Vec<Slot> = ids.into_iter().map(Into::into).collect();
        self.state.read(|state| {
            let mut handles = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(handle) = self.lookup(state, type_name, id)? {
                    handles.push(handle);
                }
            }
            self.hand_out(state, &handles)
        })
    }

    /// Copies of the members whose stored object satisfies `predicate`.
    ///
    /// The predicate runs under the read lock; calling back into the store
    /// from it fails with `LockReentry`.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered` and copy errors.
    pub fn find_by(
        &self,
        type_name: &str,
        predicate: impl Fn(&Object) -> bool,
    ) -> CoreResult<Vec<WorkingCopy>> {
        self.state.read(|state| {
            let handles: Vec<Handle> = members(state, type_name)?
                .into_iter()
                .filter(|h| state.heap.get(*h).is_some_and(&predicate))
                .collect();
            self.hand_out(state, &handles)
        })
    }

    /// Returns true if a member has identifier `id`.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered`.
    pub fn exists_by_id(&self, type_name: &str, id: impl Into<Slot>) -> CoreResult<bool> {
        let id = id.into();
        self.state
            .read(|state| Ok(self.lookup(state, type_name, &id)?.is_some()))
    }

    /// Number of members of `type_name`.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered`.
    pub fn count(&self, type_name: &str) -> CoreResult<u64> {
        self.state
            .read(|state| Ok(members(state, type_name)?.len() as u64))
    }

    /// Removes the entity `copy` was read from.
    ///
    /// The entity is resolved by provenance, then by identifier. Returns
    /// false if it is not a member. The stored object stays in the heap
    /// while anything references it.
    ///
    /// # Errors
    ///
    /// `VersionConflict` / `InvalidVersionState` for a stale copy,
    /// `TypeNotRegistered`, and persistence errors.
    pub fn delete(&self, copy: &WorkingCopy) -> CoreResult<bool> {
        let type_name = copy.type_name().clone();
        let working = copy
            .root_object()
            .ok_or(CoreError::DanglingReference { handle: copy.root() })?;
        self.write_logged(|state, undo| {
            let registered = state.types.entity(type_name.as_str())?;
            let by_origin = copy.origin_of(copy.root()).filter(|h| {
                state
                    .root
                    .collection(type_name.as_str())
                    .is_some_and(|data| data.contains(*h))
            });
            let target = match (by_origin, registered.ids().and_then(|ids| ids.current_id(working))) {
                (Some(handle), _) => Some(handle),
                (None, Some(id)) => self.lookup(state, type_name.as_str(), id)?,
                (None, None) => None,
            };
            let Some(handle) = target else {
                return Ok(false);
            };

            if let Some(versions) = registered.versions() {
                let stored = state
                    .heap
                    .get(handle)
                    .ok_or(CoreError::DanglingReference { handle })?;
                versions.ensure_same_version(working, stored)?;
            }
            remove_members(state, &type_name, &[handle], undo);
            if self.config.collect_garbage_on_delete {
                collect_logged(&mut state.heap, &state.root, undo);
            }
            Ok(true)
        })
        .inspect(|deleted| {
            if *deleted {
                self.stats.record_delete(1);
            }
        })
    }

    /// Removes the member with identifier `id`, without a version check.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered` and persistence errors.
    pub fn delete_by_id(&self, type_name: &str, id: impl Into<Slot>) -> CoreResult<bool> {
        let id = id.into();
        let name = TypeName::new(type_name);
        let deleted = self.write_logged(|state, undo| {
            let Some(handle) = self.lookup(state, type_name, &id)? else {
                return Ok(false);
            };
            remove_members(state, &name, &[handle], undo);
            if self.config.collect_garbage_on_delete {
                collect_logged(&mut state.heap, &state.root, undo);
            }
            Ok(true)
        })?;
        if deleted {
            self.stats.record_delete(1);
        }
        Ok(deleted)
    }

    /// Removes every member of `type_name`, returning how many there were.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered` and persistence errors.
    pub fn delete_all(&self, type_name: &str) -> CoreResult<usize> {
        let name = TypeName::new(type_name);
        let removed = self.write_logged(|state, undo| {
            let handles = members(state, type_name)?;
            remove_members(state, &name, &handles, undo);
            if self.config.collect_garbage_on_delete {
                collect_logged(&mut state.heap, &state.root, undo);
            }
            Ok(handles.len())
        })?;
        self.stats.record_delete(removed as u64);
        info!(type_name, removed, "deleted all members");
        Ok(removed)
    }

    /// Replaces the id finder of `type_name` and rebuilds its index.
    ///
    /// `None` drops the index; lookups then scan the declared identifier
    /// field. A finder under which two members collide is rejected and the
    /// previous one stays in place.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered`, `DuplicateId`, `MissingId`.
    pub fn set_id_getter(&self, type_name: &str, finder: Option<IdFinder>) -> CoreResult<()> {
        self.state.write(|scope| {
            let state = scope.get_mut();
            state.types.entity(type_name)?;
            let data = state
                .root
                .collection_mut(type_name)
                .ok_or_else(|| CoreError::not_registered(type_name))?;
            data.set_id_getter(finder, &state.heap)
        })
    }

    /// Frees every storage object no member reaches.
    ///
    /// # Errors
    ///
    /// Persistence errors.
    pub fn collect_garbage(&self) -> CoreResult<usize> {
        let freed = self.write_logged(|state, undo| {
            Ok(collect_logged(&mut state.heap, &state.root, undo))
        })?;
        self.stats.record_collected(freed as u64);
        info!(freed, "collected garbage");
        Ok(freed)
    }

    /// Rewrites the persisted log as a single snapshot.
    ///
    /// # Errors
    ///
    /// Persistence errors; the previous log stays intact.
    pub fn checkpoint(&self) -> CoreResult<()> {
        self.state.read(|state| {
            let full = ChangeSet::full(&state.heap, &state.root);
            self.persister.checkpoint(&full)?;
            self.stats.record_checkpoint();
            info!(objects = full.written.len(), "checkpoint complete");
            Ok(())
        })
    }

    /// Counters plus current object and member counts.
    ///
    /// # Errors
    ///
    /// Lock errors.
    pub fn stats(&self) -> CoreResult<StatsSnapshot> {
        self.state.read(|state| {
            let members: BTreeMap<TypeName, u64> = state
                .root
                .collections()
                .map(|data| (data.type_name().clone(), data.len() as u64))
                .collect();
            Ok(self
                .stats
                .snapshot(state.heap.len() as u64, members, self.persister.batches()))
        })
    }
}

fn members(state: &StoreState, type_name: &str) -> CoreResult<Vec<Handle>> {
    state.types.entity(type_name)?;
    let data = state
        .root
        .collection(type_name)
        .ok_or_else(|| CoreError::not_registered(type_name))?;
    Ok(data.members().iter().collect())
}

fn remove_members(state: &mut StoreState, type_name: &TypeName, handles: &[Handle], undo: &mut UndoLog) {
    let Some(data) = state.root.collection_mut(type_name.as_str()) else {
        return;
    };
    for handle in handles {
        if data.remove_member(*handle, &state.heap) {
            undo.removed(type_name.clone(), *handle);
        }
    }
}

fn collect_logged(heap: &mut Heap, root: &Root, undo: &mut UndoLog) -> usize {
    let roots: Vec<Handle> = root.all_members().collect();
    let freed = heap.collect_garbage(roots);
    let count = freed.len();
    for (handle, object) in freed {
        undo.freed(handle, object);
    }
    count
}
