//! # EntiGraph Core
//!
//! Working-copy isolation and change tracking over an in-memory object graph.
//!
//! Entities live in a single storage graph that callers never touch
//! directly. Every read hands out a deep copy; every write merges copies
//! back under optimistic version checks, assigns identifiers to new
//! entities and admits everything newly reachable into its collection.
//!
//! This crate provides:
//! - An arena [`Heap`] of typed [`Object`]s addressed by generational
//!   [`Handle`]s, with identity-keyed [`IdentitySet`]s
//! - Entity metadata: [`TypeDescriptor`], identifier and version managers,
//!   per-type [`EntityData`] collections under a [`Root`]
//! - A serialization-based [`GraphCopier`] with a [`WorkingCopyRegistry`]
//!   recording which copy came from which original
//! - The [`RepositorySynchronizer`] that walks written graphs and admits
//!   reachable entities
//! - A [`ReadWriteLock`] that refuses re-entry instead of deadlocking
//! - [`Persister`]s that log every committed batch
//! - The [`Store`] facade tying it together
//!
//! ## Example
//!
//! ```
//! use entigraph_core::{IdKind, Object, Store, TypeDescriptor, WorkingCopy};
//!
//! let store = Store::in_memory();
//! store.register(TypeDescriptor::entity("Customer").id("id", IdKind::Long).build()?)?;
//! store.register(TypeDescriptor::embedded("Address").build()?)?;
//!
//! let mut customer = WorkingCopy::new(Object::new("Customer").with("name", "Ada"));
//! let address = customer.add(Object::new("Address").with("city", "London"));
//! customer.set("address", address);
//!
//! let saved = store.save(&customer)?;
//! let address = saved.follow("address").and_then(|h| saved.object(h)).expect("copied");
//! assert_eq!(address.get("city").as_text(), Some("London"));
//! assert_eq!(saved.get("id").as_int(), Some(0));
//! # Ok::<(), entigraph_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod copier;
mod entity;
mod error;
mod graph;
mod identity;
mod lock;
mod persist;
mod state;
mod stats;
mod store;
mod sync;
mod types;
mod undo;
mod working;

pub use config::Config;
pub use copier::{
    BufferPool, CopyOutcome, Direction, GraphCopier, GraphImage, ImageEntry, PooledBuffer,
    WorkingCopyRegistry,
};
pub use entity::{
    ChangedPart, Constraint, EntityData, IdField, IdFinder, IdKind, IdManager, IdSetter,
    IntIdSetter, IntVersionIncrementer, LongIdSetter, LongVersionIncrementer, RegisteredType,
    Root, SuppliedIdSetter, TextIdSetter, TextVersionIncrementer, TypeDescriptor,
    TypeDescriptorBuilder, TypeKind, TypeRegistry, UuidIdSetter, UuidVersionIncrementer,
    Validator, VersionField, VersionIncrementer, VersionKind, VersionManager,
};
pub use error::{CoreError, CoreResult, Violation};
pub use graph::{graphs_equal, Handle, Heap, Object, Slot};
pub use identity::IdentitySet;
pub use lock::{ReadWriteLock, WriteScope};
#[cfg(feature = "std")]
pub use persist::FilePersister;
pub use persist::{
    compute_crc32, scan_log, write_frame, write_records, write_sealed, ChangeSet, LogRecord,
    LogScan, MemoryPersister, Persister, RestoredCollection, Snapshot, FRAME_HEADER_LEN,
    LOG_MAGIC, MAX_PAYLOAD_LEN,
};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::Store;
pub use sync::{RepositorySynchronizer, SyncOutcome};
pub use types::TypeName;
pub use working::WorkingCopy;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
