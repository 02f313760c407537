//! Entity metadata and tracked collections.
//!
//! - [`TypeDescriptor`] declares a type: identifier, version, transient and
//!   immutable fields, constraints.
//! - [`TypeRegistry`] holds descriptors with their [`IdManager`] and
//!   [`VersionManager`].
//! - [`EntityData`] tracks the members of one entity type; [`Root`] holds
//!   one per type.

mod data;
mod descriptor;
mod id;
mod registry;
mod root;
mod version;

pub use data::{ChangedPart, EntityData};
pub use descriptor::{
    Constraint, IdField, TypeDescriptor, TypeDescriptorBuilder, TypeKind, Validator, VersionField,
};
pub use id::{
    IdFinder, IdKind, IdManager, IdSetter, IntIdSetter, LongIdSetter, SuppliedIdSetter,
    TextIdSetter, UuidIdSetter,
};
pub use registry::{RegisteredType, TypeRegistry};
pub use root::Root;
pub use version::{
    IntVersionIncrementer, LongVersionIncrementer, TextVersionIncrementer, UuidVersionIncrementer,
    VersionIncrementer, VersionKind, VersionManager,
};
