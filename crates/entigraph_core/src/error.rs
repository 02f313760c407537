//! Error types for EntiGraph core.

use crate::graph::Handle;
use crate::types::TypeName;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A single failed constraint on a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Field the constraint is declared on.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl Violation {
    /// Creates a violation.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur in EntiGraph core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An identifier or version field is immutable but needs a generated value.
    #[error("field {field} of {type_name} is immutable and cannot be generated")]
    ImmutableField {
        /// Type declaring the field.
        type_name: TypeName,
        /// Offending field.
        field: String,
    },

    /// A traversed object has a type that was never registered.
    #[error("unsupported type: {type_name}")]
    UnsupportedType {
        /// The unregistered type.
        type_name: TypeName,
    },

    /// The operation names an entity type that is not registered.
    #[error("entity type not registered: {type_name}")]
    TypeNotRegistered {
        /// The requested type.
        type_name: TypeName,
    },

    /// A type descriptor is inconsistent.
    #[error("invalid descriptor for {type_name}: {message}")]
    InvalidDescriptor {
        /// Type being described.
        type_name: TypeName,
        /// What is wrong.
        message: String,
    },

    /// A type was registered twice.
    #[error("type already registered: {type_name}")]
    DuplicateRegistration {
        /// The type.
        type_name: TypeName,
    },

    /// The working copy was read at a different version than the stored entity.
    #[error("version conflict on {type_name}: working copy has {working}, stored entity has {stored}")]
    VersionConflict {
        /// Entity type.
        type_name: TypeName,
        /// Version carried by the working copy.
        working: String,
        /// Version currently stored.
        stored: String,
    },

    /// The working copy carries no version but the stored entity does.
    #[error("invalid version state on {type_name}: working copy has no version, stored entity has {stored}")]
    InvalidVersionState {
        /// Entity type.
        type_name: TypeName,
        /// Version currently stored.
        stored: String,
    },

    /// A batch write is malformed.
    #[error("invalid batch: {message}")]
    InvalidBatch {
        /// What is wrong.
        message: String,
    },

    /// An entity with a caller-supplied identifier strategy has no identifier.
    #[error("{type_name} requires a caller-supplied identifier")]
    MissingId {
        /// Entity type.
        type_name: TypeName,
    },

    /// Two distinct entities of one type share an identifier.
    #[error("duplicate identifier {id} for {type_name}")]
    DuplicateId {
        /// Entity type.
        type_name: TypeName,
        /// Rendered identifier.
        id: String,
    },

    /// A working copy tried to change the identifier of a stored entity.
    #[error("identifier of {type_name} cannot change from {stored} to {working}")]
    IdChanged {
        /// Entity type.
        type_name: TypeName,
        /// Stored identifier.
        stored: String,
        /// Identifier carried by the working copy.
        working: String,
    },

    /// A reference points at an object that does not exist.
    #[error("dangling reference to {handle}")]
    DanglingReference {
        /// The missing handle.
        handle: Handle,
    },

    /// Field constraints failed.
    #[error("validation failed for {type_name}: {}", join_violations(.violations))]
    Validation {
        /// Type of the invalid object.
        type_name: TypeName,
        /// Every failed constraint.
        violations: Vec<Violation>,
    },

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] entigraph_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persistence collaborator failed or returned corrupt data.
    #[error("persistence failure: {message}")]
    Persistence {
        /// Description of the failure.
        message: String,
    },

    /// Another process holds the store's log.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The lock could not be acquired in time.
    #[error("lock not acquired within {waited:?}")]
    LockTimeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The lock was re-entered from inside a locked operation.
    #[error("lock re-entered from inside a {held} operation")]
    LockReentry {
        /// Mode already held by this thread.
        held: &'static str,
    },

    /// The identifier setter ran out of unused values.
    #[error("identifier space exhausted for {type_name}")]
    IdSpaceExhausted {
        /// Entity type.
        type_name: TypeName,
    },
}

impl CoreError {
    /// Creates an invalid descriptor error.
    pub fn invalid_descriptor(type_name: &TypeName, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            type_name: type_name.clone(),
            message: message.into(),
        }
    }

    /// Creates an invalid batch error.
    pub fn invalid_batch(message: impl Into<String>) -> Self {
        Self::InvalidBatch {
            message: message.into(),
        }
    }

    /// Creates a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Creates an unsupported type error.
    pub fn unsupported_type(type_name: &TypeName) -> Self {
        Self::UnsupportedType {
            type_name: type_name.clone(),
        }
    }

    /// Creates a type-not-registered error.
    pub fn not_registered(type_name: impl Into<TypeName>) -> Self {
        Self::TypeNotRegistered {
            type_name: type_name.into(),
        }
    }

    /// Returns true for optimistic-lock failures a caller may retry after
    /// re-reading.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::InvalidVersionState { .. }
        )
    }
}
