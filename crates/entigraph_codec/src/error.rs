//! Codec errors.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Ways a CBOR item can fail to encode or decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A float was found; graph images carry integers only.
    #[error("floats are not accepted")]
    FloatForbidden,

    /// An indefinite-length string, array or map was found.
    #[error("indefinite-length items are not accepted")]
    IndefiniteLengthForbidden,

    /// A text string was not valid UTF-8.
    #[error("text string is not valid UTF-8")]
    InvalidUtf8,

    /// The input ended inside an item.
    #[error("input ended inside an item")]
    UnexpectedEof,

    /// Input continued after the top-level item.
    #[error("{count} bytes left after the top-level item")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        count: usize,
    },

    /// Well-formed CBOR that breaks canonical form, such as unsorted or
    /// duplicate map keys or a non-minimal length.
    #[error("non-canonical item: {message}")]
    InvalidStructure {
        /// What was wrong.
        message: String,
    },

    /// An item this codec has no [`crate::Value`] for.
    #[error("unsupported item: {type_name}")]
    UnsupportedType {
        /// Description of the item.
        type_name: String,
    },

    /// A length header claims more than the decoder accepts.
    #[error("length {claimed} exceeds limit {max_allowed}")]
    SizeLimitExceeded {
        /// Length claimed by the header.
        claimed: u64,
        /// Largest accepted length.
        max_allowed: u64,
    },

    /// Nesting is deeper than the decoder accepts.
    #[error("nesting deeper than {max_depth}")]
    DepthLimitExceeded {
        /// Largest accepted nesting depth.
        max_depth: usize,
    },
}

impl CodecError {
    /// An [`CodecError::InvalidStructure`] error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// An [`CodecError::UnsupportedType`] error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}
