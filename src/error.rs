//! Crate-wide error types
//!
//! Every public operation fails with exactly one of these kinds and
//! leaves no partial side effect: structural errors are raised before
//! touching the engine, and engine errors roll the whole write session
//! back before being reported.

use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error taxonomy
#[derive(Debug, Error)]
pub enum Error {
    // ==================
    // Schema errors
    // ==================
    /// Collection name collides (case-insensitively) with an existing one
    #[error("a collection named {0:?} already exists")]
    DuplicateCollection(String),

    /// Collection does not exist
    #[error("no collection named {0:?}")]
    UnknownCollection(String),

    /// Field already declared on the collection
    #[error("collection {collection:?} already has a field {field:?}")]
    DuplicateField { collection: String, field: String },

    /// Field not declared on the collection
    #[error("collection {collection:?} has no field {field:?}")]
    UnknownField { collection: String, field: String },

    /// Primary-key fields cannot be removed or redeclared
    #[error("field {field:?} is part of the primary key of {collection:?}")]
    ImmutablePrimaryKey { collection: String, field: String },

    // ==================
    // Value errors
    // ==================
    /// Value shape does not match the declared logical type
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Stored cell cannot be decoded per the declared type.
    /// This is a storage-integrity fault, not a user error.
    #[error("corrupt stored value: {0}")]
    CorruptValue(String),

    // ==================
    // Query errors
    // ==================
    /// Malformed filter text, with the byte offset of the problem
    #[error("parse error at offset {position}: {message}")]
    ParseError { position: usize, message: String },

    /// Well-formed filter that cannot be type-checked
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    // ==================
    // Session errors
    // ==================
    /// Another write session is already active against this store
    #[error("another write session is active")]
    WriteConflict,

    // ==================
    // Engine boundary
    // ==================
    /// Error surfaced by the underlying SQL engine, with the
    /// triggering operation identified
    #[error("engine error during {operation}: {source}")]
    Engine {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl Error {
    /// Wraps an engine error with the operation that triggered it
    pub(crate) fn engine(operation: impl Into<String>, source: rusqlite::Error) -> Self {
        Error::Engine {
            operation: operation.into(),
            source,
        }
    }

    pub(crate) fn unknown_field(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Error::UnknownField {
            collection: collection.into(),
            field: field.into(),
        }
    }

    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        Error::TypeMismatch(message.into())
    }

    pub(crate) fn invalid_query(message: impl Into<String>) -> Self {
        Error::InvalidQuery(message.into())
    }

    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Error::ParseError {
            position,
            message: message.into(),
        }
    }
}
