//! Schema Registry
//!
//! Owns the two metadata relations (`collections`, `fields`) that are
//! the only human-readable description of the dynamic schema, and
//! mediates all DDL against the backing engine. Every other relation's
//! physical name is a digest and is meaningless without this metadata.
//!
//! Registry mutations always run on the caller's open transaction, so
//! schema changes enjoy the same atomicity as data changes; there is
//! no DDL autocommit path.

mod registry;

pub use registry::{CollectionInfo, FieldInfo};

pub(crate) use registry::{
    bootstrap, collection, collection_names, declare_collection, declare_field, fields,
    has_collection, remove_collection, remove_field, resolve,
};
