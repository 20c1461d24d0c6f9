//! quilldb - a schema-flexible document store over a relational engine
//!
//! Collections of typed documents live in ordinary SQL tables whose
//! physical identifiers are digests; a metadata registry maps the
//! user's collection and field names onto them, so the schema can
//! grow one field at a time without migrations. A small filter
//! language compiles to parameterized SQL, and every read or write
//! happens inside a session with snapshot or transactional semantics.
//!
//! ```no_run
//! use quilldb::{Document, FieldType, Store, Value};
//!
//! let store = Store::open("example.qdb")?;
//! let session = store.write_session()?;
//! session.declare_collection("subjects", &[("name", FieldType::STRING)])?;
//! session.declare_field("subjects", "age", FieldType::INTEGER)?;
//! session.insert(
//!     "subjects",
//!     &Document::new().with("name", "alice").with("age", 42i64),
//! )?;
//! session.commit()?;
//!
//! let reader = store.read_session()?;
//! for doc in reader.search("subjects", "age > 40")?.documents {
//!     println!("{:?}", doc.get("name"));
//! }
//! # Ok::<(), quilldb::Error>(())
//! ```

pub mod codec;
pub mod document;
pub mod error;
pub mod ident;
pub mod query;
pub mod schema;
pub mod session;
pub mod types;

pub use document::Document;
pub use error::{Error, Result};
pub use schema::{CollectionInfo, FieldInfo};
pub use session::{CorruptCell, ReadSession, SearchHits, Store, StoreOptions, WriteSession};
pub use types::{FieldType, ScalarType, Value};
