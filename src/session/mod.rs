//! Session Manager
//!
//! All access to a store happens inside a session. A [`ReadSession`]
//! pins a consistent snapshot and can only observe; a [`WriteSession`]
//! buffers schema and document changes in a transaction that becomes
//! visible atomically on [`WriteSession::commit`] and disappears
//! without trace on [`WriteSession::abort`] or drop. One write session
//! at a time per store; readers are never blocked by a writer.

mod ops;
mod read;
mod store;
mod write;

pub use ops::{CorruptCell, SearchHits};
pub use read::ReadSession;
pub use store::{Store, StoreOptions};
pub use write::WriteSession;
