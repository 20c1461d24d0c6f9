//! Read sessions

use rusqlite::Connection;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::schema::{CollectionInfo, FieldInfo};
use crate::types::Value;

use super::ops;
use super::store::StoreOptions;
use super::SearchHits;

/// A consistent read-only view of the store.
///
/// The session pins the committed state as of its creation: writes
/// committed afterwards, by this process or another, stay invisible
/// until a new session is opened. Any number of read sessions may be
/// open at once, alongside at most one writer.
pub struct ReadSession {
    conn: Connection,
    options: StoreOptions,
}

impl ReadSession {
    pub(crate) fn begin(conn: Connection, options: StoreOptions) -> Result<ReadSession> {
        conn.execute_batch("BEGIN")
            .map_err(|e| Error::engine("begin read session", e))?;
        // A deferred transaction takes its snapshot on first read;
        // touch the metadata so the snapshot is pinned now
        let _: i64 = conn
            .query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))
            .map_err(|e| Error::engine("begin read session", e))?;
        Ok(ReadSession { conn, options })
    }

    /// Lists collection names, sorted case-insensitively
    pub fn collection_names(&self) -> Result<Vec<String>> {
        ops::collection_names(&self.conn)
    }

    pub fn has_collection(&self, name: &str) -> Result<bool> {
        ops::has_collection(&self.conn, name)
    }

    /// Returns a collection's metadata
    pub fn collection(&self, name: &str) -> Result<CollectionInfo> {
        ops::collection(&self.conn, name)
    }

    /// Returns a collection's fields in declaration order
    pub fn fields(&self, collection: &str) -> Result<Vec<FieldInfo>> {
        ops::fields(&self.conn, collection)
    }

    /// Fetches one document by its primary-key values, in key order
    pub fn document(&self, collection: &str, key: &[Value]) -> Result<Option<Document>> {
        ops::document(&self.conn, &self.options, collection, key)
    }

    pub fn has_document(&self, collection: &str, key: &[Value]) -> Result<bool> {
        ops::has_document(&self.conn, collection, key)
    }

    /// Fetches every document of a collection
    pub fn documents(&self, collection: &str) -> Result<SearchHits> {
        ops::documents(&self.conn, &self.options, collection)
    }

    /// Runs a filter expression against a collection
    pub fn search(&self, collection: &str, filter: &str) -> Result<SearchHits> {
        ops::search(&self.conn, &self.options, collection, filter)
    }
}

impl Drop for ReadSession {
    fn drop(&mut self) {
        // Nothing to preserve; release the snapshot
        let _ = self.conn.execute_batch("ROLLBACK");
    }
}
