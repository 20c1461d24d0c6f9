//! Write sessions

use std::sync::MutexGuard;

use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::codec;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::schema::{self, CollectionInfo, FieldInfo};
use crate::types::{FieldType, Value};

use super::ops;
use super::store::StoreOptions;
use super::SearchHits;

/// An exclusive read-write transaction against the store.
///
/// Schema and document changes accumulate invisibly to other sessions
/// until [`commit`](WriteSession::commit); [`abort`](WriteSession::abort)
/// or dropping the session discards everything, schema changes
/// included. The session holds the store's writer slot for its whole
/// lifetime.
#[derive(Debug)]
pub struct WriteSession<'store> {
    conn: Connection,
    _writer_slot: MutexGuard<'store, ()>,
    options: StoreOptions,
    auto_declare: bool,
    committed: bool,
}

impl<'store> WriteSession<'store> {
    pub(crate) fn begin(
        conn: Connection,
        writer_slot: MutexGuard<'store, ()>,
        options: StoreOptions,
    ) -> Result<WriteSession<'store>> {
        // Take the engine's write lock up front so the session fails
        // here, not at commit, when another process holds it
        match conn.execute_batch("BEGIN IMMEDIATE") {
            Ok(()) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                return Err(Error::WriteConflict)
            }
            Err(e) => return Err(Error::engine("begin write session", e)),
        }
        Ok(WriteSession {
            conn,
            _writer_slot: writer_slot,
            options,
            auto_declare: false,
            committed: false,
        })
    }

    /// When enabled, inserting or updating a document with undeclared
    /// fields declares them with the type inferred from the value.
    /// Inference fails on null and on empty lists.
    pub fn set_auto_declare(&mut self, enabled: bool) {
        self.auto_declare = enabled;
    }

    // ==================
    // Schema changes
    // ==================

    /// Creates a collection keyed by one or more typed fields
    pub fn declare_collection(
        &self,
        name: &str,
        primary_key: &[(&str, FieldType)],
    ) -> Result<CollectionInfo> {
        schema::declare_collection(&self.conn, name, primary_key)
    }

    /// Drops a collection and all its documents
    pub fn remove_collection(&self, name: &str) -> Result<()> {
        schema::remove_collection(&self.conn, name)
    }

    /// Adds a typed field to a collection
    pub fn declare_field(
        &self,
        collection: &str,
        name: &str,
        field_type: FieldType,
    ) -> Result<FieldInfo> {
        schema::declare_field(&self.conn, collection, name, field_type, None, None)
    }

    /// Adds a typed field with a description and a default value.
    /// The default fills the field in documents inserted without it.
    pub fn declare_field_with(
        &self,
        collection: &str,
        name: &str,
        field_type: FieldType,
        description: Option<&str>,
        default: Option<&Value>,
    ) -> Result<FieldInfo> {
        schema::declare_field(&self.conn, collection, name, field_type, description, default)
    }

    /// Drops a field and every document's value for it
    pub fn remove_field(&self, collection: &str, name: &str) -> Result<()> {
        schema::remove_field(&self.conn, collection, name)
    }

    // ==================
    // Document changes
    // ==================

    /// Inserts a new document. The document must carry non-null values
    /// for every primary-key field, and every field it carries must be
    /// declared unless auto-declare is enabled. Declared defaults fill
    /// fields the document omits.
    pub fn insert(&self, collection: &str, doc: &Document) -> Result<()> {
        self.put(collection, doc, false)
    }

    /// Inserts a document, replacing any existing document with the
    /// same primary key
    pub fn replace(&self, collection: &str, doc: &Document) -> Result<()> {
        self.put(collection, doc, true)
    }

    fn put(&self, collection_name: &str, doc: &Document, replace: bool) -> Result<()> {
        let info = schema::collection(&self.conn, collection_name)?;
        self.ensure_declared(&info, doc)?;
        let fields = schema::fields(&self.conn, collection_name)?;

        let mut doc = doc.clone();
        for field in &fields {
            if let Some(default) = &field.default {
                if !doc.contains(&field.name) {
                    doc.set(&field.name, default.clone());
                }
            }
        }
        doc.primary_key(&info.primary_key)?;

        let mut columns = Vec::with_capacity(doc.len());
        let mut params = Vec::with_capacity(doc.len());
        for (name, value) in doc.iter() {
            let field = find_field(&fields, name)
                .ok_or_else(|| Error::unknown_field(collection_name, name))?;
            columns.push(field.column.as_str());
            params.push(codec::encode(value, field.field_type)?);
        }
        let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
        let sql = format!(
            "{verb} INTO {} ({}) VALUES ({})",
            info.table,
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        self.conn
            .execute(&sql, params_from_iter(params))
            .map_err(|e| Error::engine(format!("insert({collection_name})"), e))?;
        Ok(())
    }

    /// Applies the given field values to the document with the given
    /// primary key; a null value clears the field. Returns whether a
    /// document was found.
    pub fn update(&self, collection_name: &str, key: &[Value], changes: &Document) -> Result<bool> {
        let info = schema::collection(&self.conn, collection_name)?;
        self.ensure_declared(&info, changes)?;
        let fields = schema::fields(&self.conn, collection_name)?;

        let mut assignments = Vec::with_capacity(changes.len());
        let mut params = Vec::with_capacity(changes.len());
        for (name, value) in changes.iter() {
            let field = find_field(&fields, name)
                .ok_or_else(|| Error::unknown_field(collection_name, name))?;
            if field.primary_key {
                return Err(Error::ImmutablePrimaryKey {
                    collection: collection_name.to_string(),
                    field: field.name.clone(),
                });
            }
            assignments.push(format!("{} = ?", field.column));
            params.push(codec::encode(value, field.field_type)?);
        }
        if assignments.is_empty() {
            return self.has_document(collection_name, key);
        }
        let (clause, key_params) = ops::key_predicate(&info, &fields, key)?;
        params.extend(key_params);
        let sql = format!(
            "UPDATE {} SET {} WHERE {clause}",
            info.table,
            assignments.join(", ")
        );
        let changed = self
            .conn
            .execute(&sql, params_from_iter(params))
            .map_err(|e| Error::engine(format!("update({collection_name})"), e))?;
        Ok(changed > 0)
    }

    /// Deletes the document with the given primary key. Returns
    /// whether a document was found.
    pub fn remove_document(&self, collection_name: &str, key: &[Value]) -> Result<bool> {
        let info = schema::collection(&self.conn, collection_name)?;
        let fields = schema::fields(&self.conn, collection_name)?;
        let (clause, params) = ops::key_predicate(&info, &fields, key)?;
        let sql = format!("DELETE FROM {} WHERE {clause}", info.table);
        let removed = self
            .conn
            .execute(&sql, params_from_iter(params))
            .map_err(|e| Error::engine(format!("remove_document({collection_name})"), e))?;
        Ok(removed > 0)
    }

    /// Declares any undeclared field the document carries, or rejects
    /// the document when auto-declare is off
    fn ensure_declared(&self, info: &CollectionInfo, doc: &Document) -> Result<()> {
        let fields = schema::fields(&self.conn, &info.name)?;
        for (name, value) in doc.iter() {
            if find_field(&fields, name).is_some() {
                continue;
            }
            if !self.auto_declare {
                return Err(Error::unknown_field(&info.name, name));
            }
            let field_type = value.infer_type()?;
            debug!(
                collection = %info.name,
                field = %name,
                %field_type,
                "auto-declaring field"
            );
            schema::declare_field(&self.conn, &info.name, name, field_type, None, None)?;
        }
        Ok(())
    }

    // ==================
    // Reads (see the session's own uncommitted changes)
    // ==================

    pub fn collection_names(&self) -> Result<Vec<String>> {
        ops::collection_names(&self.conn)
    }

    pub fn has_collection(&self, name: &str) -> Result<bool> {
        ops::has_collection(&self.conn, name)
    }

    pub fn collection(&self, name: &str) -> Result<CollectionInfo> {
        ops::collection(&self.conn, name)
    }

    pub fn fields(&self, collection: &str) -> Result<Vec<FieldInfo>> {
        ops::fields(&self.conn, collection)
    }

    pub fn document(&self, collection: &str, key: &[Value]) -> Result<Option<Document>> {
        ops::document(&self.conn, &self.options, collection, key)
    }

    pub fn has_document(&self, collection: &str, key: &[Value]) -> Result<bool> {
        ops::has_document(&self.conn, collection, key)
    }

    pub fn documents(&self, collection: &str) -> Result<SearchHits> {
        ops::documents(&self.conn, &self.options, collection)
    }

    pub fn search(&self, collection: &str, filter: &str) -> Result<SearchHits> {
        ops::search(&self.conn, &self.options, collection, filter)
    }

    // ==================
    // Lifecycle
    // ==================

    /// Makes every change of this session visible atomically
    pub fn commit(mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| Error::engine("commit", e))?;
        self.committed = true;
        Ok(())
    }

    /// Discards every change of this session, schema changes included.
    /// Dropping an uncommitted session has the same effect.
    pub fn abort(mut self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| Error::engine("rollback", e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for WriteSession<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

fn find_field<'a>(fields: &'a [FieldInfo], name: &str) -> Option<&'a FieldInfo> {
    fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}
