//! Read operations shared by both session kinds
//!
//! Free functions over a connection whose transaction is already open;
//! the session types delegate here so reads behave identically inside
//! read and write sessions.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::warn;

use crate::codec;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::query::{self, CompiledFilter};
use crate::schema::{self, CollectionInfo, FieldInfo};
use crate::types::Value;

use super::store::StoreOptions;

/// A stored cell that could not be decoded per its declared type
#[derive(Debug)]
pub struct CorruptCell {
    pub collection: String,
    pub field: String,
    pub detail: String,
}

/// The outcome of a search: matching documents plus, in lenient mode,
/// the cells that had to be skipped because they would not decode
#[derive(Debug, Default)]
pub struct SearchHits {
    pub documents: Vec<Document>,
    pub corrupt: Vec<CorruptCell>,
}

pub(crate) fn collection_names(conn: &Connection) -> Result<Vec<String>> {
    schema::collection_names(conn)
}

pub(crate) fn collection(conn: &Connection, name: &str) -> Result<CollectionInfo> {
    schema::collection(conn, name)
}

pub(crate) fn has_collection(conn: &Connection, name: &str) -> Result<bool> {
    schema::has_collection(conn, name)
}

pub(crate) fn fields(conn: &Connection, collection: &str) -> Result<Vec<FieldInfo>> {
    schema::fields(conn, collection)
}

/// Fetches one document by primary key
pub(crate) fn document(
    conn: &Connection,
    options: &StoreOptions,
    collection_name: &str,
    key: &[Value],
) -> Result<Option<Document>> {
    let info = schema::collection(conn, collection_name)?;
    let fields = schema::fields(conn, collection_name)?;
    let (clause, params) = key_predicate(&info, &fields, key)?;
    let sql = format!(
        "SELECT {} FROM {} WHERE {clause}",
        column_list(&fields),
        info.table
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::engine(format!("document({collection_name})"), e))?;
    let mut rows = stmt
        .query(params_from_iter(params))
        .map_err(|e| Error::engine(format!("document({collection_name})"), e))?;
    let Some(row) = rows
        .next()
        .map_err(|e| Error::engine(format!("document({collection_name})"), e))?
    else {
        return Ok(None);
    };
    let (doc, corrupt) = decode_row(row, &fields, collection_name)?;
    report_corrupt(options, &corrupt)?;
    Ok(Some(doc))
}

pub(crate) fn has_document(
    conn: &Connection,
    collection_name: &str,
    key: &[Value],
) -> Result<bool> {
    let info = schema::collection(conn, collection_name)?;
    let fields = schema::fields(conn, collection_name)?;
    let (clause, params) = key_predicate(&info, &fields, key)?;
    let sql = format!("SELECT 1 FROM {} WHERE {clause} LIMIT 1", info.table);
    let found: Option<i64> = conn
        .query_row(&sql, params_from_iter(params), |row| row.get(0))
        .optional()
        .map_err(|e| Error::engine(format!("has_document({collection_name})"), e))?;
    Ok(found.is_some())
}

/// Fetches every document of a collection
pub(crate) fn documents(
    conn: &Connection,
    options: &StoreOptions,
    collection_name: &str,
) -> Result<SearchHits> {
    let info = schema::collection(conn, collection_name)?;
    let fields = schema::fields(conn, collection_name)?;
    scan(conn, options, &info, &fields, "1", Vec::new(), None)
}

/// Runs a filter expression against a collection
pub(crate) fn search(
    conn: &Connection,
    options: &StoreOptions,
    collection_name: &str,
    filter: &str,
) -> Result<SearchHits> {
    let info = schema::collection(conn, collection_name)?;
    let fields = schema::fields(conn, collection_name)?;
    match query::compile(conn, &info, filter, options.capabilities)? {
        CompiledFilter::All => scan(conn, options, &info, &fields, "1", Vec::new(), None),
        CompiledFilter::Sql {
            where_clause,
            params,
        } => scan(conn, options, &info, &fields, &where_clause, params, None),
        CompiledFilter::Post { expr } => {
            scan(conn, options, &info, &fields, "1", Vec::new(), Some(&expr))
        }
    }
}

fn scan(
    conn: &Connection,
    options: &StoreOptions,
    info: &CollectionInfo,
    fields: &[FieldInfo],
    where_clause: &str,
    params: Vec<SqlValue>,
    post: Option<&query::Expr>,
) -> Result<SearchHits> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {where_clause}",
        column_list(fields),
        info.table
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::engine(format!("search({})", info.name), e))?;
    let mut rows = stmt
        .query(params_from_iter(params))
        .map_err(|e| Error::engine(format!("search({})", info.name), e))?;
    let mut hits = SearchHits::default();
    while let Some(row) = rows
        .next()
        .map_err(|e| Error::engine(format!("search({})", info.name), e))?
    {
        let (doc, corrupt) = decode_row(row, fields, &info.name)?;
        report_corrupt(options, &corrupt)?;
        if let Some(expr) = post {
            if !query::evaluate(expr, &doc) {
                continue;
            }
        }
        hits.documents.push(doc);
        hits.corrupt.extend(corrupt);
    }
    Ok(hits)
}

fn column_list(fields: &[FieldInfo]) -> String {
    fields
        .iter()
        .map(|f| f.column.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decodes one row into a document, collecting undecodable cells
/// instead of failing; strictness is the caller's decision
fn decode_row(
    row: &rusqlite::Row<'_>,
    fields: &[FieldInfo],
    collection_name: &str,
) -> Result<(Document, Vec<CorruptCell>)> {
    let mut doc = Document::new();
    let mut corrupt = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let stored: SqlValue = row
            .get(index)
            .map_err(|e| Error::engine(format!("decode({collection_name})"), e))?;
        if matches!(stored, SqlValue::Null) {
            continue;
        }
        match codec::decode(stored, field.field_type) {
            Ok(value) => {
                doc.set(&field.name, value);
            }
            Err(error) => corrupt.push(CorruptCell {
                collection: collection_name.to_string(),
                field: field.name.clone(),
                detail: error.to_string(),
            }),
        }
    }
    Ok((doc, corrupt))
}

fn report_corrupt(options: &StoreOptions, corrupt: &[CorruptCell]) -> Result<()> {
    let Some(first) = corrupt.first() else {
        return Ok(());
    };
    if options.strict_decode {
        return Err(Error::CorruptValue(format!(
            "field {:?} of collection {:?}: {}",
            first.field, first.collection, first.detail
        )));
    }
    for cell in corrupt {
        warn!(
            collection = %cell.collection,
            field = %cell.field,
            detail = %cell.detail,
            "skipping undecodable cell"
        );
    }
    Ok(())
}

/// Builds `col = ? AND ...` over the primary-key columns and encodes
/// the key values in key order
pub(crate) fn key_predicate(
    info: &CollectionInfo,
    fields: &[FieldInfo],
    key: &[Value],
) -> Result<(String, Vec<SqlValue>)> {
    if key.len() != info.primary_key.len() {
        return Err(Error::type_mismatch(format!(
            "collection {:?} has a {}-field primary key, got {} value(s)",
            info.name,
            info.primary_key.len(),
            key.len()
        )));
    }
    let mut clauses = Vec::with_capacity(key.len());
    let mut params = Vec::with_capacity(key.len());
    for (name, value) in info.primary_key.iter().zip(key) {
        let field = fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::unknown_field(&info.name, name))?;
        if matches!(value, Value::Null) {
            return Err(Error::type_mismatch(format!(
                "primary-key field {name:?} cannot be null"
            )));
        }
        params.push(codec::encode(value, field.field_type)?);
        clauses.push(format!("{} = ?", field.column));
    }
    Ok((clauses.join(" AND "), params))
}
