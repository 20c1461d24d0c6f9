//! Metadata relations and DDL mediation
//!
//! The registry is stateless: every operation reads and writes the
//! metadata relations through the connection it is given, which is
//! always inside a session's transaction. Collection and field names
//! are unique case-insensitively (the backing engine's identifiers
//! are case-insensitive) and lookups follow the same rule.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::codec;
use crate::error::{Error, Result};
use crate::ident;
use crate::types::{FieldType, Value};

/// Metadata describing one collection
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    /// User-chosen name
    pub name: String,
    /// Digest-derived physical relation name
    pub table: String,
    /// Primary-key field names, in key order
    pub primary_key: Vec<String>,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

/// Metadata describing one field
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub collection: String,
    pub name: String,
    pub field_type: FieldType,
    /// Digest-derived physical column name
    pub column: String,
    pub description: Option<String>,
    /// Default applied when an inserted document omits the field
    pub default: Option<Value>,
    /// Whether the field is part of the collection's primary key
    pub primary_key: bool,
}

/// Creates the metadata relations if they do not exist yet.
/// Called once per store open, outside any session.
pub(crate) fn bootstrap(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS collections (
             name        TEXT NOT NULL COLLATE NOCASE PRIMARY KEY,
             table_name  TEXT NOT NULL,
             primary_key TEXT NOT NULL,
             created_at  TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS fields (
             collection    TEXT NOT NULL COLLATE NOCASE,
             name          TEXT NOT NULL COLLATE NOCASE,
             field_type    TEXT NOT NULL,
             column_name   TEXT NOT NULL,
             description   TEXT,
             default_value TEXT,
             is_key        INTEGER NOT NULL DEFAULT 0,
             PRIMARY KEY (collection, name)
         );",
    )
    .map_err(|e| Error::engine("bootstrap metadata", e))
}

/// Creates a collection with the given primary-key specification
/// (one or more named and typed fields, each NOT NULL)
pub(crate) fn declare_collection(
    conn: &Connection,
    name: &str,
    primary_key: &[(&str, FieldType)],
) -> Result<CollectionInfo> {
    if primary_key.is_empty() {
        return Err(Error::type_mismatch(
            "a collection primary key requires at least one field",
        ));
    }
    for (field, field_type) in primary_key {
        if field_type.is_list() {
            return Err(Error::type_mismatch(format!(
                "list field {field:?} cannot be part of a primary key"
            )));
        }
    }
    if has_collection(conn, name)? {
        return Err(Error::DuplicateCollection(name.to_string()));
    }

    let table = ident::table_name(name);
    let mut columns = Vec::with_capacity(primary_key.len());
    let mut key_columns = Vec::with_capacity(primary_key.len());
    for (field, field_type) in primary_key {
        let column = ident::column_name(name, field);
        let kind = codec::column_kind(*field_type);
        columns.push(format!("{column} {} NOT NULL", kind.sql_name()));
        key_columns.push(column);
    }
    let ddl = format!(
        "CREATE TABLE {table} ({}, PRIMARY KEY ({}))",
        columns.join(", "),
        key_columns.join(", ")
    );
    debug!(collection = name, table = %table, "creating collection");
    conn.execute(&ddl, [])
        .map_err(|e| Error::engine(format!("declare_collection({name})"), e))?;

    let key_names: Vec<&str> = primary_key.iter().map(|(f, _)| *f).collect();
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO collections (name, table_name, primary_key, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            name,
            table,
            serde_json::to_string(&key_names).expect("string array serializes"),
            created_at
        ],
    )
    .map_err(|e| Error::engine(format!("declare_collection({name})"), e))?;
    for (field, field_type) in primary_key {
        conn.execute(
            "INSERT INTO fields (collection, name, field_type, column_name, is_key)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![name, field, field_type.name(), ident::column_name(name, field)],
        )
        .map_err(|e| Error::engine(format!("declare_collection({name})"), e))?;
    }

    Ok(CollectionInfo {
        name: name.to_string(),
        table,
        primary_key: key_names.iter().map(|s| s.to_string()).collect(),
        created_at,
    })
}

/// Drops a collection's relation and every metadata row describing it
pub(crate) fn remove_collection(conn: &Connection, name: &str) -> Result<()> {
    let info = collection(conn, name)?;
    debug!(collection = name, table = %info.table, "dropping collection");
    conn.execute(&format!("DROP TABLE {}", info.table), [])
        .map_err(|e| Error::engine(format!("remove_collection({name})"), e))?;
    conn.execute("DELETE FROM fields WHERE collection = ?1", params![name])
        .map_err(|e| Error::engine(format!("remove_collection({name})"), e))?;
    conn.execute("DELETE FROM collections WHERE name = ?1", params![name])
        .map_err(|e| Error::engine(format!("remove_collection({name})"), e))?;
    Ok(())
}

/// Adds a typed field to an existing collection
pub(crate) fn declare_field(
    conn: &Connection,
    collection_name: &str,
    name: &str,
    field_type: FieldType,
    description: Option<&str>,
    default: Option<&Value>,
) -> Result<FieldInfo> {
    let info = collection(conn, collection_name)?;
    let existing: Option<String> = conn
        .query_row(
            "SELECT name FROM fields WHERE collection = ?1 AND name = ?2",
            params![collection_name, name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::engine(format!("declare_field({collection_name}, {name})"), e))?;
    if existing.is_some() {
        return Err(Error::DuplicateField {
            collection: collection_name.to_string(),
            field: name.to_string(),
        });
    }

    // Validate the default against the declared type before any DDL
    let default_text = match default {
        Some(value) => Some(default_to_text(value, field_type)?),
        None => None,
    };

    let column = ident::column_name(collection_name, name);
    let kind = codec::column_kind(field_type);
    debug!(
        collection = collection_name,
        field = name,
        %field_type,
        column = %column,
        "adding field"
    );
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN {column} {}", info.table, kind.sql_name()),
        [],
    )
    .map_err(|e| Error::engine(format!("declare_field({collection_name}, {name})"), e))?;
    conn.execute(
        "INSERT INTO fields
             (collection, name, field_type, column_name, description, default_value, is_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![
            collection_name,
            name,
            field_type.name(),
            column,
            description,
            default_text
        ],
    )
    .map_err(|e| Error::engine(format!("declare_field({collection_name}, {name})"), e))?;

    Ok(FieldInfo {
        collection: collection_name.to_string(),
        name: name.to_string(),
        field_type,
        column,
        description: description.map(str::to_string),
        default: default.cloned(),
        primary_key: false,
    })
}

/// Drops a field's column and its metadata row; all document values
/// for the field are lost
pub(crate) fn remove_field(conn: &Connection, collection_name: &str, name: &str) -> Result<()> {
    let info = collection(conn, collection_name)?;
    let field = resolve(conn, collection_name, name)?;
    if field.primary_key {
        return Err(Error::ImmutablePrimaryKey {
            collection: collection_name.to_string(),
            field: name.to_string(),
        });
    }
    debug!(
        collection = collection_name,
        field = name,
        column = %field.column,
        "dropping field"
    );
    conn.execute(
        &format!("ALTER TABLE {} DROP COLUMN {}", info.table, field.column),
        [],
    )
    .map_err(|e| Error::engine(format!("remove_field({collection_name}, {name})"), e))?;
    conn.execute(
        "DELETE FROM fields WHERE collection = ?1 AND name = ?2",
        params![collection_name, name],
    )
    .map_err(|e| Error::engine(format!("remove_field({collection_name}, {name})"), e))?;
    Ok(())
}

/// Returns a field's logical type and physical identifier
pub(crate) fn resolve(
    conn: &Connection,
    collection_name: &str,
    name: &str,
) -> Result<FieldInfo> {
    if !has_collection(conn, collection_name)? {
        return Err(Error::UnknownCollection(collection_name.to_string()));
    }
    conn.query_row(
        "SELECT name, field_type, column_name, description, default_value, is_key
         FROM fields WHERE collection = ?1 AND name = ?2",
        params![collection_name, name],
        |row| field_from_row(collection_name, row),
    )
    .optional()
    .map_err(|e| Error::engine(format!("resolve({collection_name}, {name})"), e))?
    .ok_or_else(|| Error::unknown_field(collection_name, name))?
}

/// Returns every field of a collection, in declaration order
/// (primary-key fields first)
pub(crate) fn fields(conn: &Connection, collection_name: &str) -> Result<Vec<FieldInfo>> {
    if !has_collection(conn, collection_name)? {
        return Err(Error::UnknownCollection(collection_name.to_string()));
    }
    let mut stmt = conn
        .prepare(
            "SELECT name, field_type, column_name, description, default_value, is_key
             FROM fields WHERE collection = ?1 ORDER BY rowid",
        )
        .map_err(|e| Error::engine(format!("fields({collection_name})"), e))?;
    let rows = stmt
        .query_map(params![collection_name], |row| {
            field_from_row(collection_name, row)
        })
        .map_err(|e| Error::engine(format!("fields({collection_name})"), e))?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| Error::engine(format!("fields({collection_name})"), e))??);
    }
    Ok(result)
}

/// Returns a collection's metadata
pub(crate) fn collection(conn: &Connection, name: &str) -> Result<CollectionInfo> {
    conn.query_row(
        "SELECT name, table_name, primary_key, created_at FROM collections WHERE name = ?1",
        params![name],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    )
    .optional()
    .map_err(|e| Error::engine(format!("collection({name})"), e))?
    .map(|(name, table, key_json, created_at)| {
        let primary_key: Vec<String> = serde_json::from_str(&key_json).map_err(|e| {
            Error::CorruptValue(format!("unparsable primary key spec for {name:?}: {e}"))
        })?;
        Ok(CollectionInfo {
            name,
            table,
            primary_key,
            created_at,
        })
    })
    .transpose()?
    .ok_or_else(|| Error::UnknownCollection(name.to_string()))
}

/// Lists collection names, sorted case-insensitively
pub(crate) fn collection_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM collections ORDER BY name")
        .map_err(|e| Error::engine("collection_names", e))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| Error::engine("collection_names", e))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::engine("collection_names", e))
}

pub(crate) fn has_collection(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::engine(format!("has_collection({name})"), e))?;
    Ok(found.is_some())
}

/// Maps a `fields` row; decoding errors are deferred into the outer
/// Result so engine errors and metadata corruption stay distinct
fn field_from_row(
    collection_name: &str,
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<FieldInfo>> {
    let name: String = row.get(0)?;
    let type_name: String = row.get(1)?;
    let column: String = row.get(2)?;
    let description: Option<String> = row.get(3)?;
    let default_text: Option<String> = row.get(4)?;
    let is_key: bool = row.get(5)?;
    Ok((|| {
        let field_type = FieldType::parse(&type_name).ok_or_else(|| {
            Error::CorruptValue(format!("unknown field type {type_name:?} in metadata"))
        })?;
        let default = default_text
            .map(|text| default_from_text(&text, field_type))
            .transpose()?;
        Ok(FieldInfo {
            collection: collection_name.to_string(),
            name,
            field_type,
            column,
            description,
            default,
            primary_key: is_key,
        })
    })())
}

/// Stores a default as the JSON form of its physical encoding
fn default_to_text(value: &Value, field_type: FieldType) -> Result<String> {
    use rusqlite::types::Value as SqlValue;
    let encoded = codec::encode(value, field_type)?;
    let json = match encoded {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(i) => serde_json::Value::from(i),
        SqlValue::Real(f) => serde_json::Value::from(f),
        SqlValue::Text(s) => serde_json::Value::String(s),
        SqlValue::Blob(_) => unreachable!("codec never emits blobs"),
    };
    Ok(serde_json::to_string(&json).expect("scalar json serializes"))
}

fn default_from_text(text: &str, field_type: FieldType) -> Result<Value> {
    use rusqlite::types::Value as SqlValue;
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::CorruptValue(format!("unparsable field default: {e}")))?;
    let physical = match json {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match codec::column_kind(field_type) {
                    codec::ColumnKind::Real => SqlValue::Real(i as f64),
                    _ => SqlValue::Integer(i),
                }
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => SqlValue::Text(s),
        other => {
            return Err(Error::CorruptValue(format!(
                "unexpected field default {other}"
            )))
        }
    };
    codec::decode(physical, field_type)
}
