//! Logical field types and tagged values
//!
//! A field's type is one of eight scalar kinds or a list of one of
//! them. Lists and scalars are distinct types and a field never
//! changes shape at runtime. Values are a closed tagged variant over
//! the same kinds, validated against the declared type at the write
//! boundary rather than threaded through the system dynamically.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scalar kinds storable in a single column cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Time,
    Json,
}

impl ScalarType {
    /// Stable name used in the `fields` metadata relation
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Integer => "int",
            ScalarType::Float => "float",
            ScalarType::Boolean => "boolean",
            ScalarType::Date => "date",
            ScalarType::DateTime => "datetime",
            ScalarType::Time => "time",
            ScalarType::Json => "json",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => ScalarType::String,
            "int" => ScalarType::Integer,
            "float" => ScalarType::Float,
            "boolean" => ScalarType::Boolean,
            "date" => ScalarType::Date,
            "datetime" => ScalarType::DateTime,
            "time" => ScalarType::Time,
            "json" => ScalarType::Json,
            _ => return None,
        })
    }
}

/// Logical type of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Scalar(ScalarType),
    List(ScalarType),
}

impl FieldType {
    pub const STRING: FieldType = FieldType::Scalar(ScalarType::String);
    pub const INTEGER: FieldType = FieldType::Scalar(ScalarType::Integer);
    pub const FLOAT: FieldType = FieldType::Scalar(ScalarType::Float);
    pub const BOOLEAN: FieldType = FieldType::Scalar(ScalarType::Boolean);
    pub const DATE: FieldType = FieldType::Scalar(ScalarType::Date);
    pub const DATETIME: FieldType = FieldType::Scalar(ScalarType::DateTime);
    pub const TIME: FieldType = FieldType::Scalar(ScalarType::Time);
    pub const JSON: FieldType = FieldType::Scalar(ScalarType::Json);

    pub fn list_of(element: ScalarType) -> FieldType {
        FieldType::List(element)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List(_))
    }

    /// Element type for lists, the scalar itself otherwise
    pub fn scalar(&self) -> ScalarType {
        match self {
            FieldType::Scalar(s) | FieldType::List(s) => *s,
        }
    }

    /// Whether ordering operators (`<`, `<=`, `>`, `>=`) make sense
    /// for this type. Lists, booleans and json are unordered.
    pub fn orderable(&self) -> bool {
        match self {
            FieldType::List(_) => false,
            FieldType::Scalar(s) => !matches!(s, ScalarType::Boolean | ScalarType::Json),
        }
    }

    /// Stable name used in the `fields` metadata relation
    /// (`string`, `int`, ..., `list_string`, `list_int`, ...)
    pub fn name(&self) -> String {
        match self {
            FieldType::Scalar(s) => s.name().to_string(),
            FieldType::List(s) => format!("list_{}", s.name()),
        }
    }

    /// Parses a stable name back into a type
    pub fn parse(name: &str) -> Option<FieldType> {
        if let Some(element) = name.strip_prefix("list_") {
            return ScalarType::from_name(element).map(FieldType::List);
        }
        ScalarType::from_name(name).map(FieldType::Scalar)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A document field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Json(serde_json::Value),
    List(Vec<Value>),
}

impl Value {
    /// Kind name for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Time(_) => "time",
            Value::Json(_) => "json",
            Value::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Checks the value's shape against a declared type. `Null` fits
    /// any type; an integer fits a float field (the only coercion).
    pub fn fits(&self, field_type: FieldType) -> bool {
        match (self, field_type) {
            (Value::Null, _) => true,
            (Value::List(items), FieldType::List(element)) => items
                .iter()
                .all(|v| v.fits(FieldType::Scalar(element)) && !v.is_null()),
            (_, FieldType::List(_)) | (Value::List(_), FieldType::Scalar(_)) => false,
            (v, FieldType::Scalar(s)) => matches!(
                (v, s),
                (Value::String(_), ScalarType::String)
                    | (Value::Integer(_), ScalarType::Integer)
                    | (Value::Float(_), ScalarType::Float)
                    | (Value::Integer(_), ScalarType::Float)
                    | (Value::Boolean(_), ScalarType::Boolean)
                    | (Value::Date(_), ScalarType::Date)
                    | (Value::DateTime(_), ScalarType::DateTime)
                    | (Value::Time(_), ScalarType::Time)
                    | (Value::Json(_), ScalarType::Json)
            ),
        }
    }

    /// Infers a logical type from a value, used when the caller opts
    /// in to auto-declaring fields from a document's own values.
    /// Fails for nulls and empty lists, which carry no type.
    pub fn infer_type(&self) -> Result<FieldType> {
        fn scalar(v: &Value) -> Option<ScalarType> {
            Some(match v {
                Value::String(_) => ScalarType::String,
                Value::Integer(_) => ScalarType::Integer,
                Value::Float(_) => ScalarType::Float,
                Value::Boolean(_) => ScalarType::Boolean,
                Value::Date(_) => ScalarType::Date,
                Value::DateTime(_) => ScalarType::DateTime,
                Value::Time(_) => ScalarType::Time,
                Value::Json(_) => ScalarType::Json,
                Value::Null | Value::List(_) => return None,
            })
        }
        match self {
            Value::Null => Err(Error::type_mismatch(
                "cannot infer a field type from a null value",
            )),
            Value::List(items) => {
                let first = items.first().ok_or_else(|| {
                    Error::type_mismatch("cannot infer a field type from an empty list")
                })?;
                let element = scalar(first)
                    .ok_or_else(|| Error::type_mismatch("lists of lists are not supported"))?;
                Ok(FieldType::List(element))
            }
            other => Ok(FieldType::Scalar(
                scalar(other).expect("non-list, non-null value has a scalar kind"),
            )),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
