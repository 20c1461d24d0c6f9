//! Value Codec
//!
//! Pure, stateless conversion between logical values and the physical
//! representation SQLite accepts. Scalars map directly (text, integer,
//! real, boolean-as-integer), temporal scalars are ISO-8601 text, and
//! `json` plus every list type are one text cell holding a canonical
//! compact JSON serialization. List elements are individually
//! scalar-encoded before serialization, so a `list_date` cell is a
//! JSON array of ISO-8601 strings and a `list_boolean` cell is a JSON
//! array of 0/1 integers.
//!
//! `encode` failures are `TypeMismatch` (user error at the write
//! boundary); `decode` failures are `CorruptValue` (on-disk data was
//! written outside the codec's discipline).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Value as SqlValue;

use crate::error::{Error, Result};
use crate::types::{FieldType, ScalarType, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Physical column affinity used when creating a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
}

impl ColumnKind {
    /// SQL type name for DDL
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnKind::Text => "TEXT",
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
        }
    }
}

/// Physical column kind for a logical type
pub fn column_kind(field_type: FieldType) -> ColumnKind {
    match field_type {
        FieldType::List(_) => ColumnKind::Text,
        FieldType::Scalar(s) => match s {
            ScalarType::Integer | ScalarType::Boolean => ColumnKind::Integer,
            ScalarType::Float => ColumnKind::Real,
            ScalarType::String
            | ScalarType::Date
            | ScalarType::DateTime
            | ScalarType::Time
            | ScalarType::Json => ColumnKind::Text,
        },
    }
}

/// Encodes a value for storage in a column of the given logical type
pub fn encode(value: &Value, field_type: FieldType) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    if !value.fits(field_type) {
        return Err(Error::type_mismatch(format!(
            "expected a {} value, got {}",
            field_type,
            value.kind_name()
        )));
    }
    match field_type {
        FieldType::Scalar(scalar) => encode_scalar(value, scalar),
        FieldType::List(element) => {
            let Value::List(items) = value else {
                unreachable!("fits() guarantees list shape");
            };
            let mut encoded = Vec::with_capacity(items.len());
            for item in items {
                encoded.push(scalar_to_json(item, element)?);
            }
            let text = serde_json::to_string(&encoded)
                .map_err(|e| Error::type_mismatch(format!("unserializable list: {e}")))?;
            Ok(SqlValue::Text(text))
        }
    }
}

fn encode_scalar(value: &Value, scalar: ScalarType) -> Result<SqlValue> {
    Ok(match (value, scalar) {
        (Value::String(s), ScalarType::String) => SqlValue::Text(s.clone()),
        (Value::Integer(i), ScalarType::Integer) => SqlValue::Integer(*i),
        (Value::Float(f), ScalarType::Float) => SqlValue::Real(*f),
        (Value::Integer(i), ScalarType::Float) => SqlValue::Real(*i as f64),
        (Value::Boolean(b), ScalarType::Boolean) => SqlValue::Integer(i64::from(*b)),
        (Value::Date(d), ScalarType::Date) => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
        (Value::DateTime(d), ScalarType::DateTime) => {
            SqlValue::Text(d.format(DATETIME_FORMAT).to_string())
        }
        (Value::Time(t), ScalarType::Time) => SqlValue::Text(t.format(TIME_FORMAT).to_string()),
        (Value::Json(j), ScalarType::Json) => SqlValue::Text(
            serde_json::to_string(j)
                .map_err(|e| Error::type_mismatch(format!("unserializable json: {e}")))?,
        ),
        _ => unreachable!("fits() guarantees scalar shape"),
    })
}

/// Scalar-encodes a list element into its JSON representation
fn scalar_to_json(value: &Value, element: ScalarType) -> Result<serde_json::Value> {
    Ok(match (value, element) {
        (Value::String(s), ScalarType::String) => serde_json::Value::String(s.clone()),
        (Value::Integer(i), ScalarType::Integer) => serde_json::Value::from(*i),
        (Value::Float(f), ScalarType::Float) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::type_mismatch("non-finite float in list"))?,
        (Value::Integer(i), ScalarType::Float) => serde_json::Value::from(*i as f64),
        (Value::Boolean(b), ScalarType::Boolean) => serde_json::Value::from(i64::from(*b)),
        (Value::Date(d), ScalarType::Date) => {
            serde_json::Value::String(d.format(DATE_FORMAT).to_string())
        }
        (Value::DateTime(d), ScalarType::DateTime) => {
            serde_json::Value::String(d.format(DATETIME_FORMAT).to_string())
        }
        (Value::Time(t), ScalarType::Time) => {
            serde_json::Value::String(t.format(TIME_FORMAT).to_string())
        }
        (Value::Json(j), ScalarType::Json) => j.clone(),
        (v, e) => {
            return Err(Error::type_mismatch(format!(
                "expected a {} list element, got {}",
                FieldType::Scalar(e),
                v.kind_name()
            )))
        }
    })
}

/// Decodes a stored cell back into a logical value
pub fn decode(stored: SqlValue, field_type: FieldType) -> Result<Value> {
    if matches!(stored, SqlValue::Null) {
        return Ok(Value::Null);
    }
    match field_type {
        FieldType::Scalar(scalar) => decode_scalar(stored, scalar),
        FieldType::List(element) => {
            let SqlValue::Text(text) = stored else {
                return Err(corrupt(field_type, &stored));
            };
            let parsed: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| Error::CorruptValue(format!("unparsable list cell: {e}")))?;
            let serde_json::Value::Array(items) = parsed else {
                return Err(Error::CorruptValue(format!(
                    "expected a JSON array in a {field_type} cell"
                )));
            };
            let mut decoded = Vec::with_capacity(items.len());
            for item in items {
                decoded.push(json_to_scalar(item, element)?);
            }
            Ok(Value::List(decoded))
        }
    }
}

fn decode_scalar(stored: SqlValue, scalar: ScalarType) -> Result<Value> {
    let field_type = FieldType::Scalar(scalar);
    Ok(match (stored, scalar) {
        (SqlValue::Text(s), ScalarType::String) => Value::String(s),
        (SqlValue::Integer(i), ScalarType::Integer) => Value::Integer(i),
        (SqlValue::Real(f), ScalarType::Float) => Value::Float(f),
        (SqlValue::Integer(i), ScalarType::Float) => Value::Float(i as f64),
        (SqlValue::Integer(0), ScalarType::Boolean) => Value::Boolean(false),
        (SqlValue::Integer(1), ScalarType::Boolean) => Value::Boolean(true),
        (SqlValue::Text(s), ScalarType::Date) => Value::Date(parse_date(&s)?),
        (SqlValue::Text(s), ScalarType::DateTime) => Value::DateTime(parse_datetime(&s)?),
        (SqlValue::Text(s), ScalarType::Time) => Value::Time(parse_time(&s)?),
        (SqlValue::Text(s), ScalarType::Json) => Value::Json(
            serde_json::from_str(&s)
                .map_err(|e| Error::CorruptValue(format!("unparsable json cell: {e}")))?,
        ),
        (other, _) => return Err(corrupt(field_type, &other)),
    })
}

/// Decodes a JSON list element per the declared element type
fn json_to_scalar(item: serde_json::Value, element: ScalarType) -> Result<Value> {
    use serde_json::Value as Json;
    Ok(match (item, element) {
        (Json::String(s), ScalarType::String) => Value::String(s),
        (Json::Number(n), ScalarType::Integer) => Value::Integer(
            n.as_i64()
                .ok_or_else(|| Error::CorruptValue("non-integer in list_int cell".into()))?,
        ),
        (Json::Number(n), ScalarType::Float) => Value::Float(
            n.as_f64()
                .ok_or_else(|| Error::CorruptValue("non-numeric in list_float cell".into()))?,
        ),
        (Json::Number(n), ScalarType::Boolean) => match n.as_i64() {
            Some(0) => Value::Boolean(false),
            Some(1) => Value::Boolean(true),
            _ => {
                return Err(Error::CorruptValue(
                    "non-boolean in list_boolean cell".into(),
                ))
            }
        },
        // Booleans written as JSON true/false are accepted on read
        (Json::Bool(b), ScalarType::Boolean) => Value::Boolean(b),
        (Json::String(s), ScalarType::Date) => Value::Date(parse_date(&s)?),
        (Json::String(s), ScalarType::DateTime) => Value::DateTime(parse_datetime(&s)?),
        (Json::String(s), ScalarType::Time) => Value::Time(parse_time(&s)?),
        (j, ScalarType::Json) => Value::Json(j),
        (j, e) => {
            return Err(Error::CorruptValue(format!(
                "unexpected {j} element in a list_{} cell",
                e.name()
            )))
        }
    })
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| Error::CorruptValue(format!("unparsable date {s:?}: {e}")))
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| Error::CorruptValue(format!("unparsable datetime {s:?}: {e}")))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|e| Error::CorruptValue(format!("unparsable time {s:?}: {e}")))
}

fn corrupt(field_type: FieldType, stored: &SqlValue) -> Error {
    Error::CorruptValue(format!(
        "unexpected {} cell for a {field_type} field",
        match stored {
            SqlValue::Null => "NULL",
            SqlValue::Integer(_) => "INTEGER",
            SqlValue::Real(_) => "REAL",
            SqlValue::Text(_) => "TEXT",
            SqlValue::Blob(_) => "BLOB",
        }
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value, field_type: FieldType) {
        let stored = encode(&value, field_type).unwrap();
        let back = decode(stored, field_type).unwrap();
        assert_eq!(back, value, "round-trip failed for {field_type}");
    }

    #[test]
    fn test_scalar_round_trips() {
        round_trip(Value::from("hello"), FieldType::STRING);
        round_trip(Value::from(""), FieldType::STRING);
        round_trip(Value::from(-42i64), FieldType::INTEGER);
        round_trip(Value::from(i64::MIN), FieldType::INTEGER);
        round_trip(Value::from(3.25), FieldType::FLOAT);
        round_trip(Value::from(true), FieldType::BOOLEAN);
        round_trip(Value::from(false), FieldType::BOOLEAN);
        round_trip(
            Value::Json(serde_json::json!({"a": [1, 2], "b": null})),
            FieldType::JSON,
        );
    }

    #[test]
    fn test_temporal_round_trips() {
        round_trip(
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            FieldType::DATE,
        );
        round_trip(
            Value::Date(NaiveDate::from_ymd_opt(1, 1, 1).unwrap()),
            FieldType::DATE,
        );
        round_trip(
            Value::Date(NaiveDate::from_ymd_opt(9999, 12, 31).unwrap()),
            FieldType::DATE,
        );
        round_trip(
            Value::Time(NaiveTime::from_hms_micro_opt(23, 59, 59, 123456).unwrap()),
            FieldType::TIME,
        );
        round_trip(
            Value::Time(NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
            FieldType::TIME,
        );
        round_trip(
            Value::DateTime(
                NaiveDate::from_ymd_opt(2018, 5, 25)
                    .unwrap()
                    .and_hms_micro_opt(12, 30, 0, 500000)
                    .unwrap(),
            ),
            FieldType::DATETIME,
        );
    }

    #[test]
    fn test_list_round_trips() {
        round_trip(
            Value::from(vec!["a", "b", ""]),
            FieldType::list_of(ScalarType::String),
        );
        round_trip(Value::List(vec![]), FieldType::list_of(ScalarType::String));
        round_trip(
            Value::from(vec![1i64, -2, 3]),
            FieldType::list_of(ScalarType::Integer),
        );
        round_trip(
            Value::from(vec![true, false]),
            FieldType::list_of(ScalarType::Boolean),
        );
        round_trip(
            Value::List(vec![
                Value::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()),
                Value::Date(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()),
            ]),
            FieldType::list_of(ScalarType::Date),
        );
        round_trip(
            Value::List(vec![
                Value::Json(serde_json::json!({"k": 1})),
                Value::Json(serde_json::json!([true, null])),
            ]),
            FieldType::list_of(ScalarType::Json),
        );
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(
            encode(&Value::Null, FieldType::INTEGER).unwrap(),
            SqlValue::Null
        );
        assert_eq!(decode(SqlValue::Null, FieldType::DATE).unwrap(), Value::Null);
    }

    #[test]
    fn test_encode_shape_mismatch() {
        assert!(matches!(
            encode(&Value::from("x"), FieldType::INTEGER),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            encode(&Value::from("x"), FieldType::list_of(ScalarType::String)),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            encode(&Value::from(vec![1i64]), FieldType::INTEGER),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_integer_coerces_to_float_column() {
        let stored = encode(&Value::from(2i64), FieldType::FLOAT).unwrap();
        assert_eq!(stored, SqlValue::Real(2.0));
    }

    #[test]
    fn test_decode_corrupt_cells() {
        assert!(matches!(
            decode(SqlValue::Text("not a date".into()), FieldType::DATE),
            Err(Error::CorruptValue(_))
        ));
        assert!(matches!(
            decode(SqlValue::Integer(7), FieldType::BOOLEAN),
            Err(Error::CorruptValue(_))
        ));
        assert!(matches!(
            decode(
                SqlValue::Text("{\"not\": \"an array\"}".into()),
                FieldType::list_of(ScalarType::Integer)
            ),
            Err(Error::CorruptValue(_))
        ));
        assert!(matches!(
            decode(SqlValue::Text("nonsense".into()), FieldType::JSON),
            Err(Error::CorruptValue(_))
        ));
    }

    #[test]
    fn test_column_kinds() {
        assert_eq!(column_kind(FieldType::INTEGER), ColumnKind::Integer);
        assert_eq!(column_kind(FieldType::BOOLEAN), ColumnKind::Integer);
        assert_eq!(column_kind(FieldType::FLOAT), ColumnKind::Real);
        assert_eq!(column_kind(FieldType::STRING), ColumnKind::Text);
        assert_eq!(column_kind(FieldType::DATE), ColumnKind::Text);
        assert_eq!(
            column_kind(FieldType::list_of(ScalarType::Float)),
            ColumnKind::Text
        );
    }
}
