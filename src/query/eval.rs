//! In-process filter evaluation
//!
//! Applies a type-checked expression to a decoded document. Used when
//! the backend cannot match inside serialized list cells; to keep
//! both strategies interchangeable the evaluator reproduces the SQL
//! semantics exactly, including three-valued logic: a comparison
//! touching a missing or null value is unknown, and only expressions
//! that come out true select the document. The `IS NULL` forms and
//! membership tests are two-valued, as their SQL counterparts are.

use std::cmp::Ordering;

use crate::document::Document;
use crate::types::Value;

use super::ast::{CmpOp, Expr, Literal, Operand};

/// Whether the document satisfies the expression. Field names in the
/// expression must be canonical (the compiler guarantees this).
pub(crate) fn evaluate(expr: &Expr, doc: &Document) -> bool {
    eval(expr, doc) == Some(true)
}

/// Three-valued evaluation; `None` is unknown
fn eval(expr: &Expr, doc: &Document) -> Option<bool> {
    match expr {
        Expr::All => Some(true),
        Expr::Not(inner) => eval(inner, doc).map(|b| !b),
        Expr::And(a, b) => match (eval(a, doc), eval(b, doc)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Expr::Or(a, b) => match (eval(a, doc), eval(b, doc)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        Expr::Compare { op, left, right } => eval_compare(*op, left, right, doc),
        Expr::In { needle, haystack } => eval_in(needle, haystack, doc),
    }
}

/// A field's value, `None` when the field is missing or null
fn field_value<'a>(doc: &'a Document, name: &str) -> Option<&'a Value> {
    match doc.get(name) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    }
}

fn eval_compare(op: CmpOp, left: &Operand, right: &Operand, doc: &Document) -> Option<bool> {
    // The IS NULL forms are two-valued
    if let (Operand::Field(name), Operand::Literal(Literal::Null))
    | (Operand::Literal(Literal::Null), Operand::Field(name)) = (left, right)
    {
        match op {
            CmpOp::Eq => return Some(field_value(doc, name).is_none()),
            CmpOp::Ne => return Some(field_value(doc, name).is_some()),
            _ => {}
        }
    }

    let lhs = operand_value(left, doc)?;
    let rhs = operand_value(right, doc)?;
    match op {
        CmpOp::Eq => Some(value_eq(&lhs, &rhs)),
        CmpOp::Ne => Some(!value_eq(&lhs, &rhs)),
        CmpOp::Lt => value_cmp(&lhs, &rhs).map(Ordering::is_lt),
        CmpOp::Le => value_cmp(&lhs, &rhs).map(Ordering::is_le),
        CmpOp::Gt => value_cmp(&lhs, &rhs).map(Ordering::is_gt),
        CmpOp::Ge => value_cmp(&lhs, &rhs).map(Ordering::is_ge),
        CmpOp::Like => like_match(&lhs, &rhs, false),
        CmpOp::ILike => like_match(&lhs, &rhs, true),
    }
}

fn eval_in(needle: &Operand, haystack: &Operand, doc: &Document) -> Option<bool> {
    match haystack {
        // Searching inside a stored list: absent list never matches
        Operand::Field(hname) => {
            let Some(Value::List(items)) = field_value(doc, hname) else {
                return Some(false);
            };
            let Some(target) = operand_value(needle, doc) else {
                return Some(false);
            };
            Some(items.iter().any(|item| value_eq(item, &target)))
        }
        Operand::Literal(Literal::List(elements)) => {
            let has_null = elements.iter().any(|e| matches!(e, Literal::Null));
            let Operand::Field(nname) = needle else {
                return Some(false);
            };
            match field_value(doc, nname) {
                // `col IS NULL OR col IN (...)` when the list holds null
                None => {
                    if has_null {
                        Some(true)
                    } else {
                        None
                    }
                }
                Some(value) => Some(
                    elements
                        .iter()
                        .filter(|e| !matches!(e, Literal::Null))
                        .any(|e| value_eq(value, &e.to_value())),
                ),
            }
        }
        Operand::Literal(_) => Some(false),
    }
}

/// Resolves an operand to an owned value; `None` is missing/null
fn operand_value(operand: &Operand, doc: &Document) -> Option<Value> {
    match operand {
        Operand::Field(name) => field_value(doc, name).cloned(),
        Operand::Literal(Literal::Null) => None,
        Operand::Literal(lit) => Some(lit.to_value()),
    }
}

/// Equality with int/float coercion, the way the engine compares
/// numeric columns
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(i), Value::Float(f)) | (Value::Float(f), Value::Integer(i)) => {
            *i as f64 == *f
        }
        _ => a == b,
    }
}

fn value_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Integer(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Integer(y)) => x.partial_cmp(&(*y as f64)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::Time(x), Value::Time(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// SQL LIKE over decoded strings: `%` matches any run, `_` any single
/// character, everything else is literal
fn like_match(value: &Value, pattern: &Value, case_insensitive: bool) -> Option<bool> {
    let (Value::String(value), Value::String(pattern)) = (value, pattern) else {
        return None;
    };
    let mut regex = String::with_capacity(pattern.len() + 8);
    if case_insensitive {
        regex.push_str("(?i)");
    }
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    // The pattern is built from escaped fragments only
    let re = regex::Regex::new(&regex).ok()?;
    Some(re.is_match(value))
}
