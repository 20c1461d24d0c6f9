//! Filter compilation
//!
//! Resolves every field reference against the Schema Registry,
//! type-checks the expression, and emits a parameterized predicate.
//! The compiler never emits a predicate it cannot type-check, and
//! every literal is a bound parameter.
//!
//! List-membership terms depend on the backend: SQLite has native
//! support through `json_each`, so the predicate stays in SQL. A
//! backend without that capability gets the whole expression compiled
//! to an in-process predicate applied to decoded documents instead —
//! one strategy per backend, never a silent mix.

use std::collections::BTreeMap;

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;

use crate::codec;
use crate::error::{Error, Result};
use crate::schema::{self, CollectionInfo, FieldInfo};
use crate::types::{FieldType, ScalarType, Value};

use super::ast::{CmpOp, Expr, Literal, Operand};
use super::parser::parse;

/// What the backing engine can evaluate natively
#[derive(Debug, Clone, Copy)]
pub struct BackendCapabilities {
    /// Whether the engine can match inside a serialized list cell
    pub native_list_membership: bool,
}

impl BackendCapabilities {
    /// The bundled SQLite engine, which has `json_each`
    pub const SQLITE: BackendCapabilities = BackendCapabilities {
        native_list_membership: true,
    };
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self::SQLITE
    }
}

/// An executable predicate for one collection
#[derive(Debug)]
pub enum CompiledFilter {
    /// Every document matches; no WHERE clause needed
    All,
    /// SQL predicate with its bound parameters, in order
    Sql {
        where_clause: String,
        params: Vec<SqlValue>,
    },
    /// In-process predicate over decoded documents, used when the
    /// backend cannot match inside serialized lists
    Post {
        /// Type-checked expression with canonical field names
        expr: Expr,
    },
}

/// Compiles a filter expression against a collection's schema
pub(crate) fn compile(
    conn: &Connection,
    info: &CollectionInfo,
    filter: &str,
    caps: BackendCapabilities,
) -> Result<CompiledFilter> {
    let expr = parse(filter)?;
    let fields = resolve_fields(conn, &info.name, &expr)?;
    let checked = Checker { fields: &fields }.check(&expr)?;

    if matches!(checked.expr, Expr::All) {
        return Ok(CompiledFilter::All);
    }
    if checked.uses_list_membership && !caps.native_list_membership {
        return Ok(CompiledFilter::Post { expr: checked.expr });
    }

    let mut generator = SqlGenerator {
        table: &info.table,
        fields: &fields,
        params: Vec::new(),
    };
    let where_clause = generator.emit(&checked.expr)?;
    Ok(CompiledFilter::Sql {
        where_clause,
        params: generator.params,
    })
}

/// Resolves every referenced field, keyed by canonical declared name
fn resolve_fields(
    conn: &Connection,
    collection: &str,
    expr: &Expr,
) -> Result<BTreeMap<String, FieldInfo>> {
    let mut spellings = Vec::new();
    expr.for_each_field(&mut |name| spellings.push(name.to_string()));
    let mut fields = BTreeMap::new();
    for spelling in spellings {
        let info = schema::resolve(conn, collection, &spelling)?;
        // Also index the query's spelling; lookups are case-insensitive
        fields.insert(spelling, info.clone());
        fields.insert(info.name.clone(), info);
    }
    Ok(fields)
}

struct Checked {
    expr: Expr,
    uses_list_membership: bool,
}

/// Type-checks an expression and canonicalizes its field names
struct Checker<'a> {
    fields: &'a BTreeMap<String, FieldInfo>,
}

impl Checker<'_> {
    fn check(&self, expr: &Expr) -> Result<Checked> {
        Ok(match expr {
            Expr::All => Checked {
                expr: Expr::All,
                uses_list_membership: false,
            },
            Expr::Not(inner) => {
                let inner = self.check(inner)?;
                Checked {
                    uses_list_membership: inner.uses_list_membership,
                    expr: Expr::Not(Box::new(inner.expr)),
                }
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                let left = self.check(a)?;
                let right = self.check(b)?;
                let uses = left.uses_list_membership || right.uses_list_membership;
                let expr = match expr {
                    Expr::And(_, _) => Expr::And(Box::new(left.expr), Box::new(right.expr)),
                    _ => Expr::Or(Box::new(left.expr), Box::new(right.expr)),
                };
                Checked {
                    expr,
                    uses_list_membership: uses,
                }
            }
            Expr::Compare { op, left, right } => {
                self.check_compare(*op, left, right)?;
                Checked {
                    expr: Expr::Compare {
                        op: *op,
                        left: self.canonical(left),
                        right: self.canonical(right),
                    },
                    uses_list_membership: false,
                }
            }
            Expr::In { needle, haystack } => {
                let uses = self.check_in(needle, haystack)?;
                Checked {
                    expr: Expr::In {
                        needle: self.canonical(needle),
                        haystack: self.canonical(haystack),
                    },
                    uses_list_membership: uses,
                }
            }
        })
    }

    fn field(&self, name: &str) -> &FieldInfo {
        self.fields
            .get(name)
            .expect("resolve_fields indexed every referenced field")
    }

    fn canonical(&self, operand: &Operand) -> Operand {
        match operand {
            Operand::Field(name) => Operand::Field(self.field(name).name.clone()),
            literal => literal.clone(),
        }
    }

    fn check_compare(&self, op: CmpOp, left: &Operand, right: &Operand) -> Result<()> {
        match (left, right) {
            (Operand::Literal(_), Operand::Literal(_)) => Err(Error::invalid_query(
                "a comparison requires at least one field reference",
            )),
            (Operand::Field(a), Operand::Field(b)) => {
                let (fa, fb) = (self.field(a), self.field(b));
                if op.is_ordering() && !(fa.field_type.orderable() && fb.field_type.orderable()) {
                    return Err(Error::invalid_query(format!(
                        "ordering comparison on unorderable field types {} and {}",
                        fa.field_type, fb.field_type
                    )));
                }
                if matches!(op, CmpOp::Like | CmpOp::ILike)
                    && !(fa.field_type == FieldType::STRING && fb.field_type == FieldType::STRING)
                {
                    return Err(Error::invalid_query(format!(
                        "{} requires string fields",
                        op.symbol()
                    )));
                }
                if !compatible(fa.field_type, fb.field_type) {
                    return Err(Error::invalid_query(format!(
                        "cannot compare field {:?} ({}) with field {:?} ({})",
                        fa.name, fa.field_type, fb.name, fb.field_type
                    )));
                }
                Ok(())
            }
            (Operand::Field(name), Operand::Literal(lit))
            | (Operand::Literal(lit), Operand::Field(name)) => {
                let field = self.field(name);
                if op.is_ordering() && !field.field_type.orderable() {
                    return Err(Error::invalid_query(format!(
                        "ordering comparison on {} field {:?}",
                        field.field_type, field.name
                    )));
                }
                if matches!(op, CmpOp::Like | CmpOp::ILike) {
                    if field.field_type != FieldType::STRING {
                        return Err(Error::invalid_query(format!(
                            "{} requires a string field, {:?} is {}",
                            op.symbol(),
                            field.name,
                            field.field_type
                        )));
                    }
                    if !matches!(lit, Literal::Str(_)) {
                        return Err(Error::invalid_query(format!(
                            "{} requires a string pattern",
                            op.symbol()
                        )));
                    }
                    return Ok(());
                }
                if !lit.to_value().fits(field.field_type) {
                    return Err(Error::invalid_query(format!(
                        "cannot compare {} field {:?} with a {} literal",
                        field.field_type,
                        field.name,
                        lit.kind_name()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Returns whether the term matches inside a serialized list cell
    fn check_in(&self, needle: &Operand, haystack: &Operand) -> Result<bool> {
        match haystack {
            Operand::Field(hname) => {
                let hfield = self.field(hname);
                let FieldType::List(element) = hfield.field_type else {
                    return Err(Error::invalid_query(format!(
                        "right operand of IN must be a list or a list field, {:?} is {}",
                        hfield.name, hfield.field_type
                    )));
                };
                match needle {
                    Operand::Literal(lit) => {
                        if matches!(lit, Literal::List(_)) {
                            return Err(Error::invalid_query(
                                "left operand of IN must be a scalar",
                            ));
                        }
                        if !lit.to_value().fits(FieldType::Scalar(element)) {
                            return Err(Error::invalid_query(format!(
                                "cannot search a {} literal in {} field {:?}",
                                lit.kind_name(),
                                hfield.field_type,
                                hfield.name
                            )));
                        }
                    }
                    Operand::Field(nname) => {
                        let nfield = self.field(nname);
                        if nfield.field_type.is_list() {
                            return Err(Error::invalid_query(
                                "cannot use IN with two list fields",
                            ));
                        }
                        if !compatible(nfield.field_type, FieldType::Scalar(element)) {
                            return Err(Error::invalid_query(format!(
                                "cannot search {} field {:?} in {} field {:?}",
                                nfield.field_type, nfield.name, hfield.field_type, hfield.name
                            )));
                        }
                    }
                }
                Ok(true)
            }
            Operand::Literal(Literal::List(items)) => {
                let Operand::Field(nname) = needle else {
                    return Err(Error::invalid_query(
                        "left operand of IN must be a field when the right is a list",
                    ));
                };
                let nfield = self.field(nname);
                if nfield.field_type.is_list() {
                    return Err(Error::invalid_query(
                        "cannot test a list field against a list literal",
                    ));
                }
                for item in items {
                    if !item.to_value().fits(nfield.field_type) {
                        return Err(Error::invalid_query(format!(
                            "list element of kind {} does not match {} field {:?}",
                            item.kind_name(),
                            nfield.field_type,
                            nfield.name
                        )));
                    }
                }
                Ok(false)
            }
            Operand::Literal(other) => Err(Error::invalid_query(format!(
                "right operand of IN must be a list or a list field, got a {} literal",
                other.kind_name()
            ))),
        }
    }
}

/// Two field types are comparable when equal or both numeric scalars
fn compatible(a: FieldType, b: FieldType) -> bool {
    if a == b {
        return true;
    }
    let numeric = |t: FieldType| {
        matches!(
            t,
            FieldType::Scalar(ScalarType::Integer) | FieldType::Scalar(ScalarType::Float)
        )
    };
    numeric(a) && numeric(b)
}

/// Emits SQL for a type-checked expression. Field names are already
/// canonical; only digest-derived identifiers and `?` placeholders
/// appear in the output.
struct SqlGenerator<'a> {
    table: &'a str,
    fields: &'a BTreeMap<String, FieldInfo>,
    params: Vec<SqlValue>,
}

impl SqlGenerator<'_> {
    fn emit(&mut self, expr: &Expr) -> Result<String> {
        Ok(match expr {
            Expr::All => "1".to_string(),
            Expr::Not(inner) => format!("NOT ({})", self.emit(inner)?),
            Expr::And(a, b) => format!("({}) AND ({})", self.emit(a)?, self.emit(b)?),
            Expr::Or(a, b) => format!("({}) OR ({})", self.emit(a)?, self.emit(b)?),
            Expr::Compare { op, left, right } => self.emit_compare(*op, left, right)?,
            Expr::In { needle, haystack } => self.emit_in(needle, haystack)?,
        })
    }

    fn field(&self, name: &str) -> &FieldInfo {
        self.fields
            .get(name)
            .expect("checker canonicalized every field name")
    }

    fn bind(&mut self, value: SqlValue) -> &'static str {
        self.params.push(value);
        "?"
    }

    fn encode_literal(&self, lit: &Literal, field_type: FieldType) -> Result<SqlValue> {
        codec::encode(&lit.to_value(), field_type)
            .map_err(|e| Error::invalid_query(e.to_string()))
    }

    fn emit_compare(&mut self, op: CmpOp, left: &Operand, right: &Operand) -> Result<String> {
        match (left, right) {
            (Operand::Field(a), Operand::Field(b)) => {
                let (ca, cb) = (self.field(a).column.clone(), self.field(b).column.clone());
                Ok(match op {
                    CmpOp::Eq => format!("{ca} = {cb}"),
                    CmpOp::Ne => format!("{ca} <> {cb}"),
                    CmpOp::Lt => format!("{ca} < {cb}"),
                    CmpOp::Le => format!("{ca} <= {cb}"),
                    CmpOp::Gt => format!("{ca} > {cb}"),
                    CmpOp::Ge => format!("{ca} >= {cb}"),
                    CmpOp::Like => format!("{ca} LIKE {cb}"),
                    CmpOp::ILike => format!("UPPER({ca}) LIKE UPPER({cb})"),
                })
            }
            (Operand::Field(name), Operand::Literal(lit)) => {
                self.emit_field_op_literal(op, name, lit, false)
            }
            (Operand::Literal(lit), Operand::Field(name)) => {
                self.emit_field_op_literal(op, name, lit, true)
            }
            (Operand::Literal(_), Operand::Literal(_)) => {
                unreachable!("checker rejects literal-only comparisons")
            }
        }
    }

    /// `flipped` means the literal was written on the left
    fn emit_field_op_literal(
        &mut self,
        op: CmpOp,
        name: &str,
        lit: &Literal,
        flipped: bool,
    ) -> Result<String> {
        let field = self.field(name);
        let column = field.column.clone();
        let field_type = field.field_type;

        // NULL comparisons are the IS forms, without parameters
        if matches!(lit, Literal::Null) && matches!(op, CmpOp::Eq | CmpOp::Ne) {
            return Ok(match op {
                CmpOp::Eq => format!("{column} IS NULL"),
                _ => format!("{column} IS NOT NULL"),
            });
        }

        if matches!(op, CmpOp::Like | CmpOp::ILike) {
            let param = self.bind(self.encode_literal(lit, FieldType::STRING)?);
            return Ok(match (op, flipped) {
                (CmpOp::Like, false) => format!("{column} LIKE {param}"),
                (CmpOp::Like, true) => format!("{param} LIKE {column}"),
                (_, false) => format!("UPPER({column}) LIKE UPPER({param})"),
                (_, true) => format!("UPPER({param}) LIKE UPPER({column})"),
            });
        }

        let param = self.bind(self.encode_literal(lit, field_type)?);
        let (lhs, rhs) = if flipped {
            (param.to_string(), column)
        } else {
            (column, param.to_string())
        };
        Ok(match op {
            CmpOp::Eq => format!("{lhs} = {rhs}"),
            CmpOp::Ne => format!("{lhs} <> {rhs}"),
            CmpOp::Lt => format!("{lhs} < {rhs}"),
            CmpOp::Le => format!("{lhs} <= {rhs}"),
            CmpOp::Gt => format!("{lhs} > {rhs}"),
            CmpOp::Ge => format!("{lhs} >= {rhs}"),
            CmpOp::Like | CmpOp::ILike => unreachable!("handled above"),
        })
    }

    fn emit_in(&mut self, needle: &Operand, haystack: &Operand) -> Result<String> {
        match haystack {
            Operand::Field(hname) => {
                let hfield = self.field(hname);
                let column = hfield.column.clone();
                let FieldType::List(element) = hfield.field_type else {
                    unreachable!("checker verified the haystack is a list field");
                };
                let qualified = format!("{}.{column}", self.table);
                match needle {
                    Operand::Literal(lit) => {
                        let param = self.bind(json_member_param(lit, element)?);
                        Ok(format!(
                            "({column} IS NOT NULL AND EXISTS (SELECT 1 FROM json_each({qualified}) \
                             WHERE json_each.value = {param}))"
                        ))
                    }
                    Operand::Field(nname) => {
                        let ncolumn = self.field(nname).column.clone();
                        Ok(format!(
                            "({column} IS NOT NULL AND EXISTS (SELECT 1 FROM json_each({qualified}) \
                             WHERE json_each.value = {}.{ncolumn}))",
                            self.table
                        ))
                    }
                }
            }
            Operand::Literal(Literal::List(items)) => {
                let Operand::Field(nname) = needle else {
                    unreachable!("checker verified the needle is a field");
                };
                let field = self.field(nname);
                let column = field.column.clone();
                let field_type = field.field_type;
                let mut placeholders = Vec::new();
                let mut has_null = false;
                for item in items {
                    if matches!(item, Literal::Null) {
                        has_null = true;
                        continue;
                    }
                    let param = self.bind(self.encode_literal(item, field_type)?);
                    placeholders.push(param);
                }
                Ok(match (placeholders.is_empty(), has_null) {
                    (true, true) => format!("{column} IS NULL"),
                    (true, false) => "0".to_string(),
                    (false, true) => format!(
                        "({column} IS NULL OR {column} IN ({}))",
                        placeholders.join(", ")
                    ),
                    (false, false) => {
                        format!("{column} IN ({})", placeholders.join(", "))
                    }
                })
            }
            Operand::Literal(_) => unreachable!("checker rejects scalar haystacks"),
        }
    }
}

/// Parameter matching what `json_each` yields for a stored element.
/// `json_each.value` surfaces JSON strings as text and JSON numbers
/// natively, so most element kinds reuse the scalar encoding; for
/// `list_json` elements the literal binds by its own natural kind.
fn json_member_param(lit: &Literal, element: ScalarType) -> Result<SqlValue> {
    let value = lit.to_value();
    if element != ScalarType::Json {
        return codec::encode(&value, FieldType::Scalar(element))
            .map_err(|e| Error::invalid_query(e.to_string()));
    }
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::String(s) => SqlValue::Text(s),
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Float(f) => SqlValue::Real(f),
        Value::Boolean(b) => SqlValue::Integer(i64::from(b)),
        other => {
            return Err(Error::invalid_query(format!(
                "cannot search a {} literal in a list_json field",
                other.kind_name()
            )))
        }
    })
}
