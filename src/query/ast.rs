//! Filter expression AST

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::types::Value;

/// A literal appearing in a filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    List(Vec<Literal>),
}

impl Literal {
    /// Kind name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Boolean(_) => "boolean",
            Literal::Integer(_) => "int",
            Literal::Float(_) => "float",
            Literal::Str(_) => "string",
            Literal::Date(_) => "date",
            Literal::DateTime(_) => "datetime",
            Literal::Time(_) => "time",
            Literal::List(_) => "list",
        }
    }

    /// Converts to a document value
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::String(s.clone()),
            Literal::Date(d) => Value::Date(*d),
            Literal::DateTime(d) => Value::DateTime(*d),
            Literal::Time(t) => Value::Time(*t),
            Literal::List(items) => Value::List(items.iter().map(Literal::to_value).collect()),
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    ILike,
}

impl CmpOp {
    /// Whether this operator requires an orderable type
    pub fn is_ordering(&self) -> bool {
        matches!(self, CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Like => "like",
            CmpOp::ILike => "ilike",
        }
    }
}

/// One side of a comparison or membership test
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A field reference, bare or `{delimited}`
    Field(String),
    Literal(Literal),
}

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Matches every document
    All,
    Compare {
        op: CmpOp,
        left: Operand,
        right: Operand,
    },
    /// `needle IN haystack`
    In {
        needle: Operand,
        haystack: Operand,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Visits every field reference in the expression
    pub fn for_each_field<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        let mut operand = |op: &'a Operand| {
            if let Operand::Field(name) = op {
                f(name);
            }
        };
        match self {
            Expr::All => {}
            Expr::Compare { left, right, .. } => {
                operand(left);
                operand(right);
            }
            Expr::In { needle, haystack } => {
                operand(needle);
                operand(haystack);
            }
            Expr::Not(inner) => inner.for_each_field(f),
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.for_each_field(f);
                b.for_each_field(f);
            }
        }
    }
}
