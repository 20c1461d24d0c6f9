//! Query Compiler
//!
//! Turns a textual filter expression into an executable predicate in
//! two stages: a recursive-descent parser producing an AST, then a
//! compiler pass that resolves every field reference against the
//! Schema Registry, type-checks the expression, and emits either a
//! parameterized SQL WHERE clause or an in-process predicate. Every
//! literal becomes a bound parameter; nothing user-supplied is ever
//! interpolated into the compiled text.
//!
//! The grammar is a disjunction of conjunctions of terms; a term is a
//! parenthesized expression, a negation, a comparison, or a
//! membership test. `ALL` selects every document. Field references
//! that are valid identifiers may be written bare, others use the
//! `{delimited}` form. Keywords and operators are case-insensitive.

mod ast;
mod compiler;
mod eval;
mod lexer;
mod parser;

pub use ast::{CmpOp, Expr, Literal, Operand};
pub use compiler::{BackendCapabilities, CompiledFilter};
pub use parser::parse;

pub(crate) use compiler::compile;
pub(crate) use eval::evaluate;
