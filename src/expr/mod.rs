//! A small expression language for filter conditions and formulas.
//!
//! Expressions can only reach the columns of the table they are bound to,
//! literals, operators and a fixed list of functions. There is no escape
//! hatch into a general-purpose interpreter.
//!
//! ```text
//! a > 3 and name != "x"
//! df["a"] + df['b'] * 2
//! round(`unit price` / 3, 2)
//! ```

mod eval;
mod lexer;
mod parser;

use crate::table::{Cell, TableValue};
use parser::Expr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{function}() takes {expected} argument(s), got {actual}")]
    Arity { function: &'static str, expected: &'static str, actual: usize },
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("condition must evaluate to a boolean, got {0}")]
    NotBoolean(&'static str),
}

/// A parsed expression, not yet tied to any table.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr<String>,
}

impl Expression {
    /// Parses `source`. `frame_identifier` is the reserved name that indexes
    /// the incoming table, as in `df["a"]`.
    pub fn parse(source: &str, frame_identifier: &str) -> Result<Self, ExprError> {
        let ast = parser::parse(source, frame_identifier)?;
        Ok(Self { source: source.to_string(), ast })
    }

    pub fn source(&self) -> &str { &self.source }

    /// Column names referenced, in first-use order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.ast.collect_columns(&mut out);
        out
    }

    /// Resolves column references against `table`'s columns.
    pub fn bind(&self, table: &TableValue) -> Result<BoundExpression, ExprError> {
        Ok(BoundExpression { ast: self.ast.bind(table)? })
    }
}

/// An expression whose column references are resolved against one table layout.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundExpression {
    ast: Expr<usize>,
}

impl BoundExpression {
    pub fn eval_row(&self, row: &[Cell]) -> Result<Cell, ExprError> {
        self.ast.eval(row)
    }

    /// Evaluates a row predicate. Missing counts as false; any other
    /// non-boolean result is an error.
    pub fn matches(&self, row: &[Cell]) -> Result<bool, ExprError> {
        match self.ast.eval(row)? {
            Cell::Bool(b) => Ok(b),
            Cell::Missing => Ok(false),
            other => Err(ExprError::NotBoolean(other.type_name())),
        }
    }
}
