//! The scalar stored in each table cell.

use std::fmt;

/// A dynamically typed cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    Number(f64),
    Text(String),
    Bool(bool),
    #[default]
    Missing,
}

impl Cell {
    /// Missing cells and NaN numbers both count as null.
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Number(_) => "number",
            Cell::Text(_) => "text",
            Cell::Bool(_) => "boolean",
            Cell::Missing => "missing",
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Whole numbers print without a fractional part: 3, not 3.0
            Cell::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) if n.is_nan() => f.write_str("NaN"),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Text(s) => f.write_str(s),
            Cell::Bool(true) => f.write_str("True"),
            Cell::Bool(false) => f.write_str("False"),
            Cell::Missing => f.write_str("NaN"),
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self { Cell::Number(n) }
}

impl From<i32> for Cell {
    fn from(n: i32) -> Self { Cell::Number(n.into()) }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self { Cell::Bool(b) }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self { Cell::Text(s.to_string()) }
}

impl From<String> for Cell {
    fn from(s: String) -> Self { Cell::Text(s) }
}
