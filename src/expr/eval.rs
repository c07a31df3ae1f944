//! Binds a parsed expression to a table's columns and evaluates it per row.

use super::parser::{BinaryOp, Expr, Function, UnaryOp};
use super::ExprError;
use crate::table::{Cell, TableValue};
use std::cmp::Ordering;

impl Expr<String> {
    /// Resolves every column name to an index. Fails on the first unknown name,
    /// before any row is looked at.
    pub(crate) fn bind(&self, table: &TableValue) -> Result<Expr<usize>, ExprError> {
        Ok(match self {
            Expr::Literal(cell) => Expr::Literal(cell.clone()),
            Expr::Column(name) => {
                Expr::Column(table.column_index(name).ok_or_else(|| ExprError::UnknownColumn(name.clone()))?)
            }
            Expr::Unary { op, operand } => Expr::Unary { op: *op, operand: Box::new(operand.bind(table)?) },
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(lhs.bind(table)?),
                rhs: Box::new(rhs.bind(table)?),
            },
            Expr::Call { function, args } => Expr::Call {
                function: *function,
                args: args.iter().map(|a| a.bind(table)).collect::<Result<_, _>>()?,
            },
        })
    }

    pub(crate) fn collect_columns<'e>(&'e self, out: &mut Vec<&'e str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_columns(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_columns(out)),
        }
    }
}

impl Expr<usize> {
    pub(crate) fn eval(&self, row: &[Cell]) -> Result<Cell, ExprError> {
        match self {
            Expr::Literal(cell) => Ok(cell.clone()),
            // Binding guarantees the index is in range for rows of the bound table.
            Expr::Column(idx) => Ok(row.get(*idx).cloned().unwrap_or(Cell::Missing)),
            Expr::Unary { op, operand } => unary(*op, operand.eval(row)?),
            Expr::Binary { op: BinaryOp::And, lhs, rhs } => {
                if !truthy(&lhs.eval(row)?, BinaryOp::And)? {
                    return Ok(Cell::Bool(false));
                }
                Ok(Cell::Bool(truthy(&rhs.eval(row)?, BinaryOp::And)?))
            }
            Expr::Binary { op: BinaryOp::Or, lhs, rhs } => {
                if truthy(&lhs.eval(row)?, BinaryOp::Or)? {
                    return Ok(Cell::Bool(true));
                }
                Ok(Cell::Bool(truthy(&rhs.eval(row)?, BinaryOp::Or)?))
            }
            Expr::Binary { op, lhs, rhs } => binary(*op, lhs.eval(row)?, rhs.eval(row)?),
            Expr::Call { function, args } => {
                let values = args.iter().map(|a| a.eval(row)).collect::<Result<Vec<_>, _>>()?;
                call(*function, &values)
            }
        }
    }
}

/// Boolean operands: a missing value counts as false.
fn truthy(value: &Cell, op: BinaryOp) -> Result<bool, ExprError> {
    match value {
        Cell::Bool(b) => Ok(*b),
        Cell::Missing => Ok(false),
        other => Err(ExprError::Type(format!("'{}' needs boolean operands, found {}", op.symbol(), other.type_name()))),
    }
}

fn unary(op: UnaryOp, value: Cell) -> Result<Cell, ExprError> {
    match (op, value) {
        (UnaryOp::Neg, Cell::Number(n)) => Ok(Cell::Number(-n)),
        (UnaryOp::Not, Cell::Bool(b)) => Ok(Cell::Bool(!b)),
        (_, Cell::Missing) => Ok(Cell::Missing),
        (UnaryOp::Neg, other) => Err(ExprError::Type(format!("cannot negate {}", other.type_name()))),
        (UnaryOp::Not, other) => Err(ExprError::Type(format!("'not' needs a boolean, found {}", other.type_name()))),
    }
}

fn binary(op: BinaryOp, lhs: Cell, rhs: Cell) -> Result<Cell, ExprError> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem | BinaryOp::Pow => {
            arithmetic(op, lhs, rhs)
        }
        BinaryOp::Eq => Ok(Cell::Bool(equals(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Cell::Bool(!equals(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let Some(ord) = order(op, &lhs, &rhs)? else {
                return Ok(Cell::Bool(false));
            };
            Ok(Cell::Bool(match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Cell::Bool(match op {
            BinaryOp::And => truthy(&lhs, op)? && truthy(&rhs, op)?,
            _ => truthy(&lhs, op)? || truthy(&rhs, op)?,
        })),
    }
}

fn arithmetic(op: BinaryOp, lhs: Cell, rhs: Cell) -> Result<Cell, ExprError> {
    match (lhs, rhs) {
        (Cell::Number(a), Cell::Number(b)) => {
            let n = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(ExprError::DivisionByZero),
                BinaryOp::Div => a / b,
                // Floored modulo, so the result takes the divisor's sign.
                BinaryOp::Rem => a - b * (a / b).floor(),
                _ => a.powf(b),
            };
            Ok(Cell::Number(n))
        }
        (Cell::Text(a), Cell::Text(b)) if op == BinaryOp::Add => Ok(Cell::Text(a + &b)),
        (Cell::Missing, Cell::Number(_) | Cell::Missing) | (Cell::Number(_), Cell::Missing) => Ok(Cell::Missing),
        (Cell::Missing, Cell::Text(_)) | (Cell::Text(_), Cell::Missing) if op == BinaryOp::Add => Ok(Cell::Missing),
        (a, b) => Err(ExprError::Type(format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Missing never equals anything; values of different types are unequal.
fn equals(lhs: &Cell, rhs: &Cell) -> bool {
    match (lhs, rhs) {
        (Cell::Number(a), Cell::Number(b)) => a == b,
        (Cell::Text(a), Cell::Text(b)) => a == b,
        (Cell::Bool(a), Cell::Bool(b)) => a == b,
        _ => false,
    }
}

/// `None` when either side is missing (the comparison is then false).
fn order(op: BinaryOp, lhs: &Cell, rhs: &Cell) -> Result<Option<Ordering>, ExprError> {
    match (lhs, rhs) {
        (Cell::Missing, _) | (_, Cell::Missing) => Ok(None),
        (Cell::Number(a), Cell::Number(b)) => Ok(a.partial_cmp(b)),
        (Cell::Text(a), Cell::Text(b)) => Ok(Some(a.cmp(b))),
        (Cell::Bool(a), Cell::Bool(b)) => Ok(Some(a.cmp(b))),
        (a, b) => Err(ExprError::Type(format!(
            "cannot compare {} and {} with '{}'",
            a.type_name(),
            b.type_name(),
            op.symbol()
        ))),
    }
}

fn call(function: Function, args: &[Cell]) -> Result<Cell, ExprError> {
    let type_error = |found: &Cell| {
        ExprError::Type(format!("{}() does not accept {}", function.name(), found.type_name()))
    };
    let numeric = |f: fn(f64) -> f64| -> Result<Cell, ExprError> {
        match &args[0] {
            Cell::Number(n) => Ok(Cell::Number(f(*n))),
            Cell::Missing => Ok(Cell::Missing),
            other => Err(type_error(other)),
        }
    };
    let textual = |f: fn(&str) -> Cell| -> Result<Cell, ExprError> {
        match &args[0] {
            Cell::Text(s) => Ok(f(s)),
            Cell::Missing => Ok(Cell::Missing),
            other => Err(type_error(other)),
        }
    };

    match function {
        Function::Abs => numeric(f64::abs),
        Function::Sqrt => numeric(f64::sqrt),
        Function::Floor => numeric(f64::floor),
        Function::Ceil => numeric(f64::ceil),
        Function::Round => {
            let digits = match args.get(1) {
                None => 0,
                Some(Cell::Number(d)) if d.fract() == 0.0 => *d as i32,
                Some(other) => {
                    return Err(ExprError::Type(format!("round() digits must be a whole number, found {}", other.type_name())))
                }
            };
            match &args[0] {
                Cell::Number(n) => {
                    let scale = 10f64.powi(digits);
                    Ok(Cell::Number((n * scale).round() / scale))
                }
                Cell::Missing => Ok(Cell::Missing),
                other => Err(type_error(other)),
            }
        }
        Function::Min | Function::Max => {
            let mut best: Option<f64> = None;
            for arg in args {
                match arg {
                    Cell::Number(n) => {
                        best = Some(match (best, function) {
                            (None, _) => *n,
                            (Some(b), Function::Min) => b.min(*n),
                            (Some(b), _) => b.max(*n),
                        })
                    }
                    Cell::Missing => return Ok(Cell::Missing),
                    other => return Err(type_error(other)),
                }
            }
            Ok(best.map_or(Cell::Missing, Cell::Number))
        }
        Function::Len => textual(|s| Cell::Number(s.chars().count() as f64)),
        Function::Lower => textual(|s| Cell::Text(s.to_lowercase())),
        Function::Upper => textual(|s| Cell::Text(s.to_uppercase())),
        Function::IsNull => Ok(Cell::Bool(args[0].is_null())),
        Function::NotNull => Ok(Cell::Bool(!args[0].is_null())),
    }
}
