//! Owned table representation that flows along graph edges.

use super::value::Cell;
use thiserror::Error;

/// Returned when rows do not match the column count.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("row {row} has {actual} cells but the table has {expected} columns")]
pub struct ShapeError {
    pub row: usize,
    pub expected: usize,
    pub actual: usize,
}

/// A rectangular dataset with named columns and ordered rows.
///
/// - Column names may repeat; lookups by name resolve to the last one, so a
///   column appended downstream shadows an earlier one with the same name.
/// - Every row holds exactly one cell per column, in column order.
///
/// Values are shared between consumers behind an `Arc` and never mutated in
/// place; every transform builds a new table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableValue {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl TableValue {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, ShapeError> {
        let expected = columns.len();
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(ShapeError { row, expected, actual: r.len() });
        }
        Ok(Self { columns, rows })
    }

    /// A table with the given columns and no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn columns(&self) -> &[String] { &self.columns }
    pub fn rows(&self) -> &[Vec<Cell>] { &self.rows }
    pub fn row(&self, index: usize) -> Option<&[Cell]> { self.rows.get(index).map(Vec::as_slice) }
    pub fn row_count(&self) -> usize { self.rows.len() }
    pub fn column_count(&self) -> usize { self.columns.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Position of the last column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().rposition(|c| c == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row)?.get(col)
    }

    /// Cells of the column called `name`, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> TableValue {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Keeps the rows whose flag in `keep` is set. Order is preserved.
    pub fn filter_rows(&self, keep: &[bool]) -> TableValue {
        debug_assert_eq!(keep.len(), self.rows.len(), "mask length must match row count");
        let rows = self
            .rows
            .iter()
            .zip(keep)
            .filter(|(_, &k)| k)
            .map(|(r, _)| r.clone())
            .collect();
        Self { columns: self.columns.clone(), rows }
    }

    /// A copy of this table with one more column at the end.
    pub fn with_column(&self, name: impl Into<String>, cells: Vec<Cell>) -> Result<TableValue, ShapeError> {
        if cells.len() != self.rows.len() {
            return Err(ShapeError { row: cells.len().min(self.rows.len()), expected: self.rows.len(), actual: cells.len() });
        }
        let mut columns = self.columns.clone();
        columns.push(name.into());
        let rows = self
            .rows
            .iter()
            .zip(cells)
            .map(|(row, cell)| {
                let mut row = row.clone();
                row.push(cell);
                row
            })
            .collect();
        Ok(Self { columns, rows })
    }

    /// Rows of `self` followed by rows of `other`, over the union of both
    /// column sets. Cells a table has no column for are `Missing`.
    ///
    /// Repeated names pair up by occurrence: the k-th `x` of `other` lands in
    /// the k-th `x` of `self`, or in a new column when `self` has fewer.
    pub fn concat(&self, other: &TableValue) -> TableValue {
        let mut columns = self.columns.clone();
        let mut mapping = Vec::with_capacity(other.columns.len());
        for (pos, name) in other.columns.iter().enumerate() {
            let occurrence = other.columns[..pos].iter().filter(|c| *c == name).count();
            let existing = self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| *c == name)
                .nth(occurrence)
                .map(|(idx, _)| idx);
            mapping.push(existing.unwrap_or_else(|| {
                columns.push(name.clone());
                columns.len() - 1
            }));
        }

        let width = columns.len();
        let mut rows = Vec::with_capacity(self.rows.len() + other.rows.len());
        for row in &self.rows {
            let mut out = row.clone();
            out.resize(width, Cell::Missing);
            rows.push(out);
        }
        for row in &other.rows {
            let mut out = vec![Cell::Missing; width];
            for (cell, &target) in row.iter().zip(&mapping) {
                out[target] = cell.clone();
            }
            rows.push(out);
        }
        Self { columns, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableValue {
        TableValue::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![1.0.into(), 2.0.into()],
                vec![3.0.into(), 4.0.into()],
                vec![5.0.into(), 6.0.into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let err = TableValue::new(vec!["a".into()], vec![vec![1.0.into()], vec![]]).unwrap_err();
        assert_eq!(err, ShapeError { row: 1, expected: 1, actual: 0 });
    }

    #[test]
    fn test_duplicate_columns_are_kept_and_last_wins() {
        let t = TableValue::new(
            vec!["x".into(), "x".into()],
            vec![vec!["first".into(), "second".into()]],
        )
        .unwrap();
        assert_eq!(t.column_count(), 2);
        assert_eq!(t.column_index("x"), Some(1));
        assert_eq!(t.column("x").unwrap().next(), Some(&Cell::from("second")));
    }

    #[test]
    fn test_with_column_leaves_the_source_untouched() {
        let t = sample();
        let out = t.with_column("Result", vec![3.0.into(), 7.0.into(), 11.0.into()]).unwrap();
        assert_eq!(t.column_count(), 2);
        assert_eq!(out.columns(), &["a", "b", "Result"]);
        assert_eq!(out.row(1).unwrap(), &[Cell::from(3.0), Cell::from(4.0), Cell::from(7.0)]);
        assert!(t.with_column("Short", vec![1.0.into()]).is_err());
    }

    #[test]
    fn test_filter_rows_keeps_order() {
        let out = sample().filter_rows(&[true, false, true]);
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.cell(1, 0), Some(&Cell::from(5.0)));
    }

    #[test]
    fn test_concat_unions_columns() {
        let left = sample().head(1);
        let right = TableValue::new(vec!["b".into(), "c".into()], vec![vec![9.0.into(), "z".into()]]).unwrap();
        let out = left.concat(&right);

        assert_eq!(out.columns(), &["a", "b", "c"]);
        assert_eq!(out.row(0).unwrap(), &[Cell::from(1.0), Cell::from(2.0), Cell::Missing]);
        assert_eq!(out.row(1).unwrap(), &[Cell::Missing, Cell::from(9.0), Cell::from("z")]);
    }

    #[test]
    fn test_concat_pairs_duplicate_columns_by_occurrence() {
        let left = TableValue::empty(vec!["y".into()]);
        let right = TableValue::new(vec!["x".into(), "x".into()], vec![vec![1.0.into(), 2.0.into()]]).unwrap();
        let out = left.concat(&right);
        assert_eq!(out.columns(), &["y", "x", "x"]);
        assert_eq!(out.row(0).unwrap(), &[Cell::Missing, Cell::from(1.0), Cell::from(2.0)]);

        let both = right.concat(&right);
        assert_eq!(both.columns(), &["x", "x"]);
        assert_eq!(both.row(1).unwrap(), &[Cell::from(1.0), Cell::from(2.0)]);

        let wider = TableValue::new(vec!["x".into(), "x".into(), "x".into()], vec![vec![7.0.into(), 8.0.into(), 9.0.into()]])
            .unwrap();
        let out = right.concat(&wider);
        assert_eq!(out.columns(), &["x", "x", "x"]);
        assert_eq!(out.row(0).unwrap(), &[Cell::from(1.0), Cell::from(2.0), Cell::Missing]);
        assert_eq!(out.row(1).unwrap(), &[Cell::from(7.0), Cell::from(8.0), Cell::from(9.0)]);
    }
}
