use crate::table::TableValue;
use std::fmt::Write;

/// Plain-text preview of the first `max_rows` rows, columns padded to the
/// widest cell. A footer notes how many rows were left out.
pub fn format_table(table: &TableValue, max_rows: usize) -> String {
    let shown = table.head(max_rows);
    let cells: Vec<Vec<String>> = shown.rows().iter().map(|r| r.iter().map(ToString::to_string).collect()).collect();

    let mut widths: Vec<usize> = table.columns().iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    write_row(&mut out, table.columns().iter().map(String::as_str), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(&mut out, rule.iter().map(String::as_str), &widths);
    for row in &cells {
        write_row(&mut out, row.iter().map(String::as_str), &widths);
    }

    let hidden = table.row_count() - shown.row_count();
    if hidden > 0 {
        let _ = writeln!(out, "... {} more row(s)", hidden);
    }
    let _ = writeln!(out, "[{} rows x {} columns]", table.row_count(), table.column_count());
    out
}

fn write_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let line: Vec<String> = cells.zip(widths).map(|(c, w)| format!("{:<w$}", c, w = *w)).collect();
    let _ = writeln!(out, "{}", line.join(" | ").trim_end());
}
