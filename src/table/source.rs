//! Reads delimited text files into a [`TableValue`].
//!
//! The first record is the header row. Cell texts are typed on the way in:
//! configured missing markers become `Missing`, numerals become `Number`,
//! `True`/`False` become `Bool`, everything else stays `Text`.

use super::frame::TableValue;
use super::value::Cell;
use crate::config::CsvOptions;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} has no header row", path.display())]
    MissingHeader { path: PathBuf },
    #[error("{} is not valid UTF-8 (line {line})", path.display())]
    Encoding { path: PathBuf, line: u64 },
    #[error("{} line {line}: expected {expected} fields, found {actual}", path.display())]
    RaggedRow { path: PathBuf, line: u64, expected: u64, actual: u64 },
    #[error("cannot parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Reads and types the file at `path`.
pub fn read_csv(path: impl AsRef<Path>, options: &CsvOptions) -> Result<TableValue, SourceError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| SourceError::Io { path: path.to_path_buf(), source })?;
    parse_csv(path, &data, options)
}

/// Parses in-memory file contents. `origin` only labels errors.
pub fn parse_csv(origin: &Path, data: &[u8], options: &CsvOptions) -> Result<TableValue, SourceError> {
    let delimiter = match options.delimiter {
        Some(d) => u8::try_from(d).ok().filter(u8::is_ascii).ok_or_else(|| SourceError::Parse {
            path: origin.to_path_buf(),
            message: format!("unsupported delimiter {d:?}"),
        })?,
        None => sniff_delimiter(data),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .trim(if options.trim { csv::Trim::All } else { csv::Trim::None })
        .from_reader(data);

    let headers = reader.headers().map_err(|e| classify(origin, e))?.clone();
    if headers.is_empty() {
        return Err(SourceError::MissingHeader { path: origin.to_path_buf() });
    }
    let columns: Vec<String> = headers.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| classify(origin, e))?;
        rows.push(record.iter().map(|field| type_cell(field, options)).collect());
    }

    debug!(path = %origin.display(), rows = rows.len(), columns = columns.len(), delimiter = %(delimiter as char), "csv parsed");
    TableValue::new(columns, rows).map_err(|e| SourceError::Parse { path: origin.to_path_buf(), message: e.to_string() })
}

fn classify(path: &Path, err: csv::Error) -> SourceError {
    let path = path.to_path_buf();
    match err.kind() {
        csv::ErrorKind::Utf8 { pos, .. } => SourceError::Encoding {
            path,
            line: pos.as_ref().map_or(0, |p| p.line()),
        },
        csv::ErrorKind::UnequalLengths { pos, expected_len, len } => SourceError::RaggedRow {
            path,
            line: pos.as_ref().map_or(0, |p| p.line()),
            expected: *expected_len,
            actual: *len,
        },
        _ => SourceError::Parse { path, message: err.to_string() },
    }
}

/// Picks the candidate separator that occurs most often on the header line,
/// ignoring quoted text. Falls back to a comma on a tie or when none occur.
fn sniff_delimiter(data: &[u8]) -> u8 {
    let header = data.split(|&b| b == b'\n').next().unwrap_or_default();
    let mut counts = [0usize; DELIMITER_CANDIDATES.len()];
    let mut quoted = false;
    for &b in header {
        if b == b'"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(i) = DELIMITER_CANDIDATES.iter().position(|&c| c == b) {
                counts[i] += 1;
            }
        }
    }

    let best = counts.iter().copied().max().unwrap_or(0);
    let winners: Vec<usize> = (0..counts.len()).filter(|&i| counts[i] == best).collect();
    match winners.as_slice() {
        [only] if best > 0 => DELIMITER_CANDIDATES[*only],
        _ => b',',
    }
}

fn type_cell(field: &str, options: &CsvOptions) -> Cell {
    if options.missing_values.iter().any(|m| m == field) {
        return Cell::Missing;
    }
    if let Ok(n) = field.parse::<f64>() {
        return Cell::Number(n);
    }
    match field {
        "True" | "true" | "TRUE" => Cell::Bool(true),
        "False" | "false" | "FALSE" => Cell::Bool(false),
        _ => Cell::Text(field.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn parse(text: &str) -> Result<TableValue, SourceError> {
        parse_csv(Path::new("test.csv"), text.as_bytes(), &CsvOptions::default())
    }

    #[test]
    fn test_reads_header_and_typed_rows() {
        let t = parse("a,b,name\n1,2,x\n3,4.5,y\n").unwrap();
        assert_eq!(t.columns(), &["a", "b", "name"]);
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.row(1).unwrap(), &[Cell::from(3.0), Cell::from(4.5), Cell::from("y")]);
    }

    #[rstest]
    #[case("a;b\n1;2\n", b';')]
    #[case("a\tb\n1\t2\n", b'\t')]
    #[case("a|b\n1|2\n", b'|')]
    #[case("\"x,y\";b\n1;2\n", b';')]
    #[case("a,b;c\n1,2;3\n", b',')]
    #[case("single\n1\n", b',')]
    fn test_sniff_delimiter(#[case] text: &str, #[case] expected: u8) {
        assert_eq!(sniff_delimiter(text.as_bytes()), expected);
    }

    #[test]
    fn test_missing_markers_and_booleans() {
        let t = parse("a,b,c\nNA,,True\n").unwrap();
        assert_eq!(t.row(0).unwrap(), &[Cell::Missing, Cell::Missing, Cell::Bool(true)]);
    }

    #[test]
    fn test_duplicate_headers_survive() {
        let t = parse("a,a\n1,2\n").unwrap();
        assert_eq!(t.columns(), &["a", "a"]);
    }

    #[test]
    fn test_quoted_fields_keep_delimiters() {
        let t = parse("name,city\n\"Doe, Jane\",Oslo\n").unwrap();
        assert_eq!(t.cell(0, 0), Some(&Cell::from("Doe, Jane")));
    }

    #[test]
    fn test_ragged_row_is_reported_with_its_line() {
        let err = parse("a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, SourceError::RaggedRow { line: 3, expected: 2, actual: 1, .. }), "{err:?}");
    }

    #[test]
    fn test_invalid_utf8_is_an_encoding_error() {
        let err = parse_csv(Path::new("bad.csv"), b"a,b\n1,\xff\xfe\n", &CsvOptions::default()).unwrap_err();
        assert!(matches!(err, SourceError::Encoding { .. }), "{err:?}");
    }

    #[test]
    fn test_empty_file_has_no_header() {
        assert!(matches!(parse("").unwrap_err(), SourceError::MissingHeader { .. }));
    }

    #[test]
    fn test_read_from_disk_and_missing_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "a,b\n1,2\n").unwrap();
        assert_eq!(read_csv(file.path(), &CsvOptions::default()).unwrap().row_count(), 1);

        let err = read_csv(file.path().with_extension("gone"), &CsvOptions::default()).unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[test]
    fn test_explicit_delimiter_wins() {
        let options = CsvOptions { delimiter: Some(';'), ..CsvOptions::default() };
        let t = parse_csv(Path::new("x.csv"), b"a,b;c\n1,2;3\n", &options).unwrap();
        assert_eq!(t.columns(), &["a,b", "c"]);
    }

    #[rstest]
    #[case('é')]
    #[case('\u{2016}')]
    fn test_non_ascii_delimiter_is_a_parse_error(#[case] delimiter: char) {
        let options = CsvOptions { delimiter: Some(delimiter), ..CsvOptions::default() };
        let err = parse_csv(Path::new("x.csv"), "a\u{2016}b\n1\u{2016}2\n".as_bytes(), &options).unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }), "{err}");
    }
}
