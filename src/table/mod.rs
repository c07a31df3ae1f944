//! Tabular values flowing along edges, and the file reader that creates them.
pub mod frame;
pub mod source;
pub mod value;

pub use frame::{ShapeError, TableValue};
pub use source::{parse_csv, read_csv, SourceError};
pub use value::Cell;
