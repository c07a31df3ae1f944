//! Human-readable renderings for the UI layer and logs.
pub mod table;
pub mod trace;

pub use table::format_table;
pub use trace::format_trace;
