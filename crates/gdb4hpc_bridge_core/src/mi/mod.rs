//! gdb4hpc machine-interface records and their parser.

pub mod escape;
pub mod parser;
pub mod record;

pub use escape::{to_display, unescape};
pub use parser::{parse_line, parse_record, ParseError, LOG_MARKER};
pub use record::{Fields, Record, RecordKind, Value};
