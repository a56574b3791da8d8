//! Record comparison and diff patterns.

mod field;
mod pattern;

pub use field::{Classification, Comparison, FieldComparator, FieldError};
pub use pattern::{deep_diff, OpTag, Opcode, SequenceMatcher};
