//! Report sinks: where audit events and summaries go.
//!
//! The reconciler never touches files directly. It emits categorized text
//! payloads to a [`ReportSink`]; [`FileReportSink`] lays them out in a run
//! directory and [`MemorySink`] keeps them for inspection.

mod file;
mod memory;
mod summary;

use std::fmt;

use serde::Serialize;

use crate::error::Result;

pub use file::FileReportSink;
pub use memory::MemorySink;
pub use summary::{pair_summary, pattern_summary, summary_header, total_summary, with_percent};

/// What a report payload is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    /// Mismatch on the field with this index.
    FieldError(usize),
    Lost,
    Extra,
    Defective,
    PairSummary,
    TotalSummary,
    PatternSummary,
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportCategory::FieldError(index) => write!(f, "field error {index}"),
            ReportCategory::Lost => write!(f, "lost"),
            ReportCategory::Extra => write!(f, "extra"),
            ReportCategory::Defective => write!(f, "defective"),
            ReportCategory::PairSummary => write!(f, "pair summary"),
            ReportCategory::TotalSummary => write!(f, "total summary"),
            ReportCategory::PatternSummary => write!(f, "pattern summary"),
        }
    }
}

/// Destination for report payloads. Implementations serialize writes
/// internally, so a sink can be shared by reference.
pub trait ReportSink: Send + Sync {
    fn emit(&self, category: ReportCategory, payload: &str) -> Result<()>;

    /// Persist anything buffered.
    fn flush(&self) -> Result<()>;
}
