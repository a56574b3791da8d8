//! Fidelity: record-level reconciliation of legacy and new system exports.
//!
//! During a migration both systems produce the same flat files. Fidelity
//! pairs those files by name, keys every record, and reports which records
//! were lost, which appeared, and how matched records differ field by field.
//!
//! # Core Principles
//!
//! - **Shape over value**: differences are summarized as diff patterns, so
//!   systematic conversion errors group together
//! - **Never stop on bad data**: malformed lines are counted and reported,
//!   not fatal
//! - **Interruptible**: a cancelled run still writes its summaries
//!
//! # Example
//!
//! ```no_run
//! use fidelity::{CancelToken, Fidelity, MemorySink, ReconConfig};
//!
//! let config = ReconConfig::load("recon.toml").unwrap();
//! let fidelity = Fidelity::new(config).unwrap();
//! let sink = MemorySink::new();
//! let outcome = fidelity.run(&sink, CancelToken::new(), None).unwrap();
//!
//! println!("Matched: {}", outcome.snapshot.run.matched);
//! println!("Broken: {}", outcome.snapshot.run.broken_records);
//! ```

pub mod compare;
pub mod config;
pub mod error;
pub mod inference;
pub mod input;
pub mod report;
pub mod stats;

mod fidelity;
mod reconciler;

pub use crate::fidelity::Fidelity;
pub use compare::{deep_diff, Classification, Comparison, FieldComparator, FieldError};
pub use config::{KeyMode, ReconConfig};
pub use error::{FidelityError, Result};
pub use inference::{KeyDiscoverer, KeyStrategy};
pub use input::{Dataset, DatasetLoader, FilePair, FilePairer, Pairing, Record, RecordLayout};
pub use reconciler::{CancelToken, Reconciler, RunOutcome, RunStatus, SNAPSHOT_INTERVAL};
pub use report::{FileReportSink, MemorySink, ReportCategory, ReportSink};
pub use stats::{Counters, Side, Stage, Statistics, StatsSnapshot};
