//! Error types for the fidelity library.
//!
//! Only conditions that stop a run are errors. Per-record anomalies (undecodable
//! lines, defective records, field mismatches) are counted in [`crate::stats`]
//! and never surface here.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fidelity operations.
#[derive(Debug, Error)]
pub enum FidelityError {
    /// Error reading or writing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Inconsistent or invalid configuration, detected before any file is read.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An input location yielded no files.
    #[error("No files found at '{path}' with mask '{mask}'")]
    NoInputFiles { path: PathBuf, mask: String },

    /// Too few well-formed legacy records to discover keys from.
    #[error("Insufficient sample for key discovery: {found} records, at least {required} required")]
    InsufficientSample { found: usize, required: usize },

    /// No prefix of the cardinality-ordered fields identifies every sampled record.
    #[error("Key discovery failed: no field combination is unique across {sample_size} sampled records")]
    KeyDiscoveryFailed { sample_size: usize },

    /// Error parsing a TOML document.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Error writing a TOML document.
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Regex compilation error.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Invalid file mask.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

impl FidelityError {
    /// Wrap an IO error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FidelityError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for fidelity operations.
pub type Result<T> = std::result::Result<T, FidelityError>;
