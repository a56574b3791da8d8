//! Record keys: manual field lists, line ordinals, and automatic discovery.
//!
//! Discovery is a greedy heuristic. Fields are ranked by how many distinct
//! values they take in a legacy sample (ties go to the lower index), and the
//! shortest prefix of that ranking whose concatenated values are unique across
//! the sample becomes the key. It is not a search for the smallest unique
//! subset; the ranking is fixed so that persisted keys stay stable between
//! runs over the same data.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FidelityError, Result};
use crate::input::{DatasetLoader, Record};
use crate::stats::Side;

/// Fewest sampled records discovery will run on.
pub const MIN_SAMPLE_SIZE: usize = 10;

// =============================================================================
// KEY STRATEGY
// =============================================================================

/// How a record's key is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Concatenated values of these field indices, in order.
    Fields(Vec<usize>),
    /// The record's line number. Used when no key fields are known.
    Ordinal,
}

impl KeyStrategy {
    /// Key on `indices`, falling back to [`KeyStrategy::Ordinal`] when empty.
    pub fn fields(indices: Vec<usize>) -> Self {
        if indices.is_empty() {
            KeyStrategy::Ordinal
        } else {
            KeyStrategy::Fields(indices)
        }
    }

    pub fn indices(&self) -> &[usize] {
        match self {
            KeyStrategy::Fields(indices) => indices,
            KeyStrategy::Ordinal => &[],
        }
    }

    /// `None` when the record lacks one of the key fields.
    pub fn key_for(&self, record: &Record) -> Option<String> {
        match self {
            KeyStrategy::Fields(indices) if !indices.is_empty() => {
                compose_key(record.fields.as_slice(), indices)
            }
            _ => Some(record.line.to_string()),
        }
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStrategy::Fields(indices) => write!(f, "fields {indices:?}"),
            KeyStrategy::Ordinal => write!(f, "line ordinal"),
        }
    }
}

/// Concatenate the values at `indices` without a separator.
pub fn compose_key<S: AsRef<str>>(fields: &[S], indices: &[usize]) -> Option<String> {
    let mut key = String::new();
    for &i in indices {
        key.push_str(fields.get(i)?.as_ref());
    }
    Some(key)
}

// =============================================================================
// DISCOVERY
// =============================================================================

/// Derives a key from a sample of well-formed records.
#[derive(Debug, Clone)]
pub struct KeyDiscoverer {
    excluded: BTreeSet<usize>,
    min_sample: usize,
}

impl KeyDiscoverer {
    /// `excluded` indices are never part of a discovered key.
    pub fn new(excluded: impl IntoIterator<Item = usize>) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
            min_sample: MIN_SAMPLE_SIZE,
        }
    }

    pub fn with_min_sample(mut self, min_sample: usize) -> Self {
        self.min_sample = min_sample;
        self
    }

    /// Distinct value count per field index.
    pub fn cardinalities<R: AsRef<[String]>>(sample: &[R]) -> Vec<usize> {
        let width = sample.iter().map(|r| r.as_ref().len()).min().unwrap_or(0);
        (0..width)
            .map(|i| {
                sample
                    .iter()
                    .map(|r| r.as_ref()[i].as_str())
                    .collect::<HashSet<_>>()
                    .len()
            })
            .collect()
    }

    /// Candidate indices by descending cardinality, ascending index on ties.
    /// Constant fields and excluded indices are dropped.
    pub fn priority<R: AsRef<[String]>>(&self, sample: &[R]) -> Vec<usize> {
        let cardinality = Self::cardinalities(sample);
        let mut candidates: Vec<usize> = (0..cardinality.len())
            .filter(|&i| cardinality[i] > 1 && !self.excluded.contains(&i))
            .collect();
        candidates.sort_by(|&a, &b| cardinality[b].cmp(&cardinality[a]).then(a.cmp(&b)));
        candidates
    }

    /// Shortest unique prefix of the priority list.
    pub fn discover<R: AsRef<[String]>>(&self, sample: &[R]) -> Result<Vec<usize>> {
        if sample.len() < self.min_sample {
            return Err(FidelityError::InsufficientSample {
                found: sample.len(),
                required: self.min_sample,
            });
        }

        let priority = self.priority(sample);
        debug!(?priority, "key candidates by cardinality");

        for len in 1..=priority.len() {
            let prefix = &priority[..len];
            if is_unique(sample, prefix) {
                info!(keys = ?prefix, sample = sample.len(), "discovered key fields");
                return Ok(prefix.to_vec());
            }
        }

        Err(FidelityError::KeyDiscoveryFailed {
            sample_size: sample.len(),
        })
    }
}

fn is_unique<R: AsRef<[String]>>(sample: &[R], indices: &[usize]) -> bool {
    let mut seen = HashSet::with_capacity(sample.len());
    sample.iter().all(|record| match compose_key(record.as_ref(), indices) {
        Some(key) => seen.insert(key),
        None => false,
    })
}

/// Up to `limit` well-formed records from the start of `files`, in order.
pub fn sample_records(
    loader: &DatasetLoader,
    files: &[PathBuf],
    number_of_fields: usize,
    limit: usize,
) -> Result<Vec<Record>> {
    let mut sample = Vec::with_capacity(limit.min(4096));

    for file in files {
        if sample.len() >= limit {
            break;
        }
        let remaining = limit - sample.len();
        let dataset = loader.load(file, &KeyStrategy::Ordinal, Side::Legacy)?;
        sample.extend(
            dataset
                .records
                .into_values()
                .filter(|r| r.is_well_formed(number_of_fields))
                .take(remaining),
        );
    }

    info!(records = sample.len(), "collected key discovery sample");
    Ok(sample)
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct KeysFile {
    auto_generated_keys: PersistedKeys,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedKeys {
    keys: Vec<usize>,
}

/// Write discovered keys so later runs can reuse them.
pub fn save_keys(path: impl AsRef<Path>, keys: &[usize]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| FidelityError::io(parent, e))?;
        }
    }

    let document = toml::to_string(&KeysFile {
        auto_generated_keys: PersistedKeys {
            keys: keys.to_vec(),
        },
    })?;
    fs::write(path, document).map_err(|e| FidelityError::io(path, e))
}

/// Read keys written by [`save_keys`].
pub fn load_keys(path: impl AsRef<Path>) -> Result<Vec<usize>> {
    let path = path.as_ref();
    let document = fs::read_to_string(path).map_err(|e| FidelityError::io(path, e))?;
    let file: KeysFile = toml::from_str(&document)?;
    Ok(file.auto_generated_keys.keys)
}
