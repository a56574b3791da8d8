//! Input discovery and legacy/new file pairing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{FidelityError, Result};

/// A legacy file and the new-system file sharing its canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePair {
    /// Canonical name both files reduce to.
    pub name: String,
    pub legacy: PathBuf,
    pub new: PathBuf,
}

impl FilePair {
    /// `"<legacy file> / <new file>"`, used in reports and progress.
    pub fn label(&self) -> String {
        format!("{} / {}", file_name(&self.legacy), file_name(&self.new))
    }
}

/// Result of pairing two file lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Pairing {
    /// Pairs sorted by canonical name.
    pub pairs: Vec<FilePair>,
    /// Legacy files without a counterpart (lost files).
    pub legacy_only: Vec<PathBuf>,
    /// New-system files without a counterpart (extra files).
    pub new_only: Vec<PathBuf>,
}

impl Pairing {
    pub fn is_balanced(&self) -> bool {
        self.legacy_only.is_empty() && self.new_only.is_empty()
    }
}

/// Pairs files by the canonical name a rename pattern extracts.
#[derive(Debug, Clone)]
pub struct FilePairer {
    pattern: Regex,
}

impl FilePairer {
    /// `pattern` must have exactly one capture group.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)?;
        if pattern.captures_len() != 2 {
            return Err(FidelityError::Config(format!(
                "rename pattern '{pattern}' must have exactly one capture group"
            )));
        }
        Ok(Self { pattern })
    }

    /// Concatenation of every capture over the file name. `None` when the
    /// name does not match, or the captures are empty.
    pub fn canonical_name(&self, path: &Path) -> Option<String> {
        let name = file_name(path);
        let canonical: String = self
            .pattern
            .captures_iter(&name)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect();
        (!canonical.is_empty()).then_some(canonical)
    }

    pub fn pair(&self, legacy: &[PathBuf], new: &[PathBuf]) -> Pairing {
        let mut pairing = Pairing::default();

        let (legacy_by_name, legacy_unmatched) = self.index("legacy", legacy);
        let (new_by_name, new_unmatched) = self.index("new", new);
        pairing.legacy_only = legacy_unmatched;
        pairing.new_only = new_unmatched;

        for (name, legacy_path) in &legacy_by_name {
            match new_by_name.get(name) {
                Some(new_path) => pairing.pairs.push(FilePair {
                    name: name.clone(),
                    legacy: legacy_path.clone(),
                    new: new_path.clone(),
                }),
                None => pairing.legacy_only.push(legacy_path.clone()),
            }
        }
        for (name, new_path) in &new_by_name {
            if !legacy_by_name.contains_key(name) {
                pairing.new_only.push(new_path.clone());
            }
        }

        pairing.legacy_only.sort();
        pairing.new_only.sort();

        if !pairing.legacy_only.is_empty() {
            warn!(files = ?pairing.legacy_only, "files only in legacy system (lost)");
        }
        if !pairing.new_only.is_empty() {
            warn!(files = ?pairing.new_only, "files only in new system (extra)");
        }
        info!(pairs = pairing.pairs.len(), "file pairs found");

        pairing
    }

    /// Canonical name → path for one side, plus the files that cannot pair.
    fn index(&self, side: &str, files: &[PathBuf]) -> (BTreeMap<String, PathBuf>, Vec<PathBuf>) {
        let mut sorted = files.to_vec();
        sorted.sort();

        let mut by_name = BTreeMap::new();
        let mut unmatched = Vec::new();
        for path in sorted {
            let Some(name) = self.canonical_name(&path) else {
                warn!(side, file = %path.display(), "file name does not match rename pattern");
                unmatched.push(path);
                continue;
            };
            if by_name.contains_key(&name) {
                warn!(side, file = %path.display(), canonical = %name, "duplicate canonical name");
                unmatched.push(path);
                continue;
            }
            by_name.insert(name, path);
        }
        (by_name, unmatched)
    }
}

/// Files to reconcile on one side: `path` itself when it is a file,
/// otherwise the files in `path` matching `mask`, sorted.
pub fn list_files(path: impl AsRef<Path>, mask: &str) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let no_files = || FidelityError::NoInputFiles {
        path: path.to_path_buf(),
        mask: mask.to_string(),
    };

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(no_files());
    }

    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&path.to_string_lossy()),
        mask
    );
    let mut files: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(no_files());
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
