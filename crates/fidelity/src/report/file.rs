use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{FidelityError, Result};

use super::{ReportCategory, ReportSink};

#[derive(Debug, Default)]
struct Buffer {
    pending: BTreeMap<ReportCategory, String>,
    count: usize,
}

/// Appends reports to one file per category inside a run directory.
///
/// Payloads are buffered and written once more than `threshold` events are
/// pending, or on an explicit [`flush`](ReportSink::flush).
#[derive(Debug)]
pub struct FileReportSink {
    dir: PathBuf,
    field_names: Vec<String>,
    threshold: usize,
    buffer: Mutex<Buffer>,
}

impl FileReportSink {
    /// `dir` must already exist. `field_names[i]` names the report of field `i`.
    pub fn new(dir: impl Into<PathBuf>, field_names: Vec<String>, threshold: usize) -> Self {
        Self {
            dir: dir.into(),
            field_names,
            threshold,
            buffer: Mutex::new(Buffer::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a category is written to.
    pub fn path_for(&self, category: ReportCategory) -> PathBuf {
        let name = match category {
            ReportCategory::FieldError(index) => {
                let field = self
                    .field_names
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| format!("field_{index}"));
                format!("{index:03}_{field}.rep")
            }
            ReportCategory::Lost => "!!_losts.rep".to_string(),
            ReportCategory::Extra => "!_extras.rep".to_string(),
            ReportCategory::Defective => "!!!_defective.rep".to_string(),
            ReportCategory::PairSummary | ReportCategory::TotalSummary => {
                "diff_result.txt".to_string()
            }
            ReportCategory::PatternSummary => "diff_top_field_errors.txt".to_string(),
        };
        self.dir.join(name)
    }

    fn write_pending(&self, buffer: &mut Buffer) -> Result<()> {
        let pending = std::mem::take(&mut buffer.pending);
        let events = std::mem::take(&mut buffer.count);

        for (category, text) in pending {
            let path = self.path_for(category);
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| FidelityError::io(&path, e))?;
            file.write_all(text.as_bytes())
                .map_err(|e| FidelityError::io(&path, e))?;
        }
        debug!(events, dir = %self.dir.display(), "flushed reports");
        Ok(())
    }
}

impl ReportSink for FileReportSink {
    fn emit(&self, category: ReportCategory, payload: &str) -> Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let text = buffer.pending.entry(category).or_default();
        text.push_str(payload);
        if !payload.ends_with('\n') {
            text.push('\n');
        }
        buffer.count += 1;

        if buffer.count > self.threshold {
            self.write_pending(&mut buffer)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.write_pending(&mut buffer)
    }
}
