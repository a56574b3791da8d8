use std::sync::Mutex;

use crate::error::Result;

use super::{ReportCategory, ReportSink};

/// Keeps every payload in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(ReportCategory, String)>>,
    flushes: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(ReportCategory, String)> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn payloads(&self, category: ReportCategory) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn count(&self, category: ReportCategory) -> usize {
        self.payloads(category).len()
    }

    pub fn flush_count(&self) -> usize {
        *self
            .flushes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, category: ReportCategory, payload: &str) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((category, payload.to_string()));
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        *self
            .flushes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}
