//! Reconciliation counters and progress snapshots.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::compare::{Classification, Comparison};
use crate::input::Dataset;

/// Which system a dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Legacy,
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Legacy => write!(f, "legacy"),
            Side::New => write!(f, "new"),
        }
    }
}

/// Reconciliation tallies for one pair or a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub legacy_records: u64,
    pub new_records: u64,
    pub matched: u64,
    pub lost: u64,
    pub extra: u64,
    pub legacy_repeats: u64,
    pub new_repeats: u64,
    pub broken_records: u64,
    pub broken_fields: u64,
    pub defective_records: u64,
    pub identical_records: u64,
    pub legacy_rejected: u64,
    pub new_rejected: u64,
}

impl Counters {
    /// Matched pairs already classified.
    pub fn compared(&self) -> u64 {
        self.identical_records + self.broken_records + self.defective_records
    }

    /// Legacy records with no counterpart in the new system.
    pub fn unmatched(&self) -> u64 {
        self.legacy_records.saturating_sub(self.matched)
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, other: Self) {
        self.legacy_records += other.legacy_records;
        self.new_records += other.new_records;
        self.matched += other.matched;
        self.lost += other.lost;
        self.extra += other.extra;
        self.legacy_repeats += other.legacy_repeats;
        self.new_repeats += other.new_repeats;
        self.broken_records += other.broken_records;
        self.broken_fields += other.broken_fields;
        self.defective_records += other.defective_records;
        self.identical_records += other.identical_records;
        self.legacy_rejected += other.legacy_rejected;
        self.new_rejected += other.new_rejected;
    }
}

impl Add for Counters {
    type Output = Counters;

    fn add(mut self, other: Self) -> Self::Output {
        self += other;
        self
    }
}

/// Where the reconciler currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    LoadingLegacy,
    LoadingNew,
    Diffing,
    Reporting,
    Interrupted,
    Complete,
}

/// Immutable view of the statistics at one moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub run_name: String,
    pub run: Counters,
    pub file: Counters,
    pub stage: Stage,
    pub stage_text: String,
    pub current_pair: Option<String>,
    pub pairs_total: usize,
    pub pairs_done: usize,
    /// Matched keys of the current pair.
    pub records_total: u64,
    /// Matched keys of the current pair already compared.
    pub records_done: u64,
    /// Data lines expected across all legacy files, for time estimates.
    pub expected_legacy_records: u64,
    /// Broken counts per field index, run-wide.
    pub field_errors: BTreeMap<usize, u64>,
    pub elapsed_ms: u64,
}

impl StatsSnapshot {
    /// Rough seconds remaining, from legacy records processed so far.
    pub fn eta_seconds(&self) -> Option<u64> {
        let done = self.run.legacy_records;
        if done == 0 || self.expected_legacy_records <= done {
            return None;
        }
        let remaining = self.expected_legacy_records - done;
        Some(self.elapsed_ms * remaining / done / 1000)
    }
}

/// Most frequent diff patterns for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPatterns {
    pub index: usize,
    pub patterns: Vec<(String, u64)>,
}

/// Mutable statistics; owned and written by a single reconciler.
#[derive(Debug)]
pub struct Statistics {
    run_name: String,
    run: Counters,
    file: Counters,
    field_errors: BTreeMap<usize, u64>,
    patterns: BTreeMap<usize, HashMap<String, u64>>,
    stage: Stage,
    stage_text: String,
    current_pair: Option<String>,
    pairs_total: usize,
    pairs_done: usize,
    records_total: u64,
    records_done: u64,
    expected_legacy_records: u64,
    started: Instant,
}

impl Statistics {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            run: Counters::default(),
            file: Counters::default(),
            field_errors: BTreeMap::new(),
            patterns: BTreeMap::new(),
            stage: Stage::Idle,
            stage_text: String::new(),
            current_pair: None,
            pairs_total: 0,
            pairs_done: 0,
            records_total: 0,
            records_done: 0,
            expected_legacy_records: 0,
            started: Instant::now(),
        }
    }

    pub fn run(&self) -> &Counters {
        &self.run
    }

    pub fn file(&self) -> &Counters {
        &self.file
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn field_errors(&self) -> &BTreeMap<usize, u64> {
        &self.field_errors
    }

    pub fn begin_run(&mut self, pairs_total: usize, expected_legacy_records: u64) {
        self.pairs_total = pairs_total;
        self.expected_legacy_records = expected_legacy_records;
        self.started = Instant::now();
    }

    /// Reset the file counters for a new pair.
    pub fn begin_pair(&mut self, label: impl Into<String>) {
        self.file = Counters::default();
        self.current_pair = Some(label.into());
        self.records_total = 0;
        self.records_done = 0;
    }

    pub fn finish_pair(&mut self) {
        self.pairs_done += 1;
    }

    pub fn set_stage(&mut self, stage: Stage, text: impl Into<String>) {
        self.stage = stage;
        self.stage_text = text.into();
    }

    pub fn record_dataset(&mut self, side: Side, dataset: &Dataset) {
        let mut delta = Counters::default();
        match side {
            Side::Legacy => {
                delta.legacy_records = dataset.total() as u64;
                delta.legacy_repeats = dataset.repeats as u64;
                delta.legacy_rejected = dataset.rejected as u64;
            }
            Side::New => {
                delta.new_records = dataset.total() as u64;
                delta.new_repeats = dataset.repeats as u64;
                delta.new_rejected = dataset.rejected as u64;
            }
        }
        self.apply(delta);
    }

    pub fn record_matching(&mut self, matched: usize, lost: usize, extra: usize) {
        self.records_total = matched as u64;
        self.apply(Counters {
            matched: matched as u64,
            lost: lost as u64,
            extra: extra as u64,
            ..Counters::default()
        });
    }

    /// Fold one record comparison into file and run statistics.
    pub fn record_comparison(&mut self, comparison: &Comparison) {
        let mut delta = Counters::default();
        match comparison.class {
            Classification::Identical => delta.identical_records = 1,
            Classification::Defective => delta.defective_records = 1,
            Classification::Broken => {
                delta.broken_records = 1;
                delta.broken_fields = comparison.field_errors.len() as u64;
            }
        }
        self.apply(delta);
        self.records_done += 1;

        for error in &comparison.field_errors {
            *self.field_errors.entry(error.index).or_default() += 1;
            *self
                .patterns
                .entry(error.index)
                .or_default()
                .entry(error.pattern.clone())
                .or_default() += 1;
        }
    }

    fn apply(&mut self, delta: Counters) {
        self.file += delta;
        self.run += delta;
    }

    /// Up to `limit` patterns per field, most frequent first, ties by
    /// pattern text.
    pub fn top_patterns(&self, limit: usize) -> Vec<FieldPatterns> {
        self.patterns
            .iter()
            .map(|(&index, counts)| {
                let mut patterns: Vec<(String, u64)> =
                    counts.iter().map(|(p, &c)| (p.clone(), c)).collect();
                patterns.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                patterns.truncate(limit);
                FieldPatterns { index, patterns }
            })
            .collect()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            run_name: self.run_name.clone(),
            run: self.run,
            file: self.file,
            stage: self.stage,
            stage_text: self.stage_text.clone(),
            current_pair: self.current_pair.clone(),
            pairs_total: self.pairs_total,
            pairs_done: self.pairs_done,
            records_total: self.records_total,
            records_done: self.records_done,
            expected_legacy_records: self.expected_legacy_records,
            field_errors: self.field_errors.clone(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
