//! The reconciliation loop: load, match, compare, report.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::compare::FieldComparator;
use crate::config::ReconConfig;
use crate::error::Result;
use crate::inference::KeyStrategy;
use crate::input::{Dataset, DatasetLoader, FilePair, Pairing};
use crate::report::{
    pair_summary, pattern_summary, summary_header, total_summary, ReportCategory, ReportSink,
};
use crate::stats::{Side, Stage, Statistics, StatsSnapshot};

/// Compared records between two progress snapshots.
pub const SNAPSHOT_INTERVAL: u64 = 1000;

/// Cooperative cancellation, shared between the reconciler and whoever
/// may stop it. Cancelled once set or once the deadline has passed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Interrupted,
}

/// Final state of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub snapshot: StatsSnapshot,
    pub pairing: Pairing,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn is_interrupted(&self) -> bool {
        self.status == RunStatus::Interrupted
    }
}

/// Reconciles file pairs and reports through a [`ReportSink`].
///
/// The reconciler is the only writer of its [`Statistics`]; observers get
/// [`StatsSnapshot`] copies over an optional channel.
pub struct Reconciler<'s> {
    loader: DatasetLoader,
    keys: KeyStrategy,
    comparator: FieldComparator,
    legacy_name: String,
    new_name: String,
    field_names: Vec<String>,
    top_patterns: usize,
    sink: &'s dyn ReportSink,
    stats: Statistics,
    progress: Option<Sender<StatsSnapshot>>,
    cancel: CancelToken,
}

impl<'s> Reconciler<'s> {
    pub fn new(config: &ReconConfig, keys: KeyStrategy, sink: &'s dyn ReportSink) -> Self {
        let field_names = (0..config.records.number_of_fields)
            .map(|i| config.field_name(i))
            .collect();
        Self {
            loader: DatasetLoader::from_config(config),
            keys,
            comparator: FieldComparator::from_config(config),
            legacy_name: config.legacy_name.clone(),
            new_name: config.new_name.clone(),
            field_names,
            top_patterns: config.report.top_patterns,
            sink,
            stats: Statistics::new(&config.name),
            progress: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Sender<StatsSnapshot>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Reconcile every pair, then write the pattern and total summaries.
    pub fn run(&mut self, pairing: &Pairing) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let expected = self.expected_legacy_records(&pairing.pairs);
        self.stats.begin_run(pairing.pairs.len(), expected);
        info!(
            pairs = pairing.pairs.len(),
            expected_records = expected,
            keys = %self.keys,
            layout = %self.loader.layout().describe(),
            "reconciliation started"
        );

        self.sink.emit(
            ReportCategory::PairSummary,
            &summary_header(&self.legacy_name, &self.new_name),
        )?;

        let mut interrupted = false;
        for pair in &pairing.pairs {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            if !self.reconcile_files(pair)? {
                interrupted = true;
                break;
            }
        }

        self.finish(interrupted)?;
        Ok(RunOutcome {
            status: if interrupted {
                RunStatus::Interrupted
            } else {
                RunStatus::Complete
            },
            snapshot: self.stats.snapshot(),
            pairing: pairing.clone(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Load both files of a pair and reconcile them. `Ok(false)` when
    /// cancelled along the way.
    pub fn reconcile_files(&mut self, pair: &FilePair) -> Result<bool> {
        self.stats.begin_pair(pair.label());

        self.transition(
            Stage::LoadingLegacy,
            format!("Loading {} file {}", self.legacy_name, pair.legacy.display()),
        );
        let legacy = self.loader.load(&pair.legacy, &self.keys, Side::Legacy)?;
        self.stats.record_dataset(Side::Legacy, &legacy);
        if self.cancel.is_cancelled() {
            return self.abandon_pair(pair);
        }

        self.transition(
            Stage::LoadingNew,
            format!("Loading {} file {}", self.new_name, pair.new.display()),
        );
        let new = self.loader.load(&pair.new, &self.keys, Side::New)?;
        self.stats.record_dataset(Side::New, &new);
        if self.cancel.is_cancelled() {
            return self.abandon_pair(pair);
        }

        self.compare_datasets(pair, &legacy, &new)
    }

    /// Summarize what was loaded of a pair cancelled before diffing.
    fn abandon_pair(&self, pair: &FilePair) -> Result<bool> {
        self.sink.emit(
            ReportCategory::PairSummary,
            &pair_summary(&pair.label(), self.stats.file()),
        )?;
        self.sink.flush()?;
        Ok(false)
    }

    /// Reconcile two already-loaded datasets as one pair. `Ok(false)` when
    /// cancelled before every matched record was compared.
    pub fn reconcile(&mut self, pair: &FilePair, legacy: &Dataset, new: &Dataset) -> Result<bool> {
        self.stats.begin_pair(pair.label());
        self.stats.record_dataset(Side::Legacy, legacy);
        self.stats.record_dataset(Side::New, new);
        self.compare_datasets(pair, legacy, new)
    }

    fn compare_datasets(&mut self, pair: &FilePair, legacy: &Dataset, new: &Dataset) -> Result<bool> {
        let label = pair.label();
        self.transition(Stage::Diffing, format!("Comparing {label}"));

        let matched: Vec<&String> = legacy
            .records
            .keys()
            .filter(|k| new.contains_key(k))
            .collect();
        let lost: Vec<&String> = legacy
            .records
            .keys()
            .filter(|k| !new.contains_key(k))
            .collect();
        let extra: Vec<&String> = new
            .records
            .keys()
            .filter(|k| !legacy.contains_key(k))
            .collect();
        self.stats
            .record_matching(matched.len(), lost.len(), extra.len());

        for (side, category, keys, dataset) in [
            (&self.legacy_name, ReportCategory::Lost, &lost, legacy),
            (&self.new_name, ReportCategory::Extra, &extra, new),
        ] {
            for key in keys {
                if let Some(record) = dataset.get(key) {
                    self.sink
                        .emit(category, &format!("{label} :: {side} :: {key} :: {record}"))?;
                }
            }
        }
        if !lost.is_empty() || !extra.is_empty() {
            warn!(pair = %label, lost = lost.len(), extra = extra.len(), "unmatched records");
        }

        let mut completed = true;
        for (done, key) in matched.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                completed = false;
                break;
            }
            let (Some(old), Some(current)) = (legacy.get(key), new.get(key)) else {
                continue;
            };

            let comparison = self.comparator.compare(pair, old, current);
            for error in &comparison.field_errors {
                self.sink
                    .emit(ReportCategory::FieldError(error.index), &error.report)?;
            }
            for report in &comparison.defective_reports {
                self.sink.emit(ReportCategory::Defective, report)?;
            }
            self.stats.record_comparison(&comparison);

            if (done as u64 + 1) % SNAPSHOT_INTERVAL == 0 {
                self.publish();
            }
        }

        self.transition(Stage::Reporting, format!("Writing reports for {label}"));
        self.sink
            .emit(ReportCategory::PairSummary, &pair_summary(&label, self.stats.file()))?;
        self.sink.flush()?;
        if !completed {
            warn!(pair = %label, compared = self.stats.file().compared(), "pair interrupted");
            return Ok(false);
        }
        self.stats.finish_pair();

        let file = self.stats.file();
        info!(
            pair = %label,
            matched = file.matched,
            lost = file.lost,
            extra = file.extra,
            broken = file.broken_records,
            identical = file.identical_records,
            defective = file.defective_records,
            "pair reconciled"
        );

        self.transition(Stage::Idle, String::new());
        Ok(true)
    }

    /// Write the run-wide summaries and publish the terminal snapshot.
    pub fn finish(&mut self, interrupted: bool) -> Result<()> {
        let patterns = self.stats.top_patterns(self.top_patterns);
        let field_names = &self.field_names;
        let text = pattern_summary(&patterns, |index| {
            field_names
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("field_{index}"))
        });
        if !text.is_empty() {
            self.sink.emit(ReportCategory::PatternSummary, &text)?;
        }
        self.sink.emit(
            ReportCategory::TotalSummary,
            &total_summary(&self.legacy_name, &self.new_name, self.stats.run()),
        )?;
        self.sink.flush()?;

        if interrupted {
            warn!("reconciliation interrupted");
            self.transition(Stage::Interrupted, "Interrupted");
        } else {
            info!(
                matched = self.stats.run().matched,
                broken = self.stats.run().broken_records,
                "reconciliation complete"
            );
            self.transition(Stage::Complete, "Complete");
        }
        Ok(())
    }

    fn expected_legacy_records(&self, pairs: &[FilePair]) -> u64 {
        pairs
            .iter()
            .filter_map(|pair| self.loader.expected_records(&pair.legacy, Side::Legacy).ok())
            .map(|n| n as u64)
            .sum()
    }

    fn transition(&mut self, stage: Stage, text: impl Into<String>) {
        self.stats.set_stage(stage, text);
        self.publish();
    }

    fn publish(&self) {
        if let Some(progress) = &self.progress {
            // A gone receiver only means nobody is watching
            let _ = progress.send(self.stats.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemorySink;
    use std::path::PathBuf;
    use std::sync::mpsc;

    fn config() -> ReconConfig {
        ReconConfig::from_toml(
            r#"
            name = "Test"
            legacy_name = "Old"
            new_name = "New"

            [storage]
            legacy = "old"
            new = "new"

            [records]
            number_of_fields = 3
            "#,
        )
        .unwrap()
    }

    fn pair() -> FilePair {
        FilePair {
            name: "a.txt".into(),
            legacy: PathBuf::from("old_a.txt"),
            new: PathBuf::from("new_a.txt"),
        }
    }

    fn dataset(content: &str) -> Dataset {
        DatasetLoader::new(Default::default(), 3, 0, 0).load_str(
            content,
            &KeyStrategy::fields(vec![0]),
            "t",
        )
    }

    #[test]
    fn test_reconcile_counts() {
        let sink = MemorySink::new();
        let mut recon = Reconciler::new(&config(), KeyStrategy::fields(vec![0]), &sink);
        let completed = recon
            .reconcile(
                &pair(),
                &dataset("K1,a,1\nK2,b,2\nK3,c,3\n"),
                &dataset("K1,a,9\nK2,b,2\nK4,d,4\n"),
            )
            .unwrap();

        assert!(completed);
        let run = recon.statistics().run();
        assert_eq!(run.matched, 2);
        assert_eq!(run.lost, 1);
        assert_eq!(run.extra, 1);
        assert_eq!(run.identical_records, 1);
        assert_eq!(run.broken_records, 1);
        assert_eq!(sink.count(ReportCategory::FieldError(2)), 1);
        assert_eq!(sink.payloads(ReportCategory::Lost)[0], "old_a.txt / new_a.txt :: Old :: K3 :: [\"K3\", \"c\", \"3\"]");
        assert_eq!(sink.count(ReportCategory::Extra), 1);
        assert_eq!(sink.count(ReportCategory::PairSummary), 1);
    }

    #[test]
    fn test_snapshots_published_on_transitions() {
        let sink = MemorySink::new();
        let (tx, rx) = mpsc::channel();
        let mut recon =
            Reconciler::new(&config(), KeyStrategy::fields(vec![0]), &sink).with_progress(tx);
        recon
            .reconcile(&pair(), &dataset("K1,a,1\n"), &dataset("K1,a,1\n"))
            .unwrap();
        recon.finish(false).unwrap();
        drop(recon);

        let stages: Vec<Stage> = rx.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Diffing, Stage::Reporting, Stage::Idle, Stage::Complete]
        );
    }

    #[test]
    fn test_cancelled_token_stops_comparison() {
        let sink = MemorySink::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut recon = Reconciler::new(&config(), KeyStrategy::fields(vec![0]), &sink)
            .with_cancel(cancel);
        let completed = recon
            .reconcile(&pair(), &dataset("K1,a,1\nK2,b,2\n"), &dataset("K1,a,1\n"))
            .unwrap();

        assert!(!completed);
        assert_eq!(recon.statistics().run().compared(), 0);
        assert_eq!(recon.statistics().run().lost, 1);
        assert_eq!(sink.count(ReportCategory::PairSummary), 1);
    }

    /// Cancels its token when the first field error is reported.
    struct CancelOnFieldError {
        inner: MemorySink,
        cancel: CancelToken,
    }

    impl ReportSink for CancelOnFieldError {
        fn emit(&self, category: ReportCategory, payload: &str) -> Result<()> {
            if matches!(category, ReportCategory::FieldError(_)) {
                self.cancel.cancel();
            }
            self.inner.emit(category, payload)
        }

        fn flush(&self) -> Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn test_cancel_mid_diff_finishes_current_record() {
        let legacy: String = (0..50).map(|i| format!("K{i},a,{i}\n")).collect();
        let new: String = (0..50).map(|i| format!("K{i},a,{}\n", i + 1)).collect();
        let cancel = CancelToken::new();
        let sink = CancelOnFieldError {
            inner: MemorySink::new(),
            cancel: cancel.clone(),
        };
        let mut recon = Reconciler::new(&config(), KeyStrategy::fields(vec![0]), &sink)
            .with_cancel(cancel);

        let completed = recon
            .reconcile(&pair(), &dataset(&legacy), &dataset(&new))
            .unwrap();
        recon.finish(true).unwrap();

        assert!(!completed);
        let snapshot = recon.statistics().snapshot();
        assert_eq!(snapshot.run.matched, 50);
        assert_eq!(snapshot.run.compared(), 1);
        assert_eq!(snapshot.run.broken_records, 1);
        assert_eq!(snapshot.pairs_done, 0);
        assert_eq!(snapshot.stage, Stage::Interrupted);

        assert_eq!(sink.inner.count(ReportCategory::FieldError(2)), 1);
        assert_eq!(sink.inner.count(ReportCategory::PairSummary), 1);
        assert_eq!(sink.inner.count(ReportCategory::TotalSummary), 1);
        assert_eq!(sink.inner.flush_count(), 2);
    }

    #[test]
    fn test_completed_pair_counts_as_done() {
        let sink = MemorySink::new();
        let mut recon = Reconciler::new(&config(), KeyStrategy::fields(vec![0]), &sink);
        recon
            .reconcile(&pair(), &dataset("K1,a,1\n"), &dataset("K1,a,2\n"))
            .unwrap();
        assert_eq!(recon.statistics().snapshot().pairs_done, 1);
    }

    #[test]
    fn test_outcome_serializes() {
        let sink = MemorySink::new();
        let mut recon = Reconciler::new(&config(), KeyStrategy::fields(vec![0]), &sink);
        let outcome = recon.run(&Pairing::default()).unwrap();

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "complete");
        assert_eq!(json["snapshot"]["stage"], "complete");
        assert!(json["started_at"].is_string());
        assert!(outcome.finished_at >= outcome.started_at);
    }

    #[test]
    fn test_expired_deadline_cancels() {
        let token = CancelToken::new().with_deadline(Instant::now());
        assert!(token.is_cancelled());
        assert!(!CancelToken::new().with_timeout(Duration::from_secs(3600)).is_cancelled());
    }
}
