//! Integration tests for Fidelity.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use fidelity::{
    CancelToken, Dataset, DatasetLoader, Fidelity, FilePair, FileReportSink, KeyStrategy,
    MemorySink, ReconConfig, ReportCategory, ReportSink, RunStatus, Stage,
};

/// Helper to write a file under `dir`.
fn write_file(dir: &Path, name: &str, content: &str) {
    fs::create_dir_all(dir).expect("Failed to create dir");
    fs::write(dir.join(name), content).expect("Failed to write file");
}

/// Config over `root/old` and `root/new` with three fields keyed on field 0.
fn manual_config(root: &Path, extra: &str) -> ReconConfig {
    let root = root.display();
    ReconConfig::from_toml(&format!(
        r#"
        name = "Test"
        legacy_name = "Old"
        new_name = "New"

        [storage]
        legacy = "{root}/old"
        new = "{root}/new"
        output = "{root}/res"

        [records]
        number_of_fields = 3
        field_names = ["id", "name", "amount"]

        [keys]
        mode = "manual"
        fields = [0]
        {extra}
        "#
    ))
    .expect("Invalid config")
}

fn dataset(content: &str) -> Dataset {
    DatasetLoader::new(Default::default(), 3, 0, 0).load_str(
        content,
        &KeyStrategy::fields(vec![0]),
        "test",
    )
}

fn pair() -> FilePair {
    FilePair {
        name: "a.txt".into(),
        legacy: "old_a.txt".into(),
        new: "new_a.txt".into(),
    }
}

// =============================================================================
// In-memory reconciliation
// =============================================================================

#[test]
fn test_lost_extra_identical_broken() {
    let dir = TempDir::new().unwrap();
    let config = manual_config(dir.path(), "");
    let fidelity = Fidelity::new(config).unwrap();
    let sink = MemorySink::new();

    let mut reconciler = fidelity.reconciler(KeyStrategy::fields(vec![0]), &sink);
    reconciler
        .reconcile(
            &pair(),
            &dataset("K1,alice,10\nK2,bob,20\nK3,carol,30\n"),
            &dataset("K1,alice,11\nK2,bob,20\nK4,dave,40\n"),
        )
        .unwrap();

    let run = *reconciler.statistics().run();
    assert_eq!(run.matched, 2);
    assert_eq!(run.lost, 1);
    assert_eq!(run.extra, 1);
    assert_eq!(run.identical_records, 1);
    assert_eq!(run.broken_records, 1);
    assert_eq!(run.broken_fields, 1);

    assert_eq!(sink.count(ReportCategory::Lost), 1);
    assert!(sink.payloads(ReportCategory::Lost)[0].contains("K3"));
    assert!(sink.payloads(ReportCategory::Extra)[0].contains("K4"));
    assert_eq!(sink.count(ReportCategory::FieldError(2)), 1);
}

#[test]
fn test_matched_plus_lost_equals_legacy_total() {
    let dir = TempDir::new().unwrap();
    let fidelity = Fidelity::new(manual_config(dir.path(), "")).unwrap();
    let sink = MemorySink::new();
    let mut reconciler = fidelity.reconciler(KeyStrategy::fields(vec![0]), &sink);

    let legacy = dataset("A,1,1\nB,1,1\nC,1,1\nD,1,1\nA,9,9\n");
    let new = dataset("B,1,1\nD,2,1\nE,1,1\nF,1,1\nG,1,1\n");
    reconciler.reconcile(&pair(), &legacy, &new).unwrap();

    let run = reconciler.statistics().run();
    assert_eq!(run.matched + run.lost, run.legacy_records);
    assert_eq!(run.matched + run.extra, run.new_records);
    assert_eq!(run.legacy_repeats, 1);
    assert_eq!(run.compared(), run.matched);
}

#[test]
fn test_three_differing_fields_one_broken_record() {
    let dir = TempDir::new().unwrap();
    let config = ReconConfig::from_toml(&format!(
        r#"
        [storage]
        legacy = "{0}/old"
        new = "{0}/new"

        [records]
        number_of_fields = 4

        [keys]
        mode = "manual"
        fields = [0]
        "#,
        dir.path().display()
    ))
    .unwrap();
    let fidelity = Fidelity::new(config).unwrap();
    let sink = MemorySink::new();
    let mut reconciler = fidelity.reconciler(KeyStrategy::fields(vec![0]), &sink);

    let loader = DatasetLoader::new(Default::default(), 4, 0, 0);
    let keys = KeyStrategy::fields(vec![0]);
    reconciler
        .reconcile(
            &pair(),
            &loader.load_str("K,a,b,c\n", &keys, "legacy"),
            &loader.load_str("K,x,y,z\n", &keys, "new"),
        )
        .unwrap();

    let run = reconciler.statistics().run();
    assert_eq!(run.broken_records, 1);
    assert_eq!(run.broken_fields, 3);
    assert_eq!(run.identical_records, 0);
}

#[test]
fn test_defective_records_are_not_field_compared() {
    let dir = TempDir::new().unwrap();
    let fidelity = Fidelity::new(manual_config(dir.path(), "")).unwrap();
    let sink = MemorySink::new();
    let mut reconciler = fidelity.reconciler(KeyStrategy::fields(vec![0]), &sink);

    reconciler
        .reconcile(
            &pair(),
            &dataset("K1,a,1\nK2,b\n"),
            &dataset("K1,a,1,extra\nK2,b,2\n"),
        )
        .unwrap();

    let run = reconciler.statistics().run();
    assert_eq!(run.defective_records, 2);
    assert_eq!(run.broken_records, 0);
    assert_eq!(sink.count(ReportCategory::Defective), 2);
    assert!(reconciler.statistics().field_errors().is_empty());
}

// =============================================================================
// File-based runs
// =============================================================================

#[test]
fn test_full_run_writes_reports() {
    let dir = TempDir::new().unwrap();
    write_file(&dir.path().join("old"), "old_a.txt", "K1,alice,10\nK2,bob,20\nK3,carol,30\n");
    write_file(&dir.path().join("new"), "new_a.txt", "K1,alice,11\nK2,bob,20\nK4,dave,40\n");
    write_file(&dir.path().join("old"), "old_b.txt", "K9,zed,1\n");

    let fidelity = Fidelity::new(manual_config(dir.path(), "")).unwrap();
    let out = dir.path().join("res");
    fs::create_dir_all(&out).unwrap();
    let sink = FileReportSink::new(
        &out,
        vec!["id".into(), "name".into(), "amount".into()],
        5000,
    );

    let outcome = fidelity.run(&sink, CancelToken::new(), None).unwrap();

    assert_eq!(outcome.status, RunStatus::Complete);
    assert_eq!(outcome.snapshot.stage, Stage::Complete);
    assert_eq!(outcome.snapshot.pairs_done, 1);
    assert_eq!(outcome.pairing.legacy_only.len(), 1);
    assert_eq!(outcome.snapshot.run.matched, 2);

    let result = fs::read_to_string(out.join("diff_result.txt")).unwrap();
    let lines: Vec<&str> = result.lines().collect();
    assert!(lines[0].starts_with("File name\tOld records\tNew records"));
    assert!(lines[1].starts_with("old_a.txt / new_a.txt\t3\t3\t2 (66.67%)"));
    assert!(lines.iter().any(|l| l.starts_with("TOTAL\t3\t3\t")));

    let amount = fs::read_to_string(out.join("002_amount.rep")).unwrap();
    assert!(amount.contains("[10]:[11] :: (.[x → x])"));
    assert!(fs::read_to_string(out.join("!!_losts.rep")).unwrap().contains("K3"));
    assert!(fs::read_to_string(out.join("!_extras.rep")).unwrap().contains("K4"));

    let top = fs::read_to_string(out.join("diff_top_field_errors.txt")).unwrap();
    assert!(top.contains("2 amount:"));
    assert!(top.contains(".[x → x]"));
}

#[test]
fn test_cancelled_run_is_interrupted() {
    let dir = TempDir::new().unwrap();
    write_file(&dir.path().join("old"), "old_a.txt", "K1,a,1\nK2,b,2\n");
    write_file(&dir.path().join("new"), "new_a.txt", "K1,a,1\nK2,b,2\n");

    let fidelity = Fidelity::new(manual_config(dir.path(), "")).unwrap();
    let sink = MemorySink::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = fidelity.run(&sink, cancel, None).unwrap();
    assert_eq!(outcome.status, RunStatus::Interrupted);
    assert!(outcome.is_interrupted());
    assert_eq!(outcome.snapshot.stage, Stage::Interrupted);

    let run = outcome.snapshot.run;
    assert!(run.matched + run.lost + run.extra <= 4);
    assert_eq!(sink.count(ReportCategory::TotalSummary), 1);
}

/// Stops the run once the first field error is reported.
struct CancelOnFieldError {
    inner: MemorySink,
    cancel: CancelToken,
}

impl ReportSink for CancelOnFieldError {
    fn emit(&self, category: ReportCategory, payload: &str) -> fidelity::Result<()> {
        if matches!(category, ReportCategory::FieldError(_)) {
            self.cancel.cancel();
        }
        self.inner.emit(category, payload)
    }

    fn flush(&self) -> fidelity::Result<()> {
        self.inner.flush()
    }
}

#[test]
fn test_interrupt_during_diffing() {
    let dir = TempDir::new().unwrap();
    for name in ["a", "b"] {
        let legacy: String = (0..50).map(|i| format!("{name}{i},x,{i}\n")).collect();
        let new: String = (0..50).map(|i| format!("{name}{i},x,{}\n", i * 2)).collect();
        write_file(&dir.path().join("old"), &format!("old_{name}.txt"), &legacy);
        write_file(&dir.path().join("new"), &format!("new_{name}.txt"), &new);
    }

    let fidelity = Fidelity::new(manual_config(dir.path(), "")).unwrap();
    let cancel = CancelToken::new();
    let sink = CancelOnFieldError {
        inner: MemorySink::new(),
        cancel: cancel.clone(),
    };
    let outcome = fidelity.run(&sink, cancel, None).unwrap();

    assert_eq!(outcome.status, RunStatus::Interrupted);
    assert_eq!(outcome.snapshot.stage, Stage::Interrupted);
    assert_eq!(outcome.snapshot.pairs_done, 0);

    // Record 0 is identical, record 1 is the first broken one
    let run = outcome.snapshot.run;
    assert_eq!(run.matched, 50);
    assert_eq!(run.compared(), 2);
    assert!(run.compared() < run.matched);
    assert!(run.matched + run.lost + run.extra <= 100);
    assert_eq!(run.legacy_records, 50, "second pair never loaded");

    // Header, the partial pair row, then the run-wide totals
    assert_eq!(sink.inner.count(ReportCategory::PairSummary), 2);
    assert_eq!(sink.inner.count(ReportCategory::TotalSummary), 1);
    assert!(sink.inner.flush_count() >= 2);
    let partial = &sink.inner.payloads(ReportCategory::PairSummary)[1];
    assert!(partial.starts_with("old_a.txt / new_a.txt\t50\t50\t50 (100.00%)"));
}

#[test]
fn test_progress_channel_ends_in_terminal_stage() {
    let dir = TempDir::new().unwrap();
    write_file(&dir.path().join("old"), "old_a.txt", "K1,a,1\n");
    write_file(&dir.path().join("new"), "new_a.txt", "K1,a,1\n");

    let fidelity = Fidelity::new(manual_config(dir.path(), "")).unwrap();
    let sink = MemorySink::new();
    let (tx, rx) = std::sync::mpsc::channel();
    fidelity.run(&sink, CancelToken::new(), Some(tx)).unwrap();

    let snapshots: Vec<_> = rx.iter().collect();
    assert!(snapshots.iter().any(|s| s.stage == Stage::LoadingLegacy));
    let last = snapshots.last().unwrap();
    assert_eq!(last.stage, Stage::Complete);
    assert_eq!(last.run.identical_records, 1);
}

#[test]
fn test_header_and_trailer_skipped() {
    let dir = TempDir::new().unwrap();
    write_file(&dir.path().join("old"), "old_a.txt", "HEADER\nK1,a,1\nTRAILER 1\n");
    write_file(&dir.path().join("new"), "new_a.txt", "HEADER\nK1,a,1\nTRAILER 2\n");

    let config = manual_config(dir.path(), "")
        .to_toml()
        .unwrap()
        .replace("header_lines = 0", "header_lines = 1")
        .replace("trailer_lines = 0", "trailer_lines = 1");
    let fidelity = Fidelity::new(ReconConfig::from_toml(&config).unwrap()).unwrap();
    let sink = MemorySink::new();
    let outcome = fidelity.run(&sink, CancelToken::new(), None).unwrap();

    assert_eq!(outcome.snapshot.run.legacy_records, 1);
    assert_eq!(outcome.snapshot.run.identical_records, 1);
}

#[test]
fn test_cp1251_values_compared_as_text() {
    let dir = TempDir::new().unwrap();
    let encode = |text: &str| encoding_rs::WINDOWS_1251.encode(text).0.into_owned();
    let old = dir.path().join("old");
    let new = dir.path().join("new");
    fs::create_dir_all(&old).unwrap();
    fs::create_dir_all(&new).unwrap();
    fs::write(old.join("old_a.txt"), encode("K1,Иван,1\nK2,Анна,2\n")).unwrap();
    fs::write(new.join("new_a.txt"), encode("K1,Петр,1\nK2,Анна,2\n")).unwrap();

    let config = manual_config(dir.path(), "")
        .to_toml()
        .unwrap()
        .replace("legacy_encoding = \"utf-8\"", "legacy_encoding = \"cp1251\"")
        .replace("new_encoding = \"utf-8\"", "new_encoding = \"windows-1251\"");
    let fidelity = Fidelity::new(ReconConfig::from_toml(&config).unwrap()).unwrap();
    let sink = MemorySink::new();
    let outcome = fidelity.run(&sink, CancelToken::new(), None).unwrap();

    assert_eq!(outcome.snapshot.run.broken_records, 1);
    assert_eq!(outcome.snapshot.run.identical_records, 1);
    let report = &sink.payloads(ReportCategory::FieldError(1))[0];
    assert!(report.contains("[Иван]:[Петр]"));
}

// =============================================================================
// Automatic keys
// =============================================================================

#[test]
fn test_auto_keys_end_to_end() {
    let dir = TempDir::new().unwrap();
    let legacy: String = (0..30).map(|i| format!("X,{i:03},v{}\n", i % 3)).collect();
    let new: String = (0..30)
        .map(|i| {
            let value = if i == 7 { "changed".to_string() } else { format!("v{}", i % 3) };
            format!("X,{i:03},{value}\n")
        })
        .collect();
    write_file(&dir.path().join("old"), "old_a.txt", &legacy);
    write_file(&dir.path().join("new"), "new_a.txt", &new);

    let root = dir.path().display();
    let config = ReconConfig::from_toml(&format!(
        r#"
        [storage]
        legacy = "{root}/old"
        new = "{root}/new"

        [records]
        number_of_fields = 3

        [keys]
        keys_file = "{root}/keys.toml"
        "#
    ))
    .unwrap();
    let fidelity = Fidelity::new(config).unwrap();
    let sink = MemorySink::new();
    let outcome = fidelity.run(&sink, CancelToken::new(), None).unwrap();

    assert_eq!(outcome.snapshot.run.matched, 30);
    assert_eq!(outcome.snapshot.run.broken_records, 1);
    assert_eq!(
        fidelity::inference::load_keys(dir.path().join("keys.toml")).unwrap(),
        vec![1]
    );
}
