//! Run command - reconcile every file pair and write the reports.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use colored::Colorize;
use fidelity::report::with_percent;
use fidelity::{CancelToken, Fidelity, FileReportSink, ReconConfig, RunOutcome, RunStatus};
use tracing::info;

use crate::logging;
use crate::progress::{self, FrameLabels};

/// Exit code of a run stopped by Ctrl+C.
pub const EXIT_INTERRUPTED: i32 = 130;

pub fn run(
    config_path: PathBuf,
    json_output: bool,
    refresh: u64,
    verbose: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let config = ReconConfig::load(&config_path)?;

    let run_dir = run_directory(&config);
    fs::create_dir_all(&run_dir)
        .map_err(|e| format!("Cannot create {}: {}", run_dir.display(), e))?;
    fs::write(run_dir.join("run_settings.toml"), config.to_toml()?)?;
    logging::init_file(&run_dir.join("fidelity.log"), verbose)?;
    info!(config = %config_path.display(), dir = %run_dir.display(), "run started");

    let field_names: Vec<String> = (0..config.records.number_of_fields)
        .map(|i| config.field_name(i))
        .collect();
    let labels = FrameLabels {
        legacy_name: config.legacy_name.clone(),
        new_name: config.new_name.clone(),
        field_names: field_names.clone(),
    };
    let sink = FileReportSink::new(&run_dir, field_names, config.report.flush_threshold);
    let fidelity = Fidelity::new(config)?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())?;

    if !json_output {
        println!(
            "{} {}",
            "Reconciling into".cyan().bold(),
            run_dir.display().to_string().white()
        );
    }

    let outcome = if json_output {
        fidelity.run(&sink, cancel, None)?
    } else {
        let (sender, receiver) = mpsc::channel();
        let reporter = progress::spawn(receiver, Duration::from_secs(refresh), labels.clone());
        // The sender is dropped when the run returns, which stops the reporter
        let outcome = fidelity.run(&sink, cancel, Some(sender));
        let _ = reporter.join();
        outcome?
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome, &labels, &run_dir);
    }

    Ok(match outcome.status {
        RunStatus::Complete => 0,
        RunStatus::Interrupted => EXIT_INTERRUPTED,
    })
}

/// `{output}/{YYYYmmdd_HHMMSS}_{name}`
fn run_directory(config: &ReconConfig) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    config
        .storage
        .output
        .join(format!("{}_{}", stamp, config.name))
}

fn print_summary(outcome: &RunOutcome, labels: &FrameLabels, run_dir: &Path) {
    let run = &outcome.snapshot.run;
    let base = run.legacy_records;

    println!();
    match outcome.status {
        RunStatus::Complete => println!("{}", "Reconciliation complete".green().bold()),
        RunStatus::Interrupted => println!("{}", "Reconciliation interrupted".yellow().bold()),
    }
    println!();
    print!("{}", progress::table(run, labels));
    println!();

    println!("  Matched:   {}", with_percent(run.matched, base).white());
    println!("  Lost:      {}", with_percent(run.lost, base).red());
    println!("  Extra:     {}", with_percent(run.extra, base).yellow());
    println!("  Broken:    {}", with_percent(run.broken_records, base).red());
    println!("  Identical: {}", with_percent(run.identical_records, base).green());
    println!(
        "  Defective: {}",
        with_percent(run.defective_records, base).magenta()
    );

    let pairing = &outcome.pairing;
    if !pairing.legacy_only.is_empty() {
        println!(
            "\n{} {} {} file(s) have no counterpart",
            "Warning:".yellow(),
            pairing.legacy_only.len(),
            labels.legacy_name
        );
    }
    if !pairing.new_only.is_empty() {
        println!(
            "\n{} {} {} file(s) have no counterpart",
            "Warning:".yellow(),
            pairing.new_only.len(),
            labels.new_name
        );
    }

    println!(
        "\nReports written to {}",
        run_dir.display().to_string().cyan().bold()
    );
}
